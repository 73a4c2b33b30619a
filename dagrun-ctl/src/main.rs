/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

use clap::Parser;
use dagrun_ctl::cli::{Cli, Commands};
use dagrun_ctl::{commands, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let code = match cli.command {
        Commands::Run {
            ref config,
            ref params,
            ref job_ids,
            ref start_from,
        } => {
            commands::run::execute(
                config,
                params.as_deref(),
                job_ids.as_deref(),
                start_from.clone(),
            )
            .await
        }
        Commands::Backfill {
            ref config,
            ref backfill_params,
            ref job_ids,
            ref start_from,
            auto_confirm,
        } => {
            commands::backfill::execute(
                config,
                backfill_params,
                job_ids.as_deref(),
                start_from.clone(),
                auto_confirm,
            )
            .await
        }
        Commands::Visualize {
            ref config,
            ref output,
            ref format,
            ref params,
        } => commands::visualize::execute(config, output.as_deref(), format, params.as_deref()),
        Commands::Info { ref config } => commands::info::execute(config),
    };

    std::process::exit(code);
}
