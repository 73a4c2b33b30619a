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
use std::path::PathBuf;

#[test]
fn test_run_command_parsing() {
    let args = vec![
        "dagrun-ctl",
        "run",
        "--config",
        "workflow.json",
        "--params",
        "params.json",
        "--job_ids",
        "extract,load",
    ];

    let cli = Cli::try_parse_from(args).expect("Should parse run command");

    match cli.command {
        Commands::Run {
            config,
            params,
            job_ids,
            start_from,
        } => {
            assert_eq!(config, PathBuf::from("workflow.json"));
            assert_eq!(params, Some(PathBuf::from("params.json")));
            assert_eq!(job_ids, Some("extract,load".to_string()));
            assert_eq!(start_from, None);
        }
        _ => panic!("Expected Run command"),
    }
}

#[test]
fn test_run_requires_config() {
    let args = vec!["dagrun-ctl", "run"];
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn test_backfill_command_parsing() {
    let args = vec![
        "dagrun-ctl",
        "backfill",
        "--config",
        "workflow.json",
        "--backfill_params",
        "backfill.json",
        "--auto_confirm",
    ];

    let cli = Cli::try_parse_from(args).expect("Should parse backfill command");

    match cli.command {
        Commands::Backfill {
            config,
            backfill_params,
            job_ids,
            start_from,
            auto_confirm,
        } => {
            assert_eq!(config, PathBuf::from("workflow.json"));
            assert_eq!(backfill_params, PathBuf::from("backfill.json"));
            assert_eq!(job_ids, None);
            assert_eq!(start_from, None);
            assert!(auto_confirm);
        }
        _ => panic!("Expected Backfill command"),
    }
}

#[test]
fn test_backfill_requires_params_file() {
    let args = vec!["dagrun-ctl", "backfill", "--config", "workflow.json"];
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn test_visualize_command_parsing() {
    let args = vec![
        "dagrun-ctl",
        "visualize",
        "--config",
        "workflow.json",
        "--output",
        "graph.dot",
        "--format",
        "ascii",
    ];

    let cli = Cli::try_parse_from(args).expect("Should parse visualize command");

    match cli.command {
        Commands::Visualize {
            config,
            output,
            format,
            params,
        } => {
            assert_eq!(config, PathBuf::from("workflow.json"));
            assert_eq!(output, Some(PathBuf::from("graph.dot")));
            assert_eq!(format, "ascii");
            assert_eq!(params, None);
        }
        _ => panic!("Expected Visualize command"),
    }
}

#[test]
fn test_visualize_default_format_is_dot() {
    let args = vec!["dagrun-ctl", "visualize", "--config", "workflow.json"];
    let cli = Cli::try_parse_from(args).expect("Should parse visualize command");

    match cli.command {
        Commands::Visualize { format, .. } => assert_eq!(format, "dot"),
        _ => panic!("Expected Visualize command"),
    }
}

#[test]
fn test_info_command_parsing() {
    let args = vec!["dagrun-ctl", "info", "--config", "workflow.json"];
    let cli = Cli::try_parse_from(args).expect("Should parse info command");

    match cli.command {
        Commands::Info { config } => assert_eq!(config, PathBuf::from("workflow.json")),
        _ => panic!("Expected Info command"),
    }
}

#[test]
fn test_global_flags() {
    let args = vec!["dagrun-ctl", "--verbose", "info", "--config", "w.json"];
    let cli = Cli::try_parse_from(args).expect("Should parse with global flags");
    assert!(cli.verbose);
    assert!(!cli.quiet);
}
