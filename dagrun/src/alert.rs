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

//! # Alerting
//!
//! Structured alert records emitted on workflow and task state transitions,
//! with pluggable delivery. The built-in transport POSTs an interactive
//! card payload to a chat webhook. Delivery failures are logged and never
//! affect workflow state; emission happens after the state transition is
//! recorded, so consumers must tolerate at-least-once delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::AlertError;

/// The `alert` block of a workflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Transport type; only `webhook` is built in.
    #[serde(rename = "type", default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub webhook_url: String,
    /// Mention everyone in delivered cards.
    #[serde(default)]
    pub at_all: bool,
    /// Also deliver workflow-succeeded cards.
    #[serde(default)]
    pub on_success: bool,
    /// Failure policy for the owning workflow.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            webhook_url: String::new(),
            at_all: false,
            on_success: false,
            fail_fast: true,
        }
    }
}

fn default_transport() -> String {
    "webhook".to_string()
}

fn default_true() -> bool {
    true
}

/// A structured alert record produced by the execution engine.
#[derive(Debug, Clone)]
pub enum AlertEvent {
    WorkflowStarted {
        workflow: String,
        started_at: DateTime<Utc>,
        backfill_date: Option<NaiveDate>,
    },
    TaskSucceeded {
        workflow: String,
        task_id: String,
        duration: Duration,
    },
    TaskFailed {
        workflow: String,
        task_id: String,
        error: String,
    },
    WorkflowSucceeded {
        workflow: String,
        started_at: DateTime<Utc>,
        completed: Vec<String>,
        backfill_date: Option<NaiveDate>,
    },
    WorkflowFailed {
        workflow: String,
        started_at: DateTime<Utc>,
        failed_task: Option<String>,
        error: String,
        completed: Vec<String>,
        cancelled: Vec<String>,
        backfill_date: Option<NaiveDate>,
    },
}

/// Delivery half of the alert pipeline.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(
        &self,
        title: &str,
        body: &str,
        template: &str,
        at_all: bool,
    ) -> Result<(), AlertError>;
}

/// POSTs interactive card payloads to a chat webhook.
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl AlertTransport for WebhookTransport {
    async fn deliver(
        &self,
        title: &str,
        body: &str,
        template: &str,
        at_all: bool,
    ) -> Result<(), AlertError> {
        let mut elements = vec![json!({"tag": "markdown", "content": body})];
        if at_all {
            elements.push(json!({
                "tag": "div",
                "text": {"tag": "lark_md", "content": "<at id=all></at>"}
            }));
        }
        let message = json!({
            "msg_type": "interactive",
            "card": {
                "config": {"wide_screen_mode": true},
                "header": {
                    "title": {"tag": "plain_text", "content": title},
                    "template": template,
                },
                "elements": elements,
            }
        });

        let response = self.client.post(&self.url).json(&message).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Renders alert events and hands deliverable ones to the transport.
pub struct AlertEmitter {
    transport: Arc<dyn AlertTransport>,
    at_all: bool,
    on_success: bool,
}

impl AlertEmitter {
    /// Build an emitter from a workflow's alert block. Returns `None` when
    /// the block names an unknown transport or lacks a webhook URL.
    pub fn from_config(config: &AlertConfig) -> Option<Self> {
        if config.transport != "webhook" {
            warn!(transport = config.transport.as_str(), "unknown alert transport; alerting disabled");
            return None;
        }
        if config.webhook_url.is_empty() {
            warn!("alert block has no webhook_url; alerting disabled");
            return None;
        }
        Some(Self {
            transport: Arc::new(WebhookTransport::new(&config.webhook_url)),
            at_all: config.at_all,
            on_success: config.on_success,
        })
    }

    /// Build an emitter around a custom transport.
    pub fn with_transport(transport: Arc<dyn AlertTransport>, config: &AlertConfig) -> Self {
        Self {
            transport,
            at_all: config.at_all,
            on_success: config.on_success,
        }
    }

    /// Record the event and deliver workflow-level terminal cards.
    pub async fn emit(&self, event: &AlertEvent) {
        let delivery = match event {
            AlertEvent::WorkflowStarted { workflow, .. } => {
                info!(workflow = workflow.as_str(), event = "workflow-start", "alert event");
                None
            }
            AlertEvent::TaskSucceeded {
                workflow, task_id, ..
            } => {
                info!(
                    workflow = workflow.as_str(),
                    task = task_id.as_str(),
                    event = "task-succeeded",
                    "alert event"
                );
                None
            }
            AlertEvent::TaskFailed {
                workflow,
                task_id,
                error,
            } => {
                info!(
                    workflow = workflow.as_str(),
                    task = task_id.as_str(),
                    error = error.as_str(),
                    event = "task-failed",
                    "alert event"
                );
                None
            }
            AlertEvent::WorkflowSucceeded {
                workflow,
                started_at,
                completed,
                backfill_date,
            } => {
                info!(workflow = workflow.as_str(), event = "workflow-succeeded", "alert event");
                self.on_success.then(|| {
                    render_success(workflow, *started_at, completed, *backfill_date)
                })
            }
            AlertEvent::WorkflowFailed {
                workflow,
                started_at,
                failed_task,
                error,
                completed,
                cancelled,
                backfill_date,
            } => {
                info!(
                    workflow = workflow.as_str(),
                    error = error.as_str(),
                    event = "workflow-failed",
                    "alert event"
                );
                Some(render_failure(
                    workflow,
                    *started_at,
                    failed_task.as_deref(),
                    error,
                    completed,
                    cancelled,
                    *backfill_date,
                ))
            }
        };

        if let Some((title, body, template)) = delivery {
            if let Err(e) = self
                .transport
                .deliver(&title, &body, &template, self.at_all)
                .await
            {
                warn!(error = %e, "alert delivery failed");
            }
        }
    }
}

fn render_failure(
    workflow: &str,
    started_at: DateTime<Utc>,
    failed_task: Option<&str>,
    error: &str,
    completed: &[String],
    cancelled: &[String],
    backfill_date: Option<NaiveDate>,
) -> (String, String, String) {
    let mut title = format!("Workflow failed: {}", workflow);
    if let Some(date) = backfill_date {
        title.push_str(&format!(" (backfill {})", date));
    }

    let mut body = format!(
        "**Workflow**: {}\n**Started**: {}\n**Elapsed**: {:.2}s\n",
        workflow,
        started_at.format("%Y-%m-%d %H:%M:%S"),
        (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
    );
    if let Some(date) = backfill_date {
        body.push_str(&format!("**Backfill date**: {}\n", date));
    }
    body.push_str(&format!(
        "\n**Failed task**: {}\n**Reason**: {}\n",
        failed_task.unwrap_or("-"),
        error
    ));
    body.push_str(&format!(
        "\n**Completed**: {}\n",
        join_or_none(completed)
    ));
    body.push_str(&format!("**Not executed**: {}\n", join_or_none(cancelled)));

    (title, body, "red".to_string())
}

fn render_success(
    workflow: &str,
    started_at: DateTime<Utc>,
    completed: &[String],
    backfill_date: Option<NaiveDate>,
) -> (String, String, String) {
    let mut title = format!("Workflow succeeded: {}", workflow);
    if let Some(date) = backfill_date {
        title.push_str(&format!(" (backfill {})", date));
    }

    let mut body = format!(
        "**Workflow**: {}\n**Started**: {}\n**Elapsed**: {:.2}s\n",
        workflow,
        started_at.format("%Y-%m-%d %H:%M:%S"),
        (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
    );
    if let Some(date) = backfill_date {
        body.push_str(&format!("**Backfill date**: {}\n", date));
    }
    body.push_str(&format!("\n**Completed**: {}\n", join_or_none(completed)));

    (title, body, "green".to_string())
}

fn join_or_none(tasks: &[String]) -> String {
    if tasks.is_empty() {
        "none".to_string()
    } else {
        tasks.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        delivered: Mutex<Vec<(String, String, String, bool)>>,
    }

    #[async_trait]
    impl AlertTransport for RecordingTransport {
        async fn deliver(
            &self,
            title: &str,
            body: &str,
            template: &str,
            at_all: bool,
        ) -> Result<(), AlertError> {
            self.delivered.lock().unwrap().push((
                title.to_string(),
                body.to_string(),
                template.to_string(),
                at_all,
            ));
            Ok(())
        }
    }

    fn failed_event() -> AlertEvent {
        AlertEvent::WorkflowFailed {
            workflow: "etl".to_string(),
            started_at: Utc::now(),
            failed_task: Some("load".to_string()),
            error: "exit 1".to_string(),
            completed: vec!["extract".to_string()],
            cancelled: vec!["report".to_string()],
            backfill_date: None,
        }
    }

    #[tokio::test]
    async fn test_workflow_failure_is_delivered() {
        init_test_logging();

        let transport = Arc::new(RecordingTransport::default());
        let emitter = AlertEmitter::with_transport(
            transport.clone(),
            &AlertConfig {
                at_all: true,
                ..AlertConfig::default()
            },
        );

        emitter.emit(&failed_event()).await;

        let delivered = transport.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let (title, body, template, at_all) = &delivered[0];
        assert!(title.contains("etl"));
        assert!(body.contains("load"));
        assert!(body.contains("report"));
        assert_eq!(template, "red");
        assert!(at_all);
    }

    #[tokio::test]
    async fn test_success_delivery_is_opt_in() {
        init_test_logging();

        let transport = Arc::new(RecordingTransport::default());
        let emitter =
            AlertEmitter::with_transport(transport.clone(), &AlertConfig::default());

        let event = AlertEvent::WorkflowSucceeded {
            workflow: "etl".to_string(),
            started_at: Utc::now(),
            completed: vec!["extract".to_string()],
            backfill_date: None,
        };
        emitter.emit(&event).await;
        assert!(transport.delivered.lock().unwrap().is_empty());

        let emitter = AlertEmitter::with_transport(
            transport.clone(),
            &AlertConfig {
                on_success: true,
                ..AlertConfig::default()
            },
        );
        emitter.emit(&event).await;
        assert_eq!(transport.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_task_events_are_not_delivered() {
        init_test_logging();

        let transport = Arc::new(RecordingTransport::default());
        let emitter =
            AlertEmitter::with_transport(transport.clone(), &AlertConfig::default());

        emitter
            .emit(&AlertEvent::TaskFailed {
                workflow: "etl".to_string(),
                task_id: "load".to_string(),
                error: "exit 1".to_string(),
            })
            .await;

        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config: AlertConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.transport, "webhook");
        assert!(config.fail_fast);
        assert!(!config.at_all);
        assert!(!config.on_success);
    }

    #[test]
    fn test_emitter_requires_webhook_url() {
        crate::init_test_logging();
        assert!(AlertEmitter::from_config(&AlertConfig::default()).is_none());
    }
}
