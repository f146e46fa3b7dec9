use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client as SqsClient;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::metric::TableItem;

/// A message routed to the dead-letter queue.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DeadLetter {
    /// An invocation that failed as a whole.
    Event {
        event: Value,
        error: String,
        timestamp: String,
    },
    /// A chunk of items the table would not accept.
    Metrics {
        failed_metrics: Vec<TableItem>,
        error: String,
        timestamp: String,
    },
}

impl DeadLetter {
    pub fn event(event: Value, error: impl Into<String>) -> Self {
        DeadLetter::Event {
            event,
            error: error.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn metrics(failed_metrics: Vec<TableItem>, error: impl Into<String>) -> Self {
        DeadLetter::Metrics {
            failed_metrics,
            error: error.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(&self) -> &str {
        match self {
            DeadLetter::Event { error, .. } | DeadLetter::Metrics { error, .. } => error,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DlqError {
    #[error("failed to serialize dead letter: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to send message to dead-letter queue {queue_url}: {message}")]
    Send { queue_url: String, message: String },
}

#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn send(&self, letter: &DeadLetter) -> Result<(), DlqError>;
}

pub type DynDeadLetterQueue = Arc<dyn DeadLetterQueue>;

/// Dead-letter queue backed by SQS.
pub struct SqsDeadLetterQueue {
    client: SqsClient,
    queue_url: String,
}

impl SqsDeadLetterQueue {
    pub fn new(client: SqsClient, queue_url: impl Into<String>) -> Self {
        SqsDeadLetterQueue {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl DeadLetterQueue for SqsDeadLetterQueue {
    async fn send(&self, letter: &DeadLetter) -> Result<(), DlqError> {
        let body = serde_json::to_string(letter)?;

        let last_err_attr = MessageAttributeValue::builder()
            .set_data_type(Some("String".to_string()))
            .set_string_value(Some(letter.error().to_string()))
            .build()
            .map_err(|e| DlqError::Send {
                queue_url: self.queue_url.clone(),
                message: e.to_string(),
            })?;

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_attributes("LastError", last_err_attr)
            .message_body(body)
            .send()
            .await
            .map_err(|e| DlqError::Send {
                queue_url: self.queue_url.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        info!("sent message to DLQ: {}", self.queue_url);
        Ok(())
    }
}
