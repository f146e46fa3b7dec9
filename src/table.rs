use async_trait::async_trait;
use aws_sdk_dynamodb::config::retry::RetryConfig;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::dlq::{DeadLetter, DeadLetterQueue};
use crate::metric::TableItem;

/// Largest batch DynamoDB accepts in a single BatchWriteItem call.
pub const MAX_BATCH_SIZE: usize = 25;

const THROTTLING_CODES: [&str; 3] = [
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TableWriteError {
    #[error("table throttled the write: {code}")]
    Throttled { code: String },
    #[error("table rejected the write: {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("invalid write request: {0}")]
    InvalidRequest(String),
    #[error("failed to reach table: {0}")]
    Transport(String),
}

impl TableWriteError {
    pub fn is_throttling(&self) -> bool {
        matches!(self, TableWriteError::Throttled { .. })
    }
}

#[async_trait]
pub trait MetricTable: Send + Sync {
    /// Writes at most [`MAX_BATCH_SIZE`] items in one request.
    async fn put_batch(&self, items: &[TableItem]) -> Result<(), TableWriteError>;
}

pub type DynMetricTable = Arc<dyn MetricTable>;

/// Builds the client for the metrics table. Throttling is retried by
/// [`write_batches`], so the SDK's own retries are turned off.
pub fn table_client(conf: aws_sdk_dynamodb::config::Builder) -> DynamoDbClient {
    DynamoDbClient::from_conf(conf.retry_config(RetryConfig::disabled()).build())
}

/// Metrics table backed by DynamoDB.
pub struct DynamoDbTable {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbTable {
    pub fn new(client: DynamoDbClient, table_name: impl Into<String>) -> Self {
        DynamoDbTable {
            client,
            table_name: table_name.into(),
        }
    }
}

fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

/// to_attributes - converts a table item to its DynamoDB representation
pub fn to_attributes(item: &TableItem) -> HashMap<String, AttributeValue> {
    let mut attributes = HashMap::from([
        ("metric_id".to_string(), AttributeValue::S(item.metric_id.clone())),
        ("timestamp".to_string(), AttributeValue::N(item.timestamp.to_string())),
        ("metric_type".to_string(), AttributeValue::S(item.metric_type.clone())),
        ("value".to_string(), AttributeValue::N(item.value.to_string())),
        ("unit".to_string(), AttributeValue::S(item.unit.clone())),
        ("hostname".to_string(), AttributeValue::S(item.hostname.clone())),
        ("region".to_string(), AttributeValue::S(item.region.clone())),
        ("environment".to_string(), AttributeValue::S(item.environment.clone())),
        ("ttl".to_string(), AttributeValue::N(item.ttl.to_string())),
    ]);
    if let Some(tags) = &item.tags {
        attributes.insert("tags".to_string(), json_to_attribute(tags));
    }
    if let Some(collected_at) = &item.collected_at {
        attributes.insert(
            "collected_at".to_string(),
            AttributeValue::S(collected_at.clone()),
        );
    }
    attributes
}

#[async_trait]
impl MetricTable for DynamoDbTable {
    async fn put_batch(&self, items: &[TableItem]) -> Result<(), TableWriteError> {
        let requests = items
            .iter()
            .map(|item| {
                PutRequest::builder()
                    .set_item(Some(to_attributes(item)))
                    .build()
                    .map(|put| WriteRequest::builder().put_request(put).build())
                    .map_err(|e| TableWriteError::InvalidRequest(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, requests)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some(code) if THROTTLING_CODES.contains(&code) => TableWriteError::Throttled {
                    code: code.to_string(),
                },
                Some(code) => TableWriteError::Rejected {
                    code: code.to_string(),
                    message: e.message().unwrap_or_default().to_string(),
                },
                None => TableWriteError::Transport(e.to_string()),
            })?;

        let unprocessed = response
            .unprocessed_items()
            .map(|tables| tables.values().map(Vec::len).sum::<usize>())
            .unwrap_or(0);
        if unprocessed > 0 {
            debug!("{} items left unprocessed by {}", unprocessed, self.table_name);
            return Err(TableWriteError::Throttled {
                code: "UnprocessedItems".to_string(),
            });
        }

        Ok(())
    }
}

/// How records are chunked and how throttled chunks are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            batch_size: MAX_BATCH_SIZE,
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn load_from_env() -> Result<RetryPolicy, String> {
        let batch_size = env::var("BATCH_SIZE")
            .unwrap_or(MAX_BATCH_SIZE.to_string())
            .parse::<usize>()
            .map_err(|e| format!("Error parsing BATCH_SIZE to usize - {}", e))?;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "BATCH_SIZE must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, batch_size
            ));
        }

        let max_attempts = env::var("MAX_RETRIES")
            .unwrap_or("3".to_string())
            .parse::<u32>()
            .map_err(|e| format!("Error parsing MAX_RETRIES to u32 - {}", e))?;
        if max_attempts == 0 {
            return Err("MAX_RETRIES must be at least 1".to_string());
        }

        let base_delay = env::var("RETRY_BASE_DELAY_MS")
            .unwrap_or("500".to_string())
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| format!("Error parsing RETRY_BASE_DELAY_MS to u64 - {}", e))?;

        Ok(RetryPolicy {
            batch_size,
            max_attempts,
            base_delay,
        })
    }

    /// backoff_delay - wait before the attempt following `attempt` (0-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedChunk {
    pub items: Vec<TableItem>,
    pub error: TableWriteError,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchWriteOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_chunks: Vec<FailedChunk>,
}

/// Writes `items` in chunks of `policy.batch_size`.
///
/// Throttled chunks are retried with exponential backoff until
/// `policy.max_attempts` is reached; any other error fails the chunk at once.
/// Failed chunks are forwarded to `dlq` when one is given. Every item ends up
/// counted exactly once as succeeded or failed.
pub async fn write_batches(
    table: &dyn MetricTable,
    items: &[TableItem],
    policy: &RetryPolicy,
    dlq: Option<&dyn DeadLetterQueue>,
) -> BatchWriteOutcome {
    let mut outcome = BatchWriteOutcome::default();
    let batch_size = policy.batch_size.clamp(1, MAX_BATCH_SIZE);
    let max_attempts = policy.max_attempts.max(1);

    for (index, chunk) in items.chunks(batch_size).enumerate() {
        let mut attempt = 0;
        let result = loop {
            match table.put_batch(chunk).await {
                Ok(()) => break Ok(()),
                Err(e) if e.is_throttling() && attempt + 1 < max_attempts => {
                    let delay = policy.backoff_delay(attempt);
                    warn!(
                        chunk = index,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "table throttled, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(()) => {
                outcome.succeeded += chunk.len();
                debug!(chunk = index, items = chunk.len(), "wrote batch");
            }
            Err(e) => {
                if e.is_throttling() {
                    error!(
                        chunk = index,
                        items = chunk.len(),
                        attempts = max_attempts,
                        "table throttling persists, giving up on batch"
                    );
                } else {
                    error!(chunk = index, items = chunk.len(), error = %e, "batch write failed");
                }
                outcome.failed += chunk.len();

                if let Some(dlq) = dlq {
                    let letter = DeadLetter::metrics(chunk.to_vec(), e.to_string());
                    match dlq.send(&letter).await {
                        Ok(()) => info!("sent {} failed metrics to DLQ", chunk.len()),
                        Err(dlq_err) => {
                            error!("failed to send batch to DLQ: {}", dlq_err)
                        }
                    }
                }

                outcome.failed_chunks.push(FailedChunk {
                    items: chunk.to_vec(),
                    error: e,
                });
            }
        }
    }

    info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "batch write finished"
    );
    outcome
}
