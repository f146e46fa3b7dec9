use async_trait::async_trait;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use aws_sdk_cloudwatch::Client as CloudWatchClient;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Largest number of datums sent in one PutMetricData call.
pub const MAX_DATUMS_PER_CALL: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Count,
    Percent,
    MegabitsPerSecond,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub name: String,
    pub value: f64,
    pub unit: Unit,
    pub dimensions: Vec<(String, String)>,
    pub timestamp: chrono::DateTime<Utc>,
}

impl Datum {
    pub fn count(name: &str, value: usize) -> Self {
        Datum {
            name: name.to_string(),
            value: value as f64,
            unit: Unit::Count,
            dimensions: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("failed to publish metrics to {namespace}: {message}")]
    Send { namespace: String, message: String },
}

#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    async fn publish(&self, namespace: &str, datums: Vec<Datum>) -> Result<(), PublishError>;
}

pub type DynMetricsPublisher = Arc<dyn MetricsPublisher>;

/// Publishes datums to CloudWatch metrics.
pub struct CloudWatchPublisher {
    client: CloudWatchClient,
}

impl CloudWatchPublisher {
    pub fn new(client: CloudWatchClient) -> Self {
        CloudWatchPublisher { client }
    }
}

fn standard_unit(unit: Unit) -> StandardUnit {
    match unit {
        Unit::Count => StandardUnit::Count,
        Unit::Percent => StandardUnit::Percent,
        Unit::MegabitsPerSecond => StandardUnit::MegabitsSecond,
        Unit::None => StandardUnit::None,
    }
}

fn to_metric_datum(datum: &Datum) -> MetricDatum {
    let dimensions = datum
        .dimensions
        .iter()
        .map(|(name, value)| {
            Dimension::builder()
                .name(name)
                .value(value)
                .build()
        })
        .collect::<Vec<_>>();

    MetricDatum::builder()
        .metric_name(&datum.name)
        .value(datum.value)
        .unit(standard_unit(datum.unit))
        .timestamp(DateTime::from_millis(datum.timestamp.timestamp_millis()))
        .set_dimensions(if dimensions.is_empty() {
            None
        } else {
            Some(dimensions)
        })
        .build()
}

#[async_trait]
impl MetricsPublisher for CloudWatchPublisher {
    async fn publish(&self, namespace: &str, datums: Vec<Datum>) -> Result<(), PublishError> {
        if datums.is_empty() {
            return Ok(());
        }

        let metric_data = datums.iter().map(to_metric_datum).collect::<Vec<_>>();
        let chunks = metric_data
            .chunks(MAX_DATUMS_PER_CALL)
            .map(<[_]>::to_vec)
            .collect::<Vec<_>>();

        // Send chunks concurrently, but not more than 5 simultaneously.
        let results = futures::stream::iter(chunks)
            .map(|chunk| {
                self.client
                    .put_metric_data()
                    .namespace(namespace)
                    .set_metric_data(Some(chunk))
                    .send()
            })
            .buffer_unordered(5)
            .collect::<Vec<_>>()
            .await;

        for result in results {
            result.map_err(|e| PublishError::Send {
                namespace: namespace.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        }

        debug!("published {} datums to {}", datums.len(), namespace);
        Ok(())
    }
}
