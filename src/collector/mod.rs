use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use aws_smithy_types::body::SdkBody;
use aws_smithy_types::byte_stream::ByteStream;
use chrono::Utc;
use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clients::Services;
use crate::collector::config::{Config, OutputFormat};
use crate::collector::generate::{generate_batch, object_key, render, to_datums, Origin};
use crate::metric::{ttl_from, ItemDefaults, MetricRecord, TableItem};
use crate::response::Response;
use crate::table::write_batches;

pub mod config;
pub mod generate;

/// What one run of the collector produced.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub s3_key: String,
    pub metrics_count: usize,
    pub timestamp: i64,
    pub table_writes_succeeded: usize,
    pub table_writes_failed: usize,
    pub published: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("failed to render metrics: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed uploading file to bucket {bucket} - {message}")]
    Upload { bucket: String, message: String },
}

async fn upload(
    s3_client: &S3Client,
    bucket: &str,
    key: &str,
    records: &[MetricRecord],
    format: OutputFormat,
) -> Result<(), CollectError> {
    let start_time = Instant::now();
    let data = render(records, format)?;
    let size = data.len();
    let buffer = ByteStream::new(SdkBody::from(data));

    debug!("uploading metrics to S3: s3://{}/{}", bucket, key);
    s3_client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/json")
        .body(buffer)
        .send()
        .await
        .map_err(|e| CollectError::Upload {
            bucket: bucket.to_string(),
            message: DisplayErrorContext(&e).to_string(),
        })?;

    info!(
        "Uploaded {} bytes to s3://{}/{} in {}ms",
        size,
        bucket,
        key,
        start_time.elapsed().as_millis()
    );
    Ok(())
}

// lambda handler; the scheduled trigger carries nothing we use
pub async fn handler(
    services: &Services,
    config: &Config,
    evt: LambdaEvent<Value>,
) -> Result<Response<CollectionSummary>, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    let now = Utc::now();
    let origin = Origin {
        region: &config.region,
        environment: config.environment.as_deref(),
    };
    let records = {
        let mut rng = rand::thread_rng();
        generate_batch(&mut rng, &config.host_ids, &config.metric_types, now, &origin)
    };
    info!("Generated {} metrics", records.len());

    let key = object_key(&config.key_prefix, now);
    if let Err(e) = upload(&services.s3, &config.bucket, &key, &records, config.output_format).await
    {
        error!("Error generating metrics: {}", e);
        return Ok(Response::new(500, "Error generating metrics", None));
    }

    let mut summary = CollectionSummary {
        s3_key: key,
        metrics_count: records.len(),
        timestamp: now.timestamp(),
        ..Default::default()
    };

    if config.write_to_table {
        let defaults = ItemDefaults {
            region: &config.region,
            environment: config.environment.as_deref().unwrap_or("unknown"),
        };
        let items = records
            .iter()
            .map(|r| TableItem::from_record(r, ttl_from(r.timestamp, config.ttl_days), &defaults))
            .collect::<Vec<_>>();
        let outcome = write_batches(
            &*services.table,
            &items,
            &config.retry,
            services.dlq.as_deref(),
        )
        .await;
        info!(
            "Wrote {} metrics to {}: {} failed",
            outcome.succeeded, config.table_name, outcome.failed
        );
        summary.table_writes_succeeded = outcome.succeeded;
        summary.table_writes_failed = outcome.failed;
    }

    if config.publish_metrics {
        let datums = to_datums(&records, now, &config.region);
        match services.publisher.publish(&config.namespace, datums).await {
            Ok(()) => {
                info!("Published {} metrics to {}", records.len(), config.namespace);
                summary.published = true;
            }
            Err(e) => warn!("Failed to publish CloudWatch metrics: {}", e),
        }
    }

    let status_code = if summary.table_writes_failed > 0 {
        207
    } else {
        200
    };
    Ok(Response::new(
        status_code,
        "Metrics generated and uploaded successfully",
        Some(summary),
    ))
}
