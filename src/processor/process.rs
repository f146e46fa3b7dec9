use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::Client;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::clients::Services;
use crate::events::ObjectRef;
use crate::metric::{parse_documents, ttl_from, validate, ItemDefaults, ParseError, TableItem};
use crate::processor::config::Config;
use crate::table::{write_batches, BatchWriteOutcome};

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("failed to download {key}: {message}")]
    Download { key: String, message: String },
    #[error("failed to parse {key}: {source}")]
    Parse {
        key: String,
        #[source]
        source: ParseError,
    },
    #[error("no metrics found in {0}")]
    Empty(String),
    #[error("no valid metrics found in {key} ({rejected} rejected)")]
    NoValidMetrics { key: String, rejected: usize },
}

/// What happened to the metrics of one object.
#[derive(Debug, Default, PartialEq)]
pub struct ObjectReport {
    pub total_metrics: usize,
    pub invalid_metrics: usize,
    pub outcome: BatchWriteOutcome,
}

pub async fn get_bytes_from_s3(
    s3_client: &Client,
    bucket: &str,
    key: &str,
) -> Result<Vec<u8>, ProcessError> {
    let start_time = Instant::now();
    let response = s3_client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| {
            match e.code() {
                Some("NoSuchKey") => error!("S3 object not found: {}", key),
                Some("AccessDenied") => error!("Access denied to S3 object: {}", key),
                _ => error!("S3 error for {}: {}", key, DisplayErrorContext(&e)),
            }
            ProcessError::Download {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            }
        })?;
    info!(
        "Received response from S3 in {}ms",
        start_time.elapsed().as_millis()
    );

    // Downloading the content this way is faster and allocates less memory than using `body.collect().await?.to_vec()`
    let capacity = response.content_length.unwrap_or(64 * 1024).max(0) as usize;
    let mut data = Vec::with_capacity(capacity);
    let mut body = response.body;
    while let Some(result) = body.next().await {
        let bytes = result.map_err(|e| ProcessError::Download {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        data.extend_from_slice(&bytes[..])
    }

    info!(
        "Downloaded file from S3 in {}ms. Actual size: {} bytes. Name of the file: {}",
        start_time.elapsed().as_millis(),
        data.len(),
        key
    );

    Ok(data)
}

/// Downloads, validates and stores the metrics of one object.
pub async fn process_object(
    services: &Services,
    config: &Config,
    object: &ObjectRef,
    now: i64,
) -> Result<ObjectReport, ProcessError> {
    info!("Processing: s3://{}/{}", object.bucket, object.key);

    let data = get_bytes_from_s3(&services.s3, &object.bucket, &object.key).await?;
    let documents = parse_documents(&data).map_err(|source| {
        error!("Invalid JSON in {}: {}", object.key, source);
        ProcessError::Parse {
            key: object.key.clone(),
            source,
        }
    })?;
    if documents.is_empty() {
        return Err(ProcessError::Empty(object.key.clone()));
    }

    let validation = validate(documents);
    if validation.rejected > 0 {
        warn!(
            "{} of {} metrics in {} failed validation",
            validation.rejected,
            validation.records.len() + validation.rejected,
            object.key
        );
    }
    if validation.records.is_empty() {
        return Err(ProcessError::NoValidMetrics {
            key: object.key.clone(),
            rejected: validation.rejected,
        });
    }

    let defaults = ItemDefaults {
        region: &config.region,
        environment: &config.default_environment,
    };
    let ttl = ttl_from(now, config.ttl_days);
    let items = validation
        .records
        .iter()
        .map(|record| TableItem::from_record(record, ttl, &defaults))
        .collect::<Vec<_>>();

    let outcome = write_batches(
        &*services.table,
        &items,
        &config.retry,
        services.dlq.as_deref(),
    )
    .await;

    info!(
        "Processed {} metrics: {} succeeded, {} failed",
        items.len(),
        outcome.succeeded,
        outcome.failed
    );

    Ok(ObjectReport {
        total_metrics: validation.records.len() + validation.rejected,
        invalid_metrics: validation.rejected,
        outcome,
    })
}
