use chrono::Utc;
use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clients::Services;
use crate::dlq::DeadLetter;
use crate::events;
use crate::processor::config::Config;
use crate::processor::process::ProcessError;
use crate::publish::Datum;
use crate::response::Response;

pub mod config;
pub mod process;

/// Totals reported back for one invocation of the processor.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub total_files: usize,
    pub total_metrics: usize,
    pub invalid_metrics: usize,
    pub successful_writes: usize,
    pub failed_writes: usize,
    pub errors: Vec<String>,
}

impl ProcessingSummary {
    fn status_code(&self) -> u16 {
        if self.failed_writes > 0 || !self.errors.is_empty() {
            207
        } else {
            200
        }
    }
}

// lambda handler
pub async fn handler(
    services: &Services,
    config: &Config,
    evt: LambdaEvent<Value>,
) -> Result<Response<ProcessingSummary>, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    let mut summary = ProcessingSummary::default();

    let objects = match events::decode_object_refs(&evt.payload) {
        Ok(objects) => objects,
        Err(e) => {
            let message = format!("Lambda execution failed: {}", e);
            error!("{}", message);
            summary.errors.push(e.to_string());

            if let Some(dlq) = &services.dlq {
                let letter = DeadLetter::event(evt.payload.clone(), e.to_string());
                if let Err(dlq_err) = dlq.send(&letter).await {
                    error!("Failed to send event to DLQ: {}", dlq_err);
                }
            }

            publish_processing_metrics(services, config, &summary).await;
            return Ok(Response::new(500, message, Some(summary)));
        }
    };

    if objects.is_empty() {
        warn!("No S3 records found in event");
        return Ok(Response::new(400, "No S3 records found in event", None));
    }

    summary.total_files = objects.len();
    let now = Utc::now().timestamp();

    for object in &objects {
        match process::process_object(services, config, object, now).await {
            Ok(report) => {
                summary.total_metrics += report.total_metrics;
                summary.invalid_metrics += report.invalid_metrics;
                summary.successful_writes += report.outcome.succeeded;
                summary.failed_writes += report.outcome.failed;
            }
            Err(e) => {
                if let ProcessError::NoValidMetrics { rejected, .. } = &e {
                    summary.total_metrics += rejected;
                    summary.invalid_metrics += rejected;
                }
                let message = format!("Error processing {}: {}", object.key, e);
                error!("{}", message);
                summary.errors.push(message);
            }
        }
    }

    publish_processing_metrics(services, config, &summary).await;

    info!(
        files = summary.total_files,
        metrics = summary.total_metrics,
        succeeded = summary.successful_writes,
        failed = summary.failed_writes,
        "Processing complete"
    );

    Ok(Response::new(
        summary.status_code(),
        "Processing complete",
        Some(summary),
    ))
}

async fn publish_processing_metrics(
    services: &Services,
    config: &Config,
    summary: &ProcessingSummary,
) {
    let datums = vec![
        Datum::count("MetricsProcessed", summary.total_metrics),
        Datum::count("SuccessfulWrites", summary.successful_writes),
        Datum::count("FailedWrites", summary.failed_writes),
        Datum::count("FilesProcessed", summary.total_files),
    ];

    match services.publisher.publish(&config.namespace, datums).await {
        Ok(()) => debug!("Published processing metrics to {}", config.namespace),
        Err(e) => warn!("Failed to publish CloudWatch metrics: {}", e),
    }
}
