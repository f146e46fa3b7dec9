use std::str::FromStr;
use std::{env, fmt};

use crate::config::{flag_from_env, region_from_env, ttl_days_from_env};
use crate::table::RetryPolicy;

/// Layout of the object written to the bucket.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum OutputFormat {
    /// A pretty printed JSON array.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::JsonLines),
            other => Err(format!("Invalid or Unsupported output format {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

pub struct Config {
    pub bucket: String,
    pub key_prefix: String,
    pub host_ids: Vec<String>,
    pub metric_types: Vec<String>,
    pub region: String,
    pub environment: Option<String>,
    pub output_format: OutputFormat,
    pub write_to_table: bool,
    pub publish_metrics: bool,
    pub table_name: String,
    pub namespace: String,
    pub ttl_days: i64,
    pub retry: RetryPolicy,
    pub dlq_url: Option<String>,
}

fn list_from_env(name: &str, default: &[&str]) -> Vec<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

impl Config {
    pub fn load_from_env() -> Result<Config, String> {
        let conf = Config {
            bucket: env::var("BUCKET_NAME")
                .unwrap_or("infra-monitoring-pipeline-data".to_string()),
            key_prefix: env::var("KEY_PREFIX")
                .unwrap_or("metrics".to_string())
                .trim_matches('/')
                .to_string(),
            host_ids: list_from_env(
                "HOST_IDS",
                &["host-001", "host-002", "host-003", "host-004", "host-005"],
            ),
            metric_types: list_from_env("METRIC_TYPES", &["cpu", "memory", "disk", "network"]),
            region: region_from_env(),
            environment: env::var("ENVIRONMENT").ok().filter(|s| !s.is_empty()),
            output_format: env::var("OUTPUT_FORMAT")
                .unwrap_or("json".to_string())
                .parse()?,
            write_to_table: flag_from_env("WRITE_TO_TABLE"),
            publish_metrics: flag_from_env("PUBLISH_METRICS"),
            table_name: env::var("DYNAMODB_TABLE").unwrap_or("InfraMetrics".to_string()),
            namespace: env::var("CLOUDWATCH_NAMESPACE")
                .unwrap_or("InfraMonitoring".to_string()),
            ttl_days: ttl_days_from_env()?,
            retry: RetryPolicy::load_from_env()?,
            dlq_url: env::var("DLQ_URL").ok().filter(|s| !s.trim().is_empty()),
        };

        Ok(conf)
    }
}
