use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

use crate::collector::config::OutputFormat;
use crate::metric::MetricRecord;
use crate::publish::{Datum, Unit};

/// Labels stamped on every generated record.
#[derive(Debug, Clone)]
pub struct Origin<'a> {
    pub region: &'a str,
    pub environment: Option<&'a str>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A plausible reading for `metric_type` and its unit.
pub fn sample_value<R: Rng>(rng: &mut R, metric_type: &str) -> (f64, &'static str) {
    match metric_type {
        "cpu" => (round2(rng.gen_range(10.0..=95.0)), "percent"),
        "memory" => (round2(rng.gen_range(20.0..=90.0)), "percent"),
        "disk" => (round2(rng.gen_range(30.0..=85.0)), "percent"),
        "network" => (round2(rng.gen_range(100.0..=10000.0)), "mbps"),
        _ => (0.0, "unknown"),
    }
}

pub fn generate_metric<R: Rng>(
    rng: &mut R,
    metric_type: &str,
    host: &str,
    now: DateTime<Utc>,
    origin: &Origin,
) -> MetricRecord {
    let timestamp = now.timestamp();
    let (value, unit) = sample_value(rng, metric_type);
    MetricRecord {
        metric_id: format!("{}-{}-{}", metric_type, timestamp, host),
        timestamp,
        metric_type: metric_type.to_string(),
        value,
        unit: Some(unit.to_string()),
        hostname: host.to_string(),
        region: Some(origin.region.to_string()),
        environment: origin.environment.map(str::to_string),
        tags: None,
        collected_at: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// One record per host and metric type, hosts in the outer loop.
pub fn generate_batch<R: Rng>(
    rng: &mut R,
    hosts: &[String],
    metric_types: &[String],
    now: DateTime<Utc>,
    origin: &Origin,
) -> Vec<MetricRecord> {
    hosts
        .iter()
        .flat_map(|host| metric_types.iter().map(move |t| (host, t)))
        .map(|(host, metric_type)| generate_metric(rng, metric_type, host, now, origin))
        .collect()
}

/// object_key - `{prefix}/{YYYY}/{MM}/{DD}/metrics-{unix}.json`, dated in UTC
pub fn object_key(prefix: &str, now: DateTime<Utc>) -> String {
    let path = format!("{}/metrics-{}.json", now.format("%Y/%m/%d"), now.timestamp());
    if prefix.is_empty() {
        path
    } else {
        format!("{}/{}", prefix, path)
    }
}

pub fn render(records: &[MetricRecord], format: OutputFormat) -> Result<Vec<u8>, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_vec_pretty(records),
        OutputFormat::JsonLines => {
            let mut body = Vec::new();
            for record in records {
                serde_json::to_writer(&mut body, record)?;
                body.push(b'\n');
            }
            Ok(body)
        }
    }
}

fn unit_for(unit: Option<&str>) -> Unit {
    match unit {
        Some("percent") => Unit::Percent,
        Some("mbps") => Unit::MegabitsPerSecond,
        _ => Unit::None,
    }
}

/// One datum per record, named after the metric type.
pub fn to_datums(records: &[MetricRecord], now: DateTime<Utc>, region: &str) -> Vec<Datum> {
    records
        .iter()
        .map(|record| Datum {
            name: record.metric_type.clone(),
            value: record.value,
            unit: unit_for(record.unit.as_deref()),
            dimensions: vec![
                (
                    "Region".to_string(),
                    record.region.clone().unwrap_or(region.to_string()),
                ),
                ("InstanceID".to_string(), record.hostname.clone()),
            ],
            timestamp: now,
        })
        .collect()
}
