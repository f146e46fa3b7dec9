use chrono::DateTime;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Read;
use tracing::{debug, warn};

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A metric that passed validation, in the shape written to object storage by
/// the collector and read back by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub metric_id: String,
    pub timestamp: i64,
    pub metric_type: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
}

/// A row of the metrics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableItem {
    pub metric_id: String,
    pub timestamp: i64,
    pub metric_type: String,
    pub value: f64,
    pub unit: String,
    pub hostname: String,
    pub region: String,
    pub environment: String,
    pub ttl: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
}

/// Values used for fields a record leaves out.
#[derive(Debug, Clone)]
pub struct ItemDefaults<'a> {
    pub region: &'a str,
    pub environment: &'a str,
}

impl TableItem {
    pub fn from_record(record: &MetricRecord, ttl: i64, defaults: &ItemDefaults) -> TableItem {
        TableItem {
            metric_id: record.metric_id.clone(),
            timestamp: record.timestamp,
            metric_type: record.metric_type.clone(),
            value: record.value,
            unit: record.unit.clone().unwrap_or_else(|| "unknown".to_string()),
            hostname: record.hostname.clone(),
            region: record
                .region
                .clone()
                .unwrap_or_else(|| defaults.region.to_string()),
            environment: record
                .environment
                .clone()
                .unwrap_or_else(|| defaults.environment.to_string()),
            ttl,
            tags: record.tags.clone(),
            collected_at: record.collected_at.clone(),
        }
    }
}

/// ttl_from - expiry in unix seconds, `ttl_days` after `now`
pub fn ttl_from(now: i64, ttl_days: i64) -> i64 {
    now + ttl_days * SECONDS_PER_DAY
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unexpected JSON structure: expected object or array, got {0}")]
    UnexpectedStructure(&'static str),
    #[error("failed to decompress gzip data: {0}")]
    Gzip(#[from] std::io::Error),
}

fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

fn ungzip(data: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut output = Vec::new();
    decoder.read_to_end(&mut output)?;
    Ok(output)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decodes an object body into candidate documents.
///
/// The body may be gzip compressed, and holds either a single JSON value or a
/// stream of values (newline delimited JSON). Top-level arrays are flattened
/// one level.
pub fn parse_documents(data: &[u8]) -> Result<Vec<Value>, ParseError> {
    let decompressed;
    let data = if is_gzipped(data) {
        decompressed = ungzip(data)?;
        debug!("decompressed {} bytes", decompressed.len());
        &decompressed[..]
    } else {
        data
    };

    let mut documents = Vec::new();
    for value in serde_json::Deserializer::from_slice(data).into_iter::<Value>() {
        match value? {
            Value::Array(items) => documents.extend(items),
            object @ Value::Object(_) => documents.push(object),
            other => return Err(ParseError::UnexpectedStructure(kind(&other))),
        }
    }
    Ok(documents)
}

#[derive(Debug, Default, PartialEq)]
pub struct Validation {
    pub records: Vec<MetricRecord>,
    pub rejected: usize,
}

#[derive(Deserialize)]
struct FlatMetric {
    metric_id: Value,
    timestamp: Value,
    metric_type: String,
    value: Value,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    host_id: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    server_id: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    collected_at: Option<String>,
}

impl FlatMetric {
    /// The host name under whichever key the producer used.
    fn host(&mut self) -> Option<String> {
        self.hostname
            .take()
            .or_else(|| self.host_id.take())
            .or_else(|| self.instance_id.take())
            .or_else(|| self.server_id.take())
    }
}

#[derive(Deserialize)]
struct Envelope {
    timestamp: Value,
    region: String,
    instance_id: String,
    #[serde(default)]
    environment: Option<String>,
    metrics: Map<String, Value>,
}

/// Coerces a timestamp to unix seconds. Accepts integers, floats (truncated),
/// integer strings and RFC 3339 strings.
pub fn coerce_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp())
            })
        }
        _ => None,
    }
}

/// Coerces a metric id to a string. Numbers are accepted as their decimal form.
pub fn coerce_metric_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerces a metric value to a finite float. Accepts numbers and numeric strings.
pub fn coerce_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Envelopes carry a `metrics` object and no `metric_id` of their own.
fn is_envelope(document: &Value) -> bool {
    document.get("metrics").is_some_and(Value::is_object) && document.get("metric_id").is_none()
}

/// Validates decoded documents, dropping anything malformed.
pub fn validate(documents: Vec<Value>) -> Validation {
    let mut validation = Validation::default();
    for document in documents {
        if !document.is_object() {
            warn!("skipping metric that is not a JSON object: {}", document);
            validation.rejected += 1;
            continue;
        }
        if is_envelope(&document) {
            validate_envelope(document, &mut validation);
        } else {
            validate_flat(document, &mut validation);
        }
    }
    validation
}

fn validate_flat(document: Value, validation: &mut Validation) {
    let mut raw: FlatMetric = match serde_json::from_value(document.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("skipping invalid metric ({}): {}", e, document);
            validation.rejected += 1;
            return;
        }
    };

    let Some(hostname) = raw.host() else {
        warn!("skipping metric without hostname: {}", document);
        validation.rejected += 1;
        return;
    };

    let (Some(metric_id), Some(timestamp), Some(value)) = (
        coerce_metric_id(&raw.metric_id),
        coerce_timestamp(&raw.timestamp),
        coerce_value(&raw.value),
    ) else {
        warn!("skipping metric with invalid data types: {}", document);
        validation.rejected += 1;
        return;
    };

    validation.records.push(MetricRecord {
        metric_id,
        timestamp,
        metric_type: raw.metric_type,
        value,
        unit: raw.unit,
        hostname,
        region: raw.region,
        environment: raw.environment,
        tags: raw.tags,
        collected_at: raw.collected_at,
    });
}

fn validate_envelope(document: Value, validation: &mut Validation) {
    let envelope: Envelope = match serde_json::from_value(document.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("skipping invalid metrics envelope ({}): {}", e, document);
            validation.rejected += 1;
            return;
        }
    };

    let Some(timestamp) = coerce_timestamp(&envelope.timestamp) else {
        warn!("skipping metrics envelope with invalid timestamp: {}", document);
        validation.rejected += 1;
        return;
    };

    for (name, raw_value) in envelope.metrics {
        // booleans are numbers to some producers, never to us
        let value = match raw_value {
            Value::Number(ref n) => n.as_f64().filter(|v| v.is_finite()),
            _ => None,
        };
        let Some(value) = value else {
            warn!("skipping non-numeric metric {} = {}", name, raw_value);
            validation.rejected += 1;
            continue;
        };
        validation.records.push(MetricRecord {
            metric_id: format!("{}#{}#{}", name, envelope.instance_id, timestamp),
            timestamp,
            metric_type: name,
            value,
            unit: None,
            hostname: envelope.instance_id.clone(),
            region: Some(envelope.region.clone()),
            environment: envelope.environment.clone(),
            tags: None,
            collected_at: None,
        });
    }
}
