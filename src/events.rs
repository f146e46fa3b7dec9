use aws_lambda_events::event::s3::S3Event;
use aws_lambda_events::event::sns::SnsEvent;
use aws_lambda_events::event::sqs::SqsEvent;
use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info};

/// Events the processor can be triggered by. SNS and SQS events are expected
/// to carry S3 event notifications in their message bodies.
#[derive(Debug)]
pub enum Combined {
    S3(S3Event),
    Sns(SnsEvent),
    Sqs(SqsEvent),
}

impl<'de> Deserialize<'de> for Combined {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_value: Value = Deserialize::deserialize(deserializer)?;
        debug!("raw_value: {:?}", raw_value);

        if let Ok(event) = S3Event::deserialize(&raw_value) {
            info!("s3 event detected");
            return Ok(Combined::S3(event));
        }

        if let Ok(event) = SnsEvent::deserialize(&raw_value) {
            info!("sns event detected");
            return Ok(Combined::Sns(event));
        }

        if let Ok(event) = SqsEvent::deserialize(&raw_value) {
            info!("sqs event detected");
            return Ok(Combined::Sqs(event));
        }

        Err(de::Error::custom(format!(
            "unsupported event type: {raw_value}"
        )))
    }
}

impl Serialize for Combined {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Combined::S3(event) => event.serialize(serializer),
            Combined::Sns(event) => event.serialize(serializer),
            Combined::Sqs(event) => event.serialize(serializer),
        }
    }
}

/// The location of an object written to the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

#[derive(thiserror::Error, Debug)]
pub enum EventError {
    #[error("S3 record {0} has no bucket name")]
    MissingBucket(usize),
    #[error("S3 record {0} has no object key")]
    MissingKey(usize),
    #[error("object key is not valid UTF-8: {0}")]
    InvalidKey(#[from] std::str::Utf8Error),
    #[error("message body is not an S3 event notification: {0}")]
    NotAnS3Notification(serde_json::Error),
    #[error("{0}")]
    Unsupported(serde_json::Error),
}

/// Keys in S3 notifications are URL encoded, with spaces sent as `+`.
pub fn decode_key(key: &str) -> Result<String, EventError> {
    let decoded = percent_encoding::percent_decode_str(&key.replace('+', " "))
        .decode_utf8()?
        .to_string();
    Ok(decoded)
}

fn s3_object_refs(s3_event: &S3Event, refs: &mut Vec<ObjectRef>) -> Result<(), EventError> {
    for (index, record) in s3_event.records.iter().enumerate() {
        let bucket = record
            .s3
            .bucket
            .name
            .as_ref()
            .ok_or(EventError::MissingBucket(index))?
            .to_owned();
        let key = record
            .s3
            .object
            .key
            .as_deref()
            .ok_or(EventError::MissingKey(index))?;

        refs.push(ObjectRef {
            bucket,
            key: decode_key(key)?,
        });
    }
    Ok(())
}

fn is_s3_test_event(message: &str) -> bool {
    serde_json::from_str::<Value>(message)
        .ok()
        .and_then(|v| v.get("Event").and_then(Value::as_str).map(|e| e == "s3:TestEvent"))
        .unwrap_or(false)
}

fn wrapped_object_refs(message: &str, refs: &mut Vec<ObjectRef>) -> Result<(), EventError> {
    if is_s3_test_event(message) {
        info!("skipping S3 test event");
        return Ok(());
    }
    let s3_event =
        serde_json::from_str::<S3Event>(message).map_err(EventError::NotAnS3Notification)?;
    s3_object_refs(&s3_event, refs)
}

/// object_refs - flattens an event into the objects it announces, in record order
pub fn object_refs(event: &Combined) -> Result<Vec<ObjectRef>, EventError> {
    let mut refs = Vec::new();
    match event {
        Combined::S3(s3_event) => s3_object_refs(s3_event, &mut refs)?,
        Combined::Sns(sns_event) => {
            for record in &sns_event.records {
                wrapped_object_refs(&record.sns.message, &mut refs)?;
            }
        }
        Combined::Sqs(sqs_event) => {
            for record in &sqs_event.records {
                if let Some(body) = &record.body {
                    wrapped_object_refs(body, &mut refs)?;
                }
            }
        }
    }
    Ok(refs)
}

/// Decodes a raw invocation payload and returns the objects it announces.
pub fn decode_object_refs(payload: &Value) -> Result<Vec<ObjectRef>, EventError> {
    let event = Combined::deserialize(payload).map_err(EventError::Unsupported)?;
    object_refs(&event)
}
