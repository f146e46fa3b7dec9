#![allow(dead_code)]

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
use infra_metrics_pipeline::dlq::{DeadLetter, DeadLetterQueue, DlqError};
use infra_metrics_pipeline::metric::TableItem;
use infra_metrics_pipeline::publish::{Datum, MetricsPublisher, PublishError};
use infra_metrics_pipeline::table::{MetricTable, TableWriteError};
use infra_metrics_pipeline::Services;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn s3event_string(bucket: &str, key: &str) -> String {
    format!(
        r#"{{
        "Records": [
            {{
            "eventVersion": "2.0",
            "eventSource": "aws:s3",
            "awsRegion": "eu-west-1",
            "eventTime": "1970-01-01T00:00:00.000Z",
            "eventName": "ObjectCreated:Put",
            "userIdentity": {{
                "principalId": "EXAMPLE"
            }},
            "requestParameters": {{
                "sourceIPAddress": "127.0.0.1"
            }},
            "responseElements": {{
                "x-amz-request-id": "EXAMPLE123456789",
                "x-amz-id-2": "EXAMPLE123/5678abcdefghijklambdaisawesome/mnopqrstuvwxyzABCDEFGH"
            }},
            "s3": {{
                "s3SchemaVersion": "1.0",
                "configurationId": "testConfigRule",
                "bucket": {{
                "name": "{}",
                "ownerIdentity": {{
                    "principalId": "EXAMPLE"
                }},
                "arn": "arn:aws:s3:::{}"
                }},
                "object": {{
                "key": "{}",
                "size": 1024,
                "eTag": "0123456789abcdef0123456789abcdef",
                "sequencer": "0A1B2C3D4E5F678901"
                }}
            }}
            }}
        ]
    }}"#,
        bucket, bucket, key
    )
}

/// An S3 response the mock client replays: status code and body.
pub struct MockResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn ok() -> Self {
        MockResponse {
            status: 200,
            body: Vec::new(),
        }
    }

    pub fn file(path: &str) -> Self {
        MockResponse {
            status: 200,
            body: std::fs::read(path).expect("failed to read fixture"),
        }
    }

    pub fn body(data: impl Into<Vec<u8>>) -> Self {
        MockResponse {
            status: 200,
            body: data.into(),
        }
    }

    pub fn error(status: u16, code: &str) -> Self {
        MockResponse {
            status,
            body: format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>mocked</Message></Error>",
                code
            )
            .into_bytes(),
        }
    }
}

// get_mock_s3client returns a mock s3 client that replays the given responses in order
pub fn get_mock_s3client(responses: Vec<MockResponse>) -> (Client, StaticReplayClient) {
    let events = responses
        .into_iter()
        .map(|response| {
            ReplayEvent::new(
                http::Request::builder()
                    .body(aws_smithy_types::body::SdkBody::from(""))
                    .unwrap(),
                http::Response::builder()
                    .status(response.status)
                    .body(aws_smithy_types::body::SdkBody::from(response.body))
                    .unwrap(),
            )
        })
        .collect::<Vec<_>>();
    let http_client = StaticReplayClient::new(events);

    let conf = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            "SOMETESTKEYID",
            "somesecretkey",
            Some("somesessiontoken".to_string()),
            None,
            "",
        ))
        .region(aws_sdk_s3::config::Region::new("eu-west-1"))
        .http_client(http_client.clone())
        .build();

    (aws_sdk_s3::Client::from_conf(conf), http_client)
}

/// Table fake that records every batch it is handed. Scripted results are
/// returned in order, after which every call succeeds.
#[derive(Default, Debug, Clone)]
pub struct FakeTable {
    batches: Arc<Mutex<Vec<Vec<TableItem>>>>,
    script: Arc<Mutex<VecDeque<Result<(), TableWriteError>>>>,
}

impl FakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Result<(), TableWriteError>>) -> Self {
        FakeTable {
            batches: Arc::default(),
            script: Arc::new(Mutex::new(script.into())),
        }
    }

    pub fn take_batches(&self) -> Vec<Vec<TableItem>> {
        std::mem::take(&mut self.batches.lock().unwrap())
    }
}

#[async_trait]
impl MetricTable for FakeTable {
    async fn put_batch(&self, items: &[TableItem]) -> Result<(), TableWriteError> {
        self.batches.lock().unwrap().push(items.to_vec());
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default, Debug, Clone)]
pub struct FakePublisher {
    published: Arc<Mutex<Vec<(String, Vec<Datum>)>>>,
    fail: bool,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        FakePublisher {
            published: Arc::default(),
            fail: true,
        }
    }

    pub fn take_published(&self) -> Vec<(String, Vec<Datum>)> {
        std::mem::take(&mut self.published.lock().unwrap())
    }
}

#[async_trait]
impl MetricsPublisher for FakePublisher {
    async fn publish(&self, namespace: &str, datums: Vec<Datum>) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Send {
                namespace: namespace.to_string(),
                message: "AccessDenied".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((namespace.to_string(), datums));
        Ok(())
    }
}

#[derive(Default, Debug, Clone)]
pub struct FakeDlq {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl FakeDlq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_letters(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut self.letters.lock().unwrap())
    }
}

#[async_trait]
impl DeadLetterQueue for FakeDlq {
    async fn send(&self, letter: &DeadLetter) -> Result<(), DlqError> {
        self.letters.lock().unwrap().push(letter.clone());
        Ok(())
    }
}

/// Fakes behind a set of services, kept around for assertions.
pub struct Harness {
    pub services: Services,
    pub s3: StaticReplayClient,
    pub table: FakeTable,
    pub publisher: FakePublisher,
    pub dlq: FakeDlq,
}

impl Harness {
    pub fn new(responses: Vec<MockResponse>, table: FakeTable, with_dlq: bool) -> Self {
        Self::with_publisher(responses, table, FakePublisher::new(), with_dlq)
    }

    pub fn with_publisher(
        responses: Vec<MockResponse>,
        table: FakeTable,
        publisher: FakePublisher,
        with_dlq: bool,
    ) -> Self {
        let (s3_client, s3) = get_mock_s3client(responses);
        let dlq = FakeDlq::new();
        let services = Services {
            s3: s3_client,
            table: Arc::new(table.clone()),
            publisher: Arc::new(publisher.clone()),
            dlq: if with_dlq {
                Some(Arc::new(dlq.clone()))
            } else {
                None
            },
        };
        Harness {
            services,
            s3,
            table,
            publisher,
            dlq,
        }
    }
}
