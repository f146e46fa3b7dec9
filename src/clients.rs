use aws_config::SdkConfig;
use aws_sdk_cloudwatch::Client as CloudWatchClient;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sqs::Client as SqsClient;
use std::sync::Arc;

use crate::dlq::{DynDeadLetterQueue, SqsDeadLetterQueue};
use crate::publish::{CloudWatchPublisher, DynMetricsPublisher};
use crate::table::{table_client, DynMetricTable, DynamoDbTable};

/// A type used to hold the AWS clients required to interact with AWS services
/// used by the lambda functions.
#[derive(Clone)]
pub struct AwsClients {
    pub s3: S3Client,
    pub dynamodb: DynamoDbClient,
    pub cloudwatch: CloudWatchClient,
    pub sqs: SqsClient,
}

impl AwsClients {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        AwsClients {
            s3: S3Client::new(sdk_config),
            dynamodb: table_client(aws_sdk_dynamodb::config::Builder::from(sdk_config)),
            cloudwatch: CloudWatchClient::new(sdk_config),
            sqs: SqsClient::new(sdk_config),
        }
    }
}

/// The managed services a handler talks to.
///
/// S3 is used through its client directly; the table, metrics endpoint and
/// dead-letter queue sit behind traits so they can be swapped in tests.
#[derive(Clone)]
pub struct Services {
    pub s3: S3Client,
    pub table: DynMetricTable,
    pub publisher: DynMetricsPublisher,
    pub dlq: Option<DynDeadLetterQueue>,
}

impl Services {
    pub fn new(clients: &AwsClients, table_name: &str, dlq_url: Option<&str>) -> Self {
        Services {
            s3: clients.s3.clone(),
            table: Arc::new(DynamoDbTable::new(clients.dynamodb.clone(), table_name)),
            publisher: Arc::new(CloudWatchPublisher::new(clients.cloudwatch.clone())),
            dlq: dlq_url.map(|url| {
                Arc::new(SqsDeadLetterQueue::new(clients.sqs.clone(), url)) as DynDeadLetterQueue
            }),
        }
    }
}
