use std::env;
use std::string::String;

use crate::config::{region_from_env, ttl_days_from_env};
use crate::table::RetryPolicy;

pub struct Config {
    pub table_name: String,
    pub region: String,
    pub default_environment: String,
    pub ttl_days: i64,
    pub retry: RetryPolicy,
    pub dlq_url: Option<String>,
    pub namespace: String,
}

impl Config {
    pub fn load_from_env() -> Result<Config, String> {
        let conf = Config {
            table_name: env::var("DYNAMODB_TABLE").unwrap_or("InfraMetrics".to_string()),
            region: region_from_env(),
            default_environment: env::var("DEFAULT_ENVIRONMENT")
                .unwrap_or("unknown".to_string()),
            ttl_days: ttl_days_from_env()?,
            retry: RetryPolicy::load_from_env()?,
            dlq_url: env::var("DLQ_URL").ok().filter(|s| !s.trim().is_empty()),
            namespace: env::var("CLOUDWATCH_NAMESPACE")
                .unwrap_or("InfraMonitoring/Pipeline".to_string()),
        };

        Ok(conf)
    }
}
