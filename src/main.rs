use aws_config::BehaviorVersion;
use infra_metrics_pipeline::config::FunctionMode;
use infra_metrics_pipeline::{collector, processor, AwsClients, Services};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    infra_metrics_pipeline::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let clients = AwsClients::new(&aws_config);
    let mode = FunctionMode::load_from_env()?;
    info!("Running as {}", mode);

    match mode {
        FunctionMode::Collector => {
            let config = collector::config::Config::load_from_env()?;
            let services = Services::new(&clients, &config.table_name, config.dlq_url.as_deref());

            run(service_fn(|request: LambdaEvent<Value>| {
                collector::handler(&services, &config, request)
            }))
            .await
        }
        FunctionMode::Processor => {
            let config = processor::config::Config::load_from_env()?;
            let services = Services::new(&clients, &config.table_name, config.dlq_url.as_deref());

            run(service_fn(|request: LambdaEvent<Value>| {
                processor::handler(&services, &config, request)
            }))
            .await
        }
    }
}
