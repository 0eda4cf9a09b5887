use activity_export::{config::Config, context::AppContext, export};
use envconfig::Envconfig;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
pub async fn main() {
    setup_tracing();
    info!("Starting up...");

    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let context = match AppContext::new(&config).await {
        Ok(context) => context,
        Err(e) => {
            error!("Failed to initialize: {e}");
            std::process::exit(1);
        }
    };

    if let (Some(since), Some(until)) = (context.window.since(), context.window.until()) {
        info!("Exporting activity from {} to {}", since.as_str(), until.as_str());
    }

    let report = export::run(&context).await;

    let total: usize = report.written.iter().map(|(_, count)| count).sum();
    info!(
        "Export finished: {total} rows across {} pipelines",
        report.written.len()
    );
    if !report.failed.is_empty() {
        warn!("Pipelines that failed: {}", report.failed.join(", "));
    }
}
