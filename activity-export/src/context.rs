use chrono::Utc;
use chrono_tz::Tz;
use tracing::info;

use crate::client::ApiClient;
use crate::config::{Config, SinkKind};
use crate::error::ConfigError;
use crate::sink::{CsvSink, DorisSink, Sink};
use crate::window::TimeWindow;

/// Everything a run needs, built once from the configuration and shared by
/// reference with every pipeline.
pub struct AppContext {
    pub config: Config,
    pub window: TimeWindow,
    pub client: ApiClient,
    pub sink: Box<dyn Sink>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, ConfigError> {
        let window = TimeWindow::new(config.since.as_deref(), config.until.as_deref())?;
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(config.timezone.clone()))?;
        let client = ApiClient::new(config)?;

        let sink: Box<dyn Sink> = match config.sink {
            SinkKind::Csv => {
                let dir = config
                    .output_dir
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| window.output_dir_name(tz, Utc::now()));
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|source| ConfigError::OutputDir {
                        path: dir.clone(),
                        source,
                    })?;
                info!("Writing csv output to {dir}");
                Box::new(CsvSink::new(dir))
            }
            SinkKind::Doris => {
                info!(
                    "Writing to doris at {}:{}/{}",
                    config.doris.host, config.doris.port, config.doris.database
                );
                Box::new(DorisSink::new(&config.doris, config.batch_size))
            }
        };

        Ok(Self {
            config: config.clone(),
            window,
            client,
            sink,
        })
    }
}
