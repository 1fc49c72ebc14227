use crate::config::parse::{load_api_key, validate_config, ConfigError};
use crate::config::types::{Config, ParseErrorStrategy};
use crate::config::{load_config, resolve_config_path};
use crate::pipeline::{ImportSummary, Importer, PipelineError};
use crate::upload::client::{AmplitudeClient, ClientError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Everything the `import` command needs besides the process environment.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub file: PathBuf,
    pub config_path: Option<PathBuf>,
    pub api_key_env: Option<String>,
    pub endpoint: Option<String>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub skip_malformed: bool,
}

/// Resolve configuration, then import the file.
///
/// The API key is checked before the input file is touched.
pub async fn run(options: RunOptions) -> Result<ImportSummary, RunError> {
    let config = resolve_config(&options)?;

    let key_var = options
        .api_key_env
        .as_deref()
        .unwrap_or(crate::config::types::DEFAULT_API_KEY_ENV);
    let api_key = load_api_key(key_var)?;

    info!(
        endpoint = %config.endpoint,
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        max_attempts = config.retry.max_attempts,
        "Starting import"
    );

    let client = AmplitudeClient::new(&config.endpoint, api_key, config.request_timeout)?;
    let importer = Importer::new(config, Arc::new(client));

    Ok(importer.run(&options.file).await?)
}

/// Load the config file (if any) and apply command-line overrides.
pub fn resolve_config(options: &RunOptions) -> Result<Config, ConfigError> {
    let mut config = match resolve_config_path(options.config_path.as_deref()) {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            load_config(&path)?
        }
        None => Config::default(),
    };

    if let Some(endpoint) = &options.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(batch_size) = options.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(concurrency) = options.concurrency {
        config.concurrency = concurrency;
    }
    if options.skip_malformed {
        config.on_parse_error = ParseErrorStrategy::Skip;
    }

    validate_config(&config)?;
    Ok(config)
}
