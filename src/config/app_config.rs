use std::env;
use std::path::Path;
use std::sync::Arc;

use url::Url;

use super::ConfigError;
use super::probe_config::{Config, ResolverConfig};
use crate::resolver::{CachedResolver, Resolver, SearxResolver, StaticResolver};

pub struct AppConfig {
    pub config: Config,
    pub config_file: String,
}

/// Load the application configuration from a YAML file and environment variables.
/// The file is taken from the `CONFIG_FILE` environment variable (default `config.yml`),
/// `LISTEN_ADDR` overrides the listen address from the file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yml".to_string());
    let listen_override = env::var("LISTEN_ADDR").ok();

    let config = load_config_from(&config_file, listen_override)?;
    log::info!("Loaded configuration from {config_file}");

    Ok(AppConfig {
        config,
        config_file,
    })
}

/// Read, override and validate the configuration stored at `path`.
pub fn load_config_from(
    path: impl AsRef<Path>,
    listen_override: Option<String>,
) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut config: Config = serde_yaml::from_str(&config_str)?;
    if let Some(listen_addr) = listen_override {
        config.listen_addr = listen_addr;
    }
    config.validate()?;
    Ok(config)
}

/// Setup the resolver described by the configuration, wrapped in a cache that
/// keeps resolved terms for `query_cache_ttl`.
pub fn setup_resolver(config: &Config) -> Result<Arc<dyn Resolver>, ConfigError> {
    let inner: Arc<dyn Resolver> = match &config.resolver {
        ResolverConfig::Static { sites } => {
            log::info!("Resolving search terms from {} configured entries", sites.len());
            Arc::new(StaticResolver::new(sites.clone()))
        }
        ResolverConfig::Searx {
            base_url,
            max_results,
        } => {
            let timeout = config.search_timeout();
            log::info!(
                "Resolving search terms through SearXNG at {base_url} ({}ms timeout)",
                timeout.as_millis()
            );
            let base_url = Url::parse(base_url)
                .map_err(|e| ConfigError::Invalid(format!("invalid searx base_url: {e}")))?;
            Arc::new(SearxResolver::new(base_url, *max_results, timeout)?)
        }
    };

    Ok(Arc::new(CachedResolver::new(inner, config.query_cache_ttl())))
}
