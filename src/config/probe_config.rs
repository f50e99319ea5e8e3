use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::ConfigError;

/// Part of the response budget kept back for resolving the term and writing
/// the response.
pub const RESPONSE_HEADROOM: Duration = Duration::from_millis(500);

/// Longest accepted `query_cache_ttl_seconds`, one hundred years.
pub const MAX_QUERY_CACHE_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Upper bound of a single search backend request.
pub const MAX_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lower bound of a single search backend request, used when the response
/// budget leaves less than that.
pub const MIN_SEARCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Parameters of the throttle meter service, as read from the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Timeout of every single probe request, in milliseconds.
    pub request_timeout_ms: u64,

    /// A batch counts as throttled once it is this many times slower than a single request...
    pub throttle_multiplier: f64,

    /// ...and at least this many milliseconds slower.
    #[serde(default)]
    pub throttle_minimal_margin_ms: u64,

    /// How long a resolved search term is reused before it is resolved again.
    /// Probe results themselves never expire.
    #[serde(default = "default_query_cache_ttl_seconds")]
    pub query_cache_ttl_seconds: u64,

    /// Overall time budget of a `/sites` request, in milliseconds.
    pub max_response_time_ms: u64,

    /// Where search terms are turned into URLs.
    pub resolver: ResolverConfig,
}

/// Source of the URLs behind a search term.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolverConfig {
    /// A fixed term to URL table.
    Static { sites: HashMap<String, Vec<String>> },

    /// A SearXNG instance queried through its JSON API.
    Searx {
        base_url: String,
        #[serde(default = "default_max_results")]
        max_results: usize,
    },
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_query_cache_ttl_seconds() -> u64 {
    600
}

fn default_max_results() -> usize {
    10
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn throttle_minimal_margin(&self) -> Duration {
        Duration::from_millis(self.throttle_minimal_margin_ms)
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_seconds)
    }

    pub fn max_response_time(&self) -> Duration {
        Duration::from_millis(self.max_response_time_ms)
    }

    /// Time a `/sites` request may spend waiting on probes.
    pub fn response_budget(&self) -> Duration {
        self.max_response_time().saturating_sub(RESPONSE_HEADROOM)
    }

    /// Timeout of a search backend request. Resolution happens before any
    /// probe starts, so it is kept within the response budget.
    pub fn search_timeout(&self) -> Duration {
        self.response_budget().clamp(MIN_SEARCH_TIMEOUT, MAX_SEARCH_TIMEOUT)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid listen_addr '{}'", self.listen_addr)))
    }

    /// Reject values the prober cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.throttle_multiplier.is_finite() || self.throttle_multiplier <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "throttle_multiplier must be a finite number greater than 1.0, got {}",
                self.throttle_multiplier
            )));
        }
        if self.query_cache_ttl_seconds > MAX_QUERY_CACHE_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "query_cache_ttl_seconds must be at most {MAX_QUERY_CACHE_TTL_SECONDS}, got {}",
                self.query_cache_ttl_seconds
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_response_time_ms == 0 {
            return Err(ConfigError::Invalid(
                "max_response_time_ms must be greater than 0".to_string(),
            ));
        }
        self.socket_addr()?;

        if let ResolverConfig::Searx {
            base_url,
            max_results,
        } = &self.resolver
        {
            Url::parse(base_url).map_err(|e| {
                ConfigError::Invalid(format!("invalid searx base_url '{base_url}': {e}"))
            })?;
            if *max_results == 0 {
                return Err(ConfigError::Invalid(
                    "searx max_results must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}
