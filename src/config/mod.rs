pub mod app_config;
pub mod probe_config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
}
