//! Resolvers turn a search term into the set of URLs to probe.
//!
//! Implementations:
//!   - [`StaticResolver`]: term to URL lists taken from the configuration file
//!   - [`SearxResolver`]: asks a SearXNG instance for matching pages
//!   - [`CachedResolver`]: wraps either of them with a TTL cache

use async_trait::async_trait;

pub mod cached;
pub mod searx;
pub mod static_resolver;

pub use cached::CachedResolver;
pub use searx::SearxResolver;
pub use static_resolver::StaticResolver;

/// Errors raised while resolving a search term.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no sites configured for search '{0}'")]
    UnknownTerm(String),

    #[error("search request failed: {0}")]
    Http(String),

    #[error("unable to parse search response: {0}")]
    Parse(String),

    #[error("search '{0}' returned no usable urls")]
    NoResults(String),
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `term` into an ordered, duplicate free list of URLs.
    async fn resolve(&self, term: &str) -> Result<Vec<String>, ResolveError>;
}

/// Key under which a term is looked up or cached.
pub fn normalise_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Drops repeated URLs while keeping first-seen order.
pub fn dedup_urls<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
