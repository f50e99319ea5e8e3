use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::{ResolveError, Resolver, normalise_term};

/// Maximum number of distinct search terms kept in memory.
const MAX_CACHED_TERMS: u64 = 10_000;

/// Caches successful resolutions for `ttl`, keyed by the normalised term.
///
/// Every `/sites` request resolves its term at least once, so without this
/// a remote resolver would be hit on every lookup. Failures are never cached.
pub struct CachedResolver {
    inner: Arc<dyn Resolver>,
    cache: Cache<String, Vec<String>>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn Resolver>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CACHED_TERMS)
            .time_to_live(ttl)
            .build();
        CachedResolver { inner, cache }
    }
}

#[async_trait]
impl Resolver for CachedResolver {
    async fn resolve(&self, term: &str) -> Result<Vec<String>, ResolveError> {
        let key = normalise_term(term);
        if let Some(urls) = self.cache.get(&key).await {
            return Ok(urls);
        }

        let urls = self.inner.resolve(term).await?;
        self.cache.insert(key, urls.clone()).await;
        Ok(urls)
    }
}
