use std::collections::HashMap;

use async_trait::async_trait;

use super::{ResolveError, Resolver, dedup_urls, normalise_term};

/// Resolves terms from a fixed table, typically the `sites` section of the
/// configuration file.
pub struct StaticResolver {
    sites: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    pub fn new(sites: HashMap<String, Vec<String>>) -> Self {
        let sites = sites
            .into_iter()
            .map(|(term, urls)| (normalise_term(&term), dedup_urls(urls)))
            .collect();
        StaticResolver { sites }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, term: &str) -> Result<Vec<String>, ResolveError> {
        self.sites
            .get(&normalise_term(term))
            .cloned()
            .ok_or_else(|| ResolveError::UnknownTerm(term.to_string()))
    }
}
