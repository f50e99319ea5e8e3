use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{ResolveError, Resolver, dedup_urls};

const USER_AGENT: &str = "throttlemeter/1.0";

/// Resolves terms through the JSON API of a SearXNG instance.
pub struct SearxResolver {
    client: Client,
    base_url: Url,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxHit>,
}

#[derive(Debug, Deserialize)]
struct SearxHit {
    url: String,
}

impl SearxResolver {
    /// `timeout` bounds every search request, connect and body included.
    pub fn new(
        base_url: Url,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(SearxResolver {
            client,
            base_url,
            max_results,
        })
    }

    fn search_url(&self, term: &str) -> Result<Url, ResolveError> {
        let mut endpoint = self.base_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| ResolveError::Http(format!("invalid searx url {}", self.base_url)))?
            .pop_if_empty()
            .push("search");
        endpoint
            .query_pairs_mut()
            .append_pair("q", term)
            .append_pair("format", "json");
        Ok(endpoint)
    }
}

/// Keeps absolute http(s) links only.
fn is_probeable(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[async_trait]
impl Resolver for SearxResolver {
    async fn resolve(&self, term: &str) -> Result<Vec<String>, ResolveError> {
        let endpoint = self.search_url(term)?;
        log::debug!("Resolving '{term}' via {endpoint}");

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| ResolveError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Http(format!(
                "searx answered {}",
                response.status()
            )));
        }

        let body: SearxResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Parse(e.to_string()))?;

        let mut urls = dedup_urls(
            body.results
                .into_iter()
                .map(|hit| hit.url)
                .filter(|url| is_probeable(url)),
        );
        urls.truncate(self.max_results);

        if urls.is_empty() {
            return Err(ResolveError::NoResults(term.to_string()));
        }
        Ok(urls)
    }
}
