use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::sync::oneshot;

use crate::meter::prelude::*;
use crate::resolver::{ResolveError, Resolver};

pub mod bounded;
pub mod cache;

pub use bounded::BoundedQueryHandler;
pub use cache::{CacheCommand, ConcurrencySnapshot, ResultCache};

/// Capacity of the stream shared by all probers and the cache writer.
const RESULT_STREAM_CAPACITY: usize = 1000;

/// Runs one prober per URL of a search term and keeps the latest result of
/// every URL in a shared cache.
///
/// All probers push into one result stream. A single background task drains
/// it, so the cache has exactly one writer no matter how many probes run.
pub struct ProbeOrchestrator {
    prober: Arc<ConcurrencyProber>,
    resolver: Arc<dyn Resolver>,
    cache: Arc<ResultCache>,
    results: Sender<CacheCommand>,
}

impl ProbeOrchestrator {
    /// Create the orchestrator and start its cache writer.
    /// Must be called from within a tokio runtime. The writer stops once the
    /// orchestrator and every prober it started are gone.
    pub fn new(prober: ConcurrencyProber, resolver: Arc<dyn Resolver>) -> Self {
        let cache = Arc::new(ResultCache::new());
        let (results, receiver) = mpsc::channel(RESULT_STREAM_CAPACITY);
        tokio::spawn(cache::run_writer(Arc::clone(&cache), receiver));

        ProbeOrchestrator {
            prober: Arc::new(prober),
            resolver,
            cache,
            results,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Probes every URL `term` resolves to, all in parallel, and returns once
    /// every search has finished and its results are in the cache. Results
    /// land in the cache as they arrive.
    pub async fn query(&self, term: &str) -> Result<(), ResolveError> {
        let urls = self.resolver.resolve(term).await?;
        log::info!("Probing {} sites for '{term}'", urls.len());

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let prober = Arc::clone(&self.prober);
            let results = self.results.clone();
            handles.push(tokio::spawn(async move {
                prober.check(&url, &results).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                log::warn!("Prober task for '{term}' ended abnormally: {e}");
            }
        }
        self.flush().await;

        log::info!("Finished probing sites for '{term}'");
        Ok(())
    }

    /// Waits until the writer stored everything sent before this call.
    async fn flush(&self) {
        let (ack, stored) = oneshot::channel();
        if self.results.send(CacheCommand::Flush(ack)).await.is_err() || stored.await.is_err() {
            log::warn!("Cache writer is gone, results may be incomplete");
        }
    }

    /// Last known concurrency of every URL `term` resolves to, `0` where no
    /// result is cached yet.
    pub async fn get_concurrency(&self, term: &str) -> Result<ConcurrencySnapshot, ResolveError> {
        let urls = self.resolver.resolve(term).await?;
        Ok(self.cache.snapshot(&urls).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::meter::probe::tests::FakeTransport;
    use crate::resolver::StaticResolver;

    pub(crate) const FAST: &str = "https://fast.example";
    pub(crate) const THROTTLED: &str = "https://throttled.example";
    pub(crate) const DOWN: &str = "https://down.example";

    /// Gives every URL its own simulated endpoint so parallel probes of
    /// different sites do not see each other's in-flight requests.
    pub(crate) struct RoutedTransport {
        routes: HashMap<String, Arc<FakeTransport>>,
    }

    impl RoutedTransport {
        pub(crate) fn standard() -> Self {
            let routes = HashMap::from([
                (
                    FAST.to_string(),
                    Arc::new(FakeTransport::new(Duration::from_millis(50))),
                ),
                (
                    THROTTLED.to_string(),
                    Arc::new(
                        FakeTransport::new(Duration::from_millis(100))
                            .throttle_above(9, Duration::from_millis(300)),
                    ),
                ),
                (
                    DOWN.to_string(),
                    Arc::new(FakeTransport::new(Duration::from_millis(10)).fail_above(0)),
                ),
            ]);
            RoutedTransport { routes }
        }

        pub(crate) fn requests(&self, url: &str) -> usize {
            self.routes[url].requests()
        }
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn issue_request(&self, url: &str) -> Result<(), TransportError> {
            self.routes[url].issue_request(url).await
        }
    }

    pub(crate) fn resolver() -> Arc<dyn Resolver> {
        let sites = HashMap::from([
            ("throttled".to_string(), vec![THROTTLED.to_string()]),
            ("down".to_string(), vec![DOWN.to_string()]),
            (
                "all".to_string(),
                vec![THROTTLED.to_string(), FAST.to_string(), DOWN.to_string()],
            ),
            (
                "mixed".to_string(),
                vec![THROTTLED.to_string(), DOWN.to_string()],
            ),
        ]);
        Arc::new(StaticResolver::new(sites))
    }

    pub(crate) fn orchestrator(transport: Arc<RoutedTransport>) -> ProbeOrchestrator {
        let prober = ConcurrencyProber::new(transport, 1.3, Duration::from_millis(200));
        ProbeOrchestrator::new(prober, resolver())
    }

    /// Endpoint that answers almost instantly but fails above three requests
    /// in flight, so every search ends at 3 after a handful of batches.
    pub(crate) fn limited_orchestrator() -> ProbeOrchestrator {
        let transport = Arc::new(FakeTransport::new(Duration::from_micros(50)).fail_above(3));
        let prober = ConcurrencyProber::new(transport, 1.3, Duration::from_millis(200));
        ProbeOrchestrator::new(prober, resolver())
    }

    /// Lets the cache writer drain whatever the probers already sent.
    pub(crate) async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_caches_final_levels_of_every_site() {
        let orchestrator = orchestrator(Arc::new(RoutedTransport::standard()));

        orchestrator.query("all").await.expect("resolved");
        settle().await;

        let snapshot = orchestrator.get_concurrency("all").await.expect("resolved");
        assert!(snapshot.all_present);
        assert_eq!(snapshot.sites[THROTTLED], 9);
        assert_eq!(snapshot.sites[FAST], MAX_CONCURRENCY);
        assert_eq!(snapshot.sites[DOWN], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partially_cached_term_reports_missing_sites() {
        let orchestrator = orchestrator(Arc::new(RoutedTransport::standard()));

        orchestrator.query("throttled").await.expect("resolved");
        settle().await;

        let snapshot = orchestrator.get_concurrency("all").await.expect("resolved");
        assert!(!snapshot.all_present);
        assert_eq!(snapshot.sites.len(), 3);
        assert_eq!(snapshot.sites[THROTTLED], 9);
        assert_eq!(snapshot.sites[FAST], 0);
        assert_eq!(snapshot.sites[DOWN], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_fills_while_query_is_in_flight() {
        let orchestrator = Arc::new(orchestrator(Arc::new(RoutedTransport::standard())));

        let running = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.query("throttled").await })
        };

        // Baseline finished at 100ms, the batch of two is still running.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let snapshot = orchestrator
            .get_concurrency("throttled")
            .await
            .expect("resolved");
        assert!(snapshot.all_present);
        assert_eq!(snapshot.sites[THROTTLED], 1);

        running.await.expect("joined").expect("resolved");
        settle().await;
        let entry = orchestrator.cache().get(THROTTLED).await.expect("cached");
        assert_eq!(entry.concurrency, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_queries_leave_an_emitted_result() {
        let transport = Arc::new(RoutedTransport::standard());
        let orchestrator = orchestrator(transport.clone());

        orchestrator.query("mixed").await.expect("resolved");
        orchestrator.query("mixed").await.expect("resolved");
        settle().await;

        let throttled = orchestrator.cache().get(THROTTLED).await.expect("cached");
        assert_eq!(throttled.url, THROTTLED);
        assert_eq!(throttled.concurrency, 9);
        assert!(throttled.duration < Duration::from_millis(300));

        let down = orchestrator.cache().get(DOWN).await.expect("cached");
        assert_eq!(down, ProbeResult::unreachable(DOWN));
        // One failed baseline per run, never retried.
        assert_eq!(transport.requests(DOWN), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_finished_query_has_stored_every_result() {
        for _ in 0..200 {
            let orchestrator = limited_orchestrator();

            orchestrator.query("throttled").await.expect("resolved");

            let snapshot = orchestrator
                .get_concurrency("throttled")
                .await
                .expect("resolved");
            assert!(snapshot.all_present);
            assert_eq!(snapshot.sites[THROTTLED], 3);
        }
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_query_and_lookup() {
        let transport = Arc::new(RoutedTransport::standard());
        let orchestrator = orchestrator(transport.clone());

        let err = orchestrator.query("golang").await.expect_err("unknown term");
        assert!(matches!(err, ResolveError::UnknownTerm(_)));

        let err = orchestrator
            .get_concurrency("golang")
            .await
            .expect_err("unknown term");
        assert!(matches!(err, ResolveError::UnknownTerm(_)));
        assert_eq!(transport.requests(THROTTLED), 0);
    }
}
