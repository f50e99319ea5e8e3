use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::prelude::*;

/// Number of probes the refinement phase spreads over the unexplored interval.
const REFINEMENT_STEPS: usize = 10;

/// Searches for the largest number of parallel requests a URL sustains
/// before its latency crosses the throttle threshold.
pub struct ConcurrencyProber {
    transport: Arc<dyn Transport>,
    throttle_multiplier: f64,
    throttle_minimal_margin: Duration,
}

impl ConcurrencyProber {
    /// Create a prober on top of an arbitrary transport.
    ///
    /// # Arguments
    ///     * `throttle_multiplier` - how much slower than the single request baseline a batch may get
    ///     * `throttle_minimal_margin` - the minimal absolute slowdown before a batch counts as throttled,
    ///       so fast endpoints are not rejected over a few milliseconds of jitter
    pub fn new(
        transport: Arc<dyn Transport>,
        throttle_multiplier: f64,
        throttle_minimal_margin: Duration,
    ) -> Self {
        ConcurrencyProber {
            transport,
            throttle_multiplier,
            throttle_minimal_margin,
        }
    }

    /// Create a prober that talks HTTP with the given per-request timeout.
    pub fn http(
        request_timeout: Duration,
        throttle_multiplier: f64,
        throttle_minimal_margin: Duration,
    ) -> Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(request_timeout)?;
        Ok(Self::new(
            Arc::new(transport),
            throttle_multiplier,
            throttle_minimal_margin,
        ))
    }

    /// Batch duration above which the endpoint is considered throttled.
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn throttle_threshold(&self, reference: Duration) -> Duration {
        let scaled = reference.as_secs_f64() * self.throttle_multiplier;
        let scaled = Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX);
        let margin = reference.saturating_add(self.throttle_minimal_margin);
        scaled.max(margin)
    }

    /// Runs the search for `url`, streaming every confirmed level into `sink`.
    ///
    /// Doubles the concurrency until a batch fails or `MAX_CONCURRENCY` is
    /// reached, then walks the gap between the last success and the first
    /// failure in at most `REFINEMENT_STEPS` steps. Returns once the search is
    /// over or nobody listens on `sink` anymore.
    ///
    /// The sink may carry any message a `ProbeResult` converts into, so the
    /// results can share a stream with other traffic.
    pub async fn check<T>(&self, url: &str, sink: &Sender<T>)
    where
        T: From<ProbeResult> + Send,
    {
        let started = Instant::now();
        if self.transport.issue_request(url).await.is_err() {
            emit(sink, ProbeResult::unreachable(url)).await;
            return;
        }
        let reference = started.elapsed();
        let threshold = self.throttle_threshold(reference);

        if !emit(sink, ProbeResult::new(url, 1, reference)).await {
            return;
        }

        let mut last_success = 1;
        let mut overflow = None;
        let mut concurrency = 2;
        while concurrency <= MAX_CONCURRENCY {
            let Some(duration) = self.probe_batch(url, concurrency, threshold).await else {
                overflow = Some(concurrency);
                break;
            };
            if !emit(sink, ProbeResult::new(url, concurrency, duration)).await {
                return;
            }
            last_success = concurrency;
            concurrency *= 2;
        }

        let Some(overflow) = overflow else {
            log::debug!("{url} sustained {MAX_CONCURRENCY} parallel requests");
            return;
        };

        for concurrency in refinement_steps(last_success, overflow) {
            let Some(duration) = self.probe_batch(url, concurrency, threshold).await else {
                break;
            };
            if !emit(sink, ProbeResult::new(url, concurrency, duration)).await {
                return;
            }
        }
    }

    /// Fires `concurrency` simultaneous requests and waits for all of them.
    /// Returns the batch wall time, or `None` if any request failed or the
    /// batch was slower than `threshold`.
    async fn probe_batch(
        &self,
        url: &str,
        concurrency: usize,
        threshold: Duration,
    ) -> Option<Duration> {
        let started = Instant::now();
        let mut batch = JoinSet::new();
        for _ in 0..concurrency {
            let transport = Arc::clone(&self.transport);
            let url = url.to_string();
            batch.spawn(async move { transport.issue_request(&url).await.is_ok() });
        }

        let mut failed = false;
        while let Some(joined) = batch.join_next().await {
            if !matches!(joined, Ok(true)) {
                failed = true;
            }
        }
        let duration = started.elapsed();

        if failed {
            log::debug!("{url} failed at {concurrency} parallel requests");
            return None;
        }
        if duration > threshold {
            log::debug!(
                "{url} throttled at {concurrency} parallel requests: {:.2}ms > {:.2}ms",
                duration.as_secs_f64() * 1000.0,
                threshold.as_secs_f64() * 1000.0
            );
            return None;
        }
        Some(duration)
    }
}

/// Concurrency levels probed between the last success and the overflow,
/// both exclusive.
fn refinement_steps(last_success: usize, overflow: usize) -> impl Iterator<Item = usize> {
    let from = last_success + 1;
    let until = overflow.saturating_sub(1);
    let step = (until.saturating_sub(from) / REFINEMENT_STEPS).max(1);
    (from..=until).step_by(step)
}

async fn emit<T: From<ProbeResult>>(sink: &Sender<T>, result: ProbeResult) -> bool {
    log::debug!(
        "{} -> concurrency {} in {:.2}ms",
        result.url,
        result.concurrency,
        result.duration.as_secs_f64() * 1000.0
    );
    sink.send(result.into()).await.is_ok()
}
