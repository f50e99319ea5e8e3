use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use super::{ConcurrencySnapshot, ProbeOrchestrator};
use crate::resolver::ResolveError;

/// Answers lookups within a fixed time budget.
///
/// Cached terms are answered straight away. Otherwise a fresh probe run is
/// started and raced against the deadline; when the deadline wins the run is
/// left running in the background and whatever is cached by then is returned.
#[derive(Clone)]
pub struct BoundedQueryHandler {
    orchestrator: Arc<ProbeOrchestrator>,
    budget: Duration,
}

impl BoundedQueryHandler {
    pub fn new(orchestrator: Arc<ProbeOrchestrator>, budget: Duration) -> Self {
        BoundedQueryHandler {
            orchestrator,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub async fn lookup(&self, term: &str) -> Result<ConcurrencySnapshot, ResolveError> {
        let deadline = Instant::now() + self.budget;

        let snapshot = self.orchestrator.get_concurrency(term).await?;
        if snapshot.all_present {
            log::info!("Cache hit for '{term}'");
            return Ok(snapshot);
        }
        log::info!("Cache miss for '{term}'");

        // Dropping the handle detaches the task; it is never aborted.
        // Failures are logged in the task since nobody may await it.
        let probing = {
            let orchestrator = Arc::clone(&self.orchestrator);
            let term = term.to_string();
            tokio::spawn(async move {
                let result = orchestrator.query(&term).await;
                if let Err(e) = &result {
                    log::warn!("Probe run for '{term}' failed: {e}");
                }
                result
            })
        };

        match timeout_at(deadline, probing).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => log::warn!("Probe run for '{term}' ended abnormally: {e}"),
            Err(_) => log::info!(
                "Probing '{term}' exceeded {}ms, answering with partial results",
                self.budget.as_millis()
            ),
        }

        self.orchestrator.get_concurrency(term).await
    }
}
