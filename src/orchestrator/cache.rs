use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::sync::{RwLock, oneshot};

use crate::meter::prelude::*;

/// Latest probe result per URL.
///
/// Entries are overwritten, never merged, and never expire: a lower
/// concurrency arriving after a higher one replaces it.
#[derive(Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, ProbeResult>>,
}

/// Known concurrency for every URL a term resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencySnapshot {
    /// URL to last known concurrency, `0` where nothing is cached yet.
    pub sites: BTreeMap<String, usize>,
    pub all_present: bool,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<ProbeResult> {
        self.entries.read().await.get(url).cloned()
    }

    /// Reads the cached concurrency of every URL under a single read lock.
    pub async fn snapshot(&self, urls: &[String]) -> ConcurrencySnapshot {
        let entries = self.entries.read().await;

        let mut all_present = true;
        let sites = urls
            .iter()
            .map(|url| {
                let concurrency = match entries.get(url) {
                    Some(result) => result.concurrency,
                    None => {
                        all_present = false;
                        0
                    }
                };
                (url.clone(), concurrency)
            })
            .collect();

        ConcurrencySnapshot { sites, all_present }
    }

    async fn store(&self, result: ProbeResult) {
        self.entries.write().await.insert(result.url.clone(), result);
    }
}

/// Message on the stream feeding the cache writer.
#[derive(Debug)]
pub enum CacheCommand {
    Store(ProbeResult),
    /// Acknowledged once everything queued before it has been stored.
    Flush(oneshot::Sender<()>),
}

impl From<ProbeResult> for CacheCommand {
    fn from(result: ProbeResult) -> Self {
        CacheCommand::Store(result)
    }
}

/// Single writer: drains the shared stream into the cache until every
/// sender is gone.
pub(super) async fn run_writer(cache: Arc<ResultCache>, mut commands: Receiver<CacheCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            CacheCommand::Store(result) => cache.store(result).await,
            CacheCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    log::debug!("Result stream closed, cache writer stopped");
}
