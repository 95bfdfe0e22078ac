//! batch.rs - Bounded concurrent scanning over many texts or chunks.
//!
//! Scanning is stateless per unit of work, so the concurrent variant is the
//! identical pipeline fanned out over a pool: each text (or stream chunk)
//! runs [`Engine::find`] on a blocking worker, bounded by a caller-supplied
//! concurrency limit. The only shared state is the immutable snapshot
//! behind the engine's `Arc`, so no locking discipline is needed.
//! Cancellation is coarse-grained, per unit of work.
//!
//! License: MIT OR APACHE 2.0

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::engine::{Engine, ScanRequest};
use crate::models::FindResult;

/// Default bound on in-flight scans.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Fans the scan pipeline out over a bounded set of blocking workers.
#[derive(Debug, Clone)]
pub struct BatchScanner {
    engine: Arc<Engine>,
    limit: Arc<Semaphore>,
}

impl BatchScanner {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_limit(engine, DEFAULT_MAX_CONCURRENT)
    }

    /// `max_concurrent` bounds the number of scans in flight at once.
    pub fn with_limit(engine: Arc<Engine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Scans every text concurrently, returning results in input order.
    ///
    /// Each unit of work holds a semaphore permit for its whole scan; a
    /// chunked stream is just a batch whose units are chunks.
    pub async fn scan_batch(&self, texts: Vec<String>, request: &ScanRequest) -> Vec<FindResult> {
        let mut set: JoinSet<(usize, FindResult)> = JoinSet::new();
        for (index, text) in texts.into_iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let limit = Arc::clone(&self.limit);
            let request = request.clone();
            set.spawn(async move {
                let _permit = limit.acquire_owned().await.expect("semaphore closed");
                let result =
                    tokio::task::spawn_blocking(move || engine.find(&text, &request))
                        .await
                        .expect("scan task panicked");
                (index, result)
            });
        }

        let mut indexed: Vec<(usize, FindResult)> = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            indexed.push(joined.expect("scan task panicked"));
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Scans one unit of work on a blocking worker, respecting the
    /// concurrency bound shared with `scan_batch`.
    pub async fn scan(&self, text: String, request: &ScanRequest) -> FindResult {
        let engine = Arc::clone(&self.engine);
        let request = request.clone();
        let _permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        tokio::task::spawn_blocking(move || engine.find(&text, &request))
            .await
            .expect("scan task panicked")
    }
}
