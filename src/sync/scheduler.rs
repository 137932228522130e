//! Concurrent source runs.
//!
//! Different sources write disjoint staging tables and only meet on
//! natural-key upserts, so they can run side by side. The scheduler is a
//! small bounded pool of named threads fed through a channel; it runs one
//! batch of sources and shuts down.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use super::{CancellationToken, SyncEngine, SyncReport};
use crate::error::{GraphError, GraphResult};
use crate::record::SourceTag;

struct Job {
    index: usize,
    source: SourceTag,
    reply: Sender<(usize, GraphResult<SyncReport>)>,
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn start(
        workers: usize,
        queue_capacity: usize,
        engine: &Arc<SyncEngine>,
        cancel: &CancellationToken,
    ) -> GraphResult<Self> {
        let workers = workers.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let engine = Arc::clone(engine);
            let cancel = cancel.clone();
            let handle = thread::Builder::new()
                .name(format!("commonplace-sync-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        debug!(source = %job.source, "worker picked up source");
                        let result = engine.run_source(job.source, &cancel);
                        let _ = job.reply.send((job.index, result));
                    }
                })
                .map_err(|e| GraphError::internal(format!("failed to spawn sync worker: {e}")))?;
            handles.push(handle);
        }

        Ok(Self { tx, workers: handles })
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Runs several sources concurrently on one engine.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    max_concurrent: usize,
}

impl SyncScheduler {
    /// A scheduler using the engine's `max_concurrent_sources`.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let max_concurrent = engine.config.max_concurrent_sources;
        Self { engine, max_concurrent }
    }

    /// Runs every source and returns one result per source, in the order
    /// given. A failed source does not stop the others.
    pub fn run(&self, sources: &[SourceTag], cancel: &CancellationToken) -> GraphResult<Vec<GraphResult<SyncReport>>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.max_concurrent.min(sources.len());
        let pool = WorkerPool::start(workers, sources.len(), &self.engine, cancel)?;
        let (reply_tx, reply_rx) = bounded(sources.len());

        for (index, &source) in sources.iter().enumerate() {
            let job = Job {
                index,
                source,
                reply: reply_tx.clone(),
            };
            if pool.tx.send(job).is_err() {
                pool.shutdown();
                return Err(GraphError::internal("sync workers exited early"));
            }
        }
        drop(reply_tx);
        pool.shutdown();

        let mut results: Vec<Option<GraphResult<SyncReport>>> = sources.iter().map(|_| None).collect();
        for (index, result) in reply_rx.iter() {
            results[index] = Some(result);
        }
        sources
            .iter()
            .zip(results)
            .map(|(source, result)| {
                result.ok_or_else(|| GraphError::internal(format!("no result for source {source}")))
            })
            .collect::<GraphResult<Vec<_>>>()
    }

    /// Runs every source the engine has a mapper for.
    pub fn run_all(&self, cancel: &CancellationToken) -> GraphResult<Vec<GraphResult<SyncReport>>> {
        self.run(&self.engine.sources(), cancel)
    }
}
