//! Background save queue.
//!
//! Request handlers write the cache synchronously, then hand the remote push to
//! this queue and return. The channel is bounded: when it is full `enqueue`
//! fails with [`QueueError::Full`] instead of growing without limit. `shutdown`
//! stops intake and waits until the workers have drained every queued job.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{SaveOutcome, SyncEngine};
use crate::cache::types::{Analysis, Consensus, Note, Paper};
use crate::error::QueueError;

/// One unit of background work.
#[derive(Debug, Clone)]
pub enum SyncJob {
    Paper(Paper),
    Analysis(Analysis),
    Note(Note),
    Graph(Value),
    Consensus(Consensus),
}

impl SyncJob {
    pub fn label(&self) -> String {
        match self {
            Self::Paper(p) => format!("paper {}", p.arxiv_id),
            Self::Analysis(a) => format!("analysis {}/{}", a.arxiv_id, a.provider),
            Self::Note(n) => format!("note {}", n.id.map_or_else(|| "?".into(), |id| id.to_string())),
            Self::Graph(_) => "knowledge graph".into(),
            Self::Consensus(c) => format!("consensus {}", c.arxiv_id),
        }
    }

    async fn run(&self, engine: &SyncEngine) -> SaveOutcome {
        match self {
            Self::Paper(p) => engine.save_paper(p).await,
            Self::Analysis(a) => engine.save_analysis(a).await,
            Self::Note(n) => engine.save_note(n).await,
            Self::Graph(g) => engine.save_graph(g).await,
            Self::Consensus(c) => engine.save_consensus(c).await,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub written: u64,
    pub failed: u64,
}

pub struct SyncQueue {
    sender: Mutex<Option<mpsc::Sender<SyncJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl SyncQueue {
    /// Start `workers` tasks on the current runtime, fed by a channel holding at
    /// most `capacity` waiting jobs. Both are clamped to at least one.
    pub fn start(engine: Arc<SyncEngine>, capacity: usize, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<SyncJob>(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let engine = Arc::clone(&engine);
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver only while waiting, not while saving.
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        let label = job.label();
                        let outcome = job.run(&engine).await;
                        if outcome.is_written() {
                            counters.written.fetch_add(1, Ordering::Relaxed);
                        } else {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(worker, job = %label, outcome = ?outcome, "background save failed");
                        }
                    }
                    tracing::debug!(worker, "sync worker stopped");
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            counters,
        }
    }

    /// Hand a job to the workers without waiting.
    pub fn enqueue(&self, job: SyncJob) -> Result<(), QueueError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(tx) = sender.as_ref() else {
            return Err(QueueError::Closed);
        };
        match tx.try_send(job) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                tracing::warn!(job = %job.label(), "sync queue full");
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Stop accepting jobs and wait for the workers to finish the queued ones.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let handles: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sync worker panicked");
            }
        }
        tracing::info!(stats = ?self.stats(), "sync queue drained");
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
