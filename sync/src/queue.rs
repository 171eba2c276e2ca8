//! Background queue supervisor.
//!
//! One claimer task periodically calls `claim_pending` and feeds a bounded
//! channel; N worker tasks drain it and dispatch on item type. Shutdown
//! flips a watch flag: the claimer stops and drops its sender, workers
//! drain what remains, and the handle waits for them under a deadline.

use crate::error::SyncError;
use crate::service::SyncCore;
use sokoni_core::model::SyncQueueItem;
use sokoni_core::repository::{
    AuditStore, CheckpointStore, DocumentStore, SyncMetricsStore, SyncQueueStore, UserStore,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Interval between cleanup sweeps.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Handle to a running supervisor. Dropping it does NOT stop the tasks;
/// call [`SupervisorHandle::shutdown`].
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Stop claiming, drain in-flight items, and wait for the workers.
    /// Tasks still running past the deadline are aborted.
    pub async fn shutdown(self, deadline: Duration) {
        let _ = self.shutdown.send(true);
        let mut tasks = self.tasks;
        let drain = async {
            for task in tasks.iter_mut() {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            tracing::warn!("Sync queue shutdown deadline exceeded; aborting workers");
            for task in &tasks {
                task.abort();
            }
        }
    }
}

/// Owns the claimer, the worker pool, and the cleanup sweeper.
pub struct SyncQueueSupervisor;

impl SyncQueueSupervisor {
    /// Spawn the background tasks and return their handle.
    ///
    /// `node_id` identifies this process in `processing_node` so stuck
    /// claims can be traced to a machine.
    pub fn start<D, Q, C, M, U, A>(
        core: SyncCore<D, Q, C, M, U, A>,
        node_id: impl Into<String>,
    ) -> SupervisorHandle
    where
        D: DocumentStore + Clone + Send + Sync + 'static,
        Q: SyncQueueStore + Clone + Send + Sync + 'static,
        C: CheckpointStore + Clone + Send + Sync + 'static,
        M: SyncMetricsStore + Clone + Send + Sync + 'static,
        U: UserStore + Clone + Send + Sync + 'static,
        A: AuditStore + Clone + Send + Sync + 'static,
    {
        let node_id = node_id.into();
        let config = core.config().clone();
        let batch = config.batch_size.max(1);
        let workers = config.workers.max(1);
        let claim_interval = config
            .claim_interval
            .to_std()
            .unwrap_or(Duration::from_secs(30));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (item_tx, item_rx) = mpsc::channel::<SyncQueueItem>(batch);
        let item_rx = std::sync::Arc::new(Mutex::new(item_rx));

        let mut tasks = Vec::with_capacity(workers + 2);

        // Claimer.
        {
            let core = core.clone();
            let node_id = node_id.clone();
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(claim_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = claim_once(&core, &node_id, batch, &item_tx).await {
                                tracing::warn!(error = %e, "Claim pass failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                // Dropping item_tx here closes the channel; workers drain
                // and exit.
            }));
        }

        // Workers.
        for worker_index in 0..workers {
            let core = core.clone();
            let item_rx = std::sync::Arc::clone(&item_rx);
            tasks.push(tokio::spawn(async move {
                loop {
                    let item = { item_rx.lock().await.recv().await };
                    let Some(item) = item else {
                        break;
                    };
                    tracing::debug!(
                        worker = worker_index,
                        item_id = %item.id,
                        item_type = ?item.item_type,
                        "Processing sync item"
                    );
                    let outcome = core.process_item(&item).await;
                    core.settle(&item, outcome).await;
                }
            }));
        }

        // Cleanup sweeper.
        {
            let core = core.clone();
            let mut shutdown = shutdown_rx;
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // The first tick fires immediately; skip it so startup is
                // not a sweep.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = core.cleanup().await {
                                tracing::warn!(error = %e, "Cleanup sweep failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        SupervisorHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

async fn claim_once<D, Q, C, M, U, A>(
    core: &SyncCore<D, Q, C, M, U, A>,
    node_id: &str,
    batch: usize,
    item_tx: &mpsc::Sender<SyncQueueItem>,
) -> Result<(), SyncError>
where
    D: DocumentStore + Clone,
    Q: SyncQueueStore + Clone,
    C: CheckpointStore + Clone,
    M: SyncMetricsStore + Clone,
    U: UserStore + Clone,
    A: AuditStore + Clone,
{
    let claimed = core.claim(node_id, batch).await?;
    if claimed.is_empty() {
        return Ok(());
    }
    tracing::debug!(count = claimed.len(), node = node_id, "Claimed sync items");
    for item in claimed {
        if item_tx.send(item).await.is_err() {
            // Receivers are gone; shutdown is in progress.
            break;
        }
    }
    Ok(())
}
