//! Poll handoff queue between charge creation and the PIX monitor
//! worker.
//!
//! Charge creation must not block on the minutes-long settlement poll,
//! but detached tasks with no owner are invisible when they die. The
//! dispatcher hands transaction ids to a bounded queue; a single worker
//! drains it and runs one monitor task per transaction, logging every
//! outcome. Transactions lost to a restart are picked up again by the
//! reconciliation sweep.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::pix::PixService;

/// Sending half of the poll handoff queue.
#[derive(Debug, Clone)]
pub struct PollDispatcher {
    tx: mpsc::Sender<String>,
}

/// Receiving half of the poll handoff queue, owned by the worker.
#[derive(Debug)]
pub struct PollQueue {
    rx: mpsc::Receiver<String>,
}

impl PollQueue {
    /// Receives the next transaction id, or `None` once every
    /// dispatcher handle has been dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl PollDispatcher {
    /// Creates a bounded queue and returns both halves.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, PollQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, PollQueue { rx })
    }

    /// Enqueues a transaction for monitoring. Applies backpressure when
    /// the queue is full; a closed queue is logged and the transaction
    /// left for the sweep.
    pub async fn enqueue(&self, txid: &str) {
        if self.tx.send(txid.to_string()).await.is_err() {
            tracing::error!(txid, "poll queue closed, transaction left for sweep");
        }
    }
}

/// Spawns the worker that drains the poll queue. Each transaction gets
/// its own monitor task so one slow poll does not stall the queue.
pub fn spawn_poll_worker(mut queue: PollQueue, service: Arc<PixService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(txid) = queue.recv().await {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                match service.monitor(&txid).await {
                    Ok(outcome) => {
                        tracing::info!(txid, ?outcome, "pix monitor finished");
                    }
                    Err(error) => {
                        tracing::error!(txid, %error, "pix monitor failed");
                    }
                }
            });
        }
        tracing::info!("poll queue drained, worker stopping");
    })
}
