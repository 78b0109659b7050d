//! Supervised worker pool for email-verification delivery.
//!
//! Jobs are submitted without waiting and distributed round-robin over
//! per-worker bounded channels. Each worker retries a failing delivery
//! with exponential backoff, then reports the terminal
//! [`NotificationOutcome`] as a `tracing` event and on a broadcast
//! channel that callers can [`subscribe`](NotificationPool::subscribe) to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use credo_core::context::RequestContext;
use credo_core::error::{CredoError, CredoResult};
use credo_core::repository::VerificationSender;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the notification pool.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Pending jobs each worker can buffer before submissions are refused.
    pub queue_capacity: usize,
    /// Delivery attempts per job, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub retry_base_delay: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 256,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// A pending verification email.
#[derive(Debug, Clone)]
pub struct VerificationJob {
    pub ctx: RequestContext,
    pub user_id: Uuid,
    pub email: String,
}

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered {
        user_id: Uuid,
        attempts: u32,
    },
    Failed {
        user_id: Uuid,
        attempts: u32,
        reason: String,
    },
}

pub struct NotificationPool {
    queues: Mutex<Vec<mpsc::Sender<VerificationJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    outcomes: broadcast::Sender<NotificationOutcome>,
}

impl NotificationPool {
    /// Spawn the worker tasks. Must be called from within a Tokio runtime.
    pub fn start<S: VerificationSender>(sender: S, config: NotifyConfig) -> Self {
        let sender = Arc::new(sender);
        let worker_count = config.workers.max(1);
        let (outcomes, _) = broadcast::channel(config.queue_capacity.max(1) * worker_count);

        let mut queues = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            queues.push(tx);
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&sender),
                config.clone(),
                outcomes.clone(),
            )));
        }

        info!(workers = worker_count, "Notification pool started");

        Self {
            queues: Mutex::new(queues),
            workers: Mutex::new(workers),
            next_worker: AtomicUsize::new(0),
            outcomes,
        }
    }

    /// Queue a job without waiting for delivery.
    ///
    /// Fails immediately if the chosen worker's queue is full or the pool
    /// has been shut down.
    pub fn submit(&self, job: VerificationJob) -> CredoResult<()> {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if queues.is_empty() {
            return Err(CredoError::Internal("notification pool is shut down".into()));
        }

        let worker_idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % queues.len();
        queues[worker_idx].try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CredoError::Internal(format!("notification worker {worker_idx} queue is full"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                CredoError::Internal(format!("notification worker {worker_idx} has stopped"))
            }
        })
    }

    /// Receive every outcome published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationOutcome> {
        self.outcomes.subscribe()
    }

    /// Stop accepting jobs and wait for workers to finish the queued ones.
    pub async fn shutdown(&self) {
        let queues = std::mem::take(&mut *self.queues.lock().unwrap_or_else(PoisonError::into_inner));
        drop(queues);

        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        debug!(workers = workers.len(), "Waiting for notification workers to drain");

        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id, error = %e, "Notification worker terminated abnormally");
            }
        }

        info!("Notification pool shut down");
    }
}

async fn worker_loop<S: VerificationSender>(
    worker_id: usize,
    mut rx: mpsc::Receiver<VerificationJob>,
    sender: Arc<S>,
    config: NotifyConfig,
    outcomes: broadcast::Sender<NotificationOutcome>,
) {
    debug!(worker_id, "Notification worker started");

    while let Some(job) = rx.recv().await {
        let outcome = deliver(sender.as_ref(), &job, &config).await;

        match &outcome {
            NotificationOutcome::Delivered { user_id, attempts } => {
                info!(
                    request_id = %job.ctx,
                    user_id = %user_id,
                    attempts,
                    "Verification email sent"
                );
            }
            NotificationOutcome::Failed {
                user_id,
                attempts,
                reason,
            } => {
                error!(
                    request_id = %job.ctx,
                    user_id = %user_id,
                    attempts,
                    reason = %reason,
                    "Failed to send verification email"
                );
            }
        }

        // No subscribers is not an error.
        let _ = outcomes.send(outcome);
    }

    debug!(worker_id, "Notification worker stopped");
}

async fn deliver<S: VerificationSender>(
    sender: &S,
    job: &VerificationJob,
    config: &NotifyConfig,
) -> NotificationOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match sender.send_verification(&job.email).await {
            Ok(()) => {
                return NotificationOutcome::Delivered {
                    user_id: job.user_id,
                    attempts: attempt,
                };
            }
            Err(e) => {
                warn!(
                    request_id = %job.ctx,
                    user_id = %job.user_id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Verification email attempt failed"
                );
                last_error = e.to_string();
                if attempt < max_attempts {
                    let factor = 2_u32.saturating_pow(attempt - 1);
                    tokio::time::sleep(config.retry_base_delay.saturating_mul(factor)).await;
                }
            }
        }
    }

    NotificationOutcome::Failed {
        user_id: job.user_id,
        attempts: max_attempts,
        reason: last_error,
    }
}

/// [`VerificationSender`] that only records the request as a log event.
///
/// Used when no mail transport is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingVerificationSender;

impl VerificationSender for LoggingVerificationSender {
    async fn send_verification(&self, email: &str) -> CredoResult<()> {
        info!(email, "Verification email dispatched (logging transport)");
        Ok(())
    }
}
