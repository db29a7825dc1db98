//! The single consumer draining the [`RequestQueue`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{FetchError, UpstreamError};
use crate::interfaces::{StatusProbe, UpstreamClient};
use crate::queue::{FetchOutcome, RequestQueue, UpstreamReply};
use crate::rate_limiters::admission_gate::denial_backoff;
use crate::rate_limiters::AdmissionGate;
use crate::types::{Endpoint, FetchTarget};

/// Tuning of the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Upstream calls allowed to run at the same time.
    pub max_in_flight: usize,
    /// Upstream calls per fetch, first attempt included.
    pub max_attempts: u32,
    /// Base wait before retrying a transient failure; grows linearly per attempt.
    pub retry_backoff: Duration,
    pub admission_backoff_min: Duration,
    pub admission_backoff_max: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            max_in_flight: 4,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            admission_backoff_min: Duration::from_millis(25),
            admission_backoff_max: Duration::from_secs(1),
        }
    }
}

/// Pops targets in priority order, admits each through the gate, and runs the
/// upstream call on its own task.
#[derive(Clone)]
pub struct QueueWorker {
    queue: Arc<RequestQueue>,
    gate: AdmissionGate,
    upstream: Arc<dyn UpstreamClient>,
    probe: Arc<dyn StatusProbe>,
    settings: Arc<WorkerSettings>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<RequestQueue>,
        gate: AdmissionGate,
        upstream: Arc<dyn UpstreamClient>,
        probe: Arc<dyn StatusProbe>,
        settings: WorkerSettings,
    ) -> Self {
        QueueWorker {
            queue,
            gate,
            upstream,
            probe,
            settings: Arc::new(settings),
        }
    }

    /// Runs [`run`](Self::run) on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drains the queue until it is closed.
    pub async fn run(self) {
        let in_flight = Arc::new(Semaphore::new(self.settings.max_in_flight.max(1)));
        info!(max_in_flight = self.settings.max_in_flight, "queue worker started");

        loop {
            let permit = match in_flight.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let Some(target) = self.queue.next().await else {
                break;
            };

            match self.gate.try_consume_verbose(1) {
                Ok(()) => {
                    let Some(waited) = self.queue.mark_in_flight(&target) else {
                        // Closed between pop and admission.
                        continue;
                    };
                    debug!(%target, waited_ms = %waited, "fetch admitted");
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.execute(target, permit).await;
                    });
                }
                Err(err) => {
                    let backoff = denial_backoff(
                        &err,
                        self.settings.admission_backoff_min,
                        self.settings.admission_backoff_max,
                    );
                    debug!(%target, ?backoff, reason = %err, "admission denied");
                    self.queue.requeue_front(target);
                    drop(permit);
                    sleep(backoff).await;
                }
            }
        }
        info!("queue worker stopped");
    }

    /// Always completes the entry, even when a collaborator panics.
    async fn execute(&self, target: FetchTarget, _permit: OwnedSemaphorePermit) {
        let outcome = match AssertUnwindSafe(self.call_with_retries(&target)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%target, %message, "upstream collaborator panicked");
                Err(FetchError::Panicked(message))
            }
        };
        if let Err(err) = &outcome {
            warn!(%target, %err, "fetch failed");
        }
        self.queue.complete(&target, outcome);
    }

    async fn call_with_retries(&self, target: &FetchTarget) -> FetchOutcome {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.call(target).await {
                Ok(reply) => return Ok(reply),
                Err(UpstreamError::Permanent(message)) => return Err(FetchError::Permanent(message)),
                Err(UpstreamError::Transient(message)) if attempt >= max_attempts => {
                    return Err(FetchError::Exhausted { attempts: attempt, last: message });
                }
                Err(UpstreamError::Transient(message)) => {
                    warn!(%target, attempt, %message, "transient upstream failure, retrying");
                    sleep(self.settings.retry_backoff * attempt).await;
                    self.admit().await;
                    attempt += 1;
                }
            }
        }
    }

    /// Waits until the gate grants one token.
    async fn admit(&self) {
        while let Err(err) = self.gate.try_consume_verbose(1) {
            sleep(denial_backoff(
                &err,
                self.settings.admission_backoff_min,
                self.settings.admission_backoff_max,
            ))
            .await;
        }
    }

    async fn call(&self, target: &FetchTarget) -> Result<UpstreamReply, UpstreamError> {
        match target.endpoint {
            Endpoint::Player => self
                .upstream
                .fetch(&target.key)
                .await
                .map(|player| UpstreamReply::Player(Arc::new(player))),
            Endpoint::Status => self
                .probe
                .probe(&target.key)
                .await
                .map(|status| UpstreamReply::Status(Arc::new(status))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
