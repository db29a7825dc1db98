//! Priority request queue with per-key coalescing.
//!
//! Each [`FetchTarget`] moves through `Idle → Queued → InFlight → Idle`. While a
//! target is Queued or InFlight, further submissions for it attach to the same
//! result slot instead of creating a second upstream call. Queued targets are
//! served High band first, FIFO within a band.
//!
//! The queue itself never calls upstream; [`QueueWorker`] drains it through the
//! admission gate.

pub mod worker;

pub use worker::{QueueWorker, WorkerSettings};

use std::collections::{HashMap, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::debug;

use crate::clock::Clock;
use crate::error::FetchError;
use crate::stats::{ProbeStatus, RawPlayer};
use crate::types::{FetchKey, FetchTarget, Priority, Uint};

/// Successful upstream answer, shared by every waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    Player(Arc<RawPlayer>),
    Status(Arc<ProbeStatus>),
}

/// What every waiter of one fetch receives.
pub type FetchOutcome = Result<UpstreamReply, FetchError>;

/// Lifecycle state of a target that is not idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Queued,
    InFlight,
}

struct Entry {
    state: EntryState,
    priority: Priority,
    enqueued_at: Uint,
    sink: watch::Sender<Option<FetchOutcome>>,
}

#[derive(Default)]
struct QueueState {
    high: VecDeque<FetchTarget>,
    normal: VecDeque<FetchTarget>,
    entries: HashMap<FetchTarget, Entry>,
    closed: bool,
}

impl QueueState {
    fn band(&mut self, priority: Priority) -> &mut VecDeque<FetchTarget> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
        }
    }
}

/// Handle on a submitted fetch. Clone-free: each waiter owns its own receiver.
#[derive(Debug)]
pub struct PendingResult {
    rx: watch::Receiver<Option<FetchOutcome>>,
}

impl PendingResult {
    fn resolved(outcome: FetchOutcome) -> Self {
        let (_tx, rx) = watch::channel(Some(outcome));
        PendingResult { rx }
    }

    /// Waits for the shared outcome.
    ///
    /// With a timeout, gives up with [`FetchError::DeadlineExceeded`]; only this
    /// waiter's interest is dropped, the queued or in-flight fetch carries on.
    pub async fn wait(mut self, timeout: Option<Duration>) -> FetchOutcome {
        let waiting = async {
            match self.rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone().unwrap_or(Err(FetchError::QueueClosed)),
                Err(_) => Err(FetchError::QueueClosed),
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, waiting)
                .await
                .unwrap_or(Err(FetchError::DeadlineExceeded)),
            None => waiting.await,
        }
    }
}

/// Shared queue of pending upstream fetches.
pub struct RequestQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    clock: Arc<dyn Clock>,
}

impl RequestQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        RequestQueue {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submits `target`, or joins the fetch already outstanding for it.
    ///
    /// A High submission joining a Queued Normal entry moves that entry to the
    /// back of the High band. In-flight entries are never touched.
    pub fn submit(&self, target: FetchTarget, priority: Priority) -> PendingResult {
        let mut state = self.lock();
        if state.closed {
            return PendingResult::resolved(Err(FetchError::QueueClosed));
        }

        if let Some(entry) = state.entries.get_mut(&target) {
            let rx = entry.sink.subscribe();
            if entry.state == EntryState::Queued && priority > entry.priority {
                entry.priority = priority;
                // The worker may hold it between pop and requeue; then only the
                // recorded priority changes and the requeue lands in the High band.
                if let Some(pos) = state.normal.iter().position(|queued| *queued == target) {
                    state.normal.remove(pos);
                    state.high.push_back(target.clone());
                }
                debug!(%target, "promoted queued fetch to high priority");
            }
            return PendingResult { rx };
        }

        let (sink, rx) = watch::channel(None);
        state.entries.insert(
            target.clone(),
            Entry {
                state: EntryState::Queued,
                priority,
                enqueued_at: self.clock.now(),
                sink,
            },
        );
        state.band(priority).push_back(target);
        drop(state);
        self.ready.notify_one();
        PendingResult { rx }
    }

    /// Submits and waits for a player payload.
    pub async fn fetch_player(
        &self,
        key: &FetchKey,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Arc<RawPlayer>, FetchError> {
        match self.submit(FetchTarget::player(key.clone()), priority).wait(timeout).await? {
            UpstreamReply::Player(player) => Ok(player),
            UpstreamReply::Status(_) => Err(FetchError::UnexpectedReply("status")),
        }
    }

    /// Submits and waits for a live status probe.
    pub async fn probe_status(
        &self,
        key: &FetchKey,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Arc<ProbeStatus>, FetchError> {
        match self.submit(FetchTarget::status(key.clone()), priority).wait(timeout).await? {
            UpstreamReply::Status(status) => Ok(status),
            UpstreamReply::Player(_) => Err(FetchError::UnexpectedReply("player")),
        }
    }

    /// Removes the highest-priority, oldest queued target, if any.
    ///
    /// The entry stays `Queued` (and keeps coalescing) until
    /// [`mark_in_flight`](Self::mark_in_flight) or [`requeue_front`](Self::requeue_front).
    pub fn pop(&self) -> Option<FetchTarget> {
        let mut state = self.lock();
        match state.high.pop_front() {
            Some(target) => Some(target),
            None => state.normal.pop_front(),
        }
    }

    /// Waits for the next queued target. `None` once the queue is closed.
    pub async fn next(&self) -> Option<FetchTarget> {
        loop {
            let mut notified = pin!(self.ready.notified());
            notified.as_mut().enable();
            if let Some(target) = self.pop() {
                return Some(target);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Puts a popped target back at the head of its (current) priority band.
    pub fn requeue_front(&self, target: FetchTarget) {
        let mut state = self.lock();
        let priority = match state.entries.get(&target) {
            Some(entry) if entry.state == EntryState::Queued => entry.priority,
            _ => return,
        };
        state.band(priority).push_front(target);
    }

    /// Marks a popped target as in flight. Returns how long it waited, in ticks.
    pub fn mark_in_flight(&self, target: &FetchTarget) -> Option<Uint> {
        let now = self.clock.now();
        let mut state = self.lock();
        let entry = state.entries.get_mut(target)?;
        entry.state = EntryState::InFlight;
        Some(now.saturating_sub(entry.enqueued_at))
    }

    /// Delivers `outcome` to every waiter of `target` and returns it to idle.
    pub fn complete(&self, target: &FetchTarget, outcome: FetchOutcome) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.remove(target) {
            entry.sink.send_replace(Some(outcome));
        }
    }

    /// Closes the queue.
    ///
    /// Queued entries resolve with [`FetchError::QueueClosed`]; in-flight ones
    /// still complete. Later submissions resolve immediately with the same error.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.high.clear();
        state.normal.clear();
        state.entries.retain(|_, entry| {
            if entry.state == EntryState::Queued {
                entry.sink.send_replace(Some(Err(FetchError::QueueClosed)));
                false
            } else {
                true
            }
        });
        drop(state);
        self.ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of targets that are Queued or InFlight.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` when the target is idle.
    pub fn state_of(&self, target: &FetchTarget) -> Option<EntryState> {
        self.lock().entries.get(target).map(|entry| entry.state)
    }
}
