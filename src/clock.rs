//! Independently advanceable virtual clocks.
//!
//! A [`VirtualClock`] owns a queue of scheduled actions and a logical
//! `now`. Time moves only when the driver asks:
//!
//! - [`VirtualClock::fire`] executes every currently-due action in
//!   scheduling order and returns the wall-clock duration the pass took
//! - [`VirtualClock::advance`] moves `now` forward without executing
//!   anything beyond what `fire` already ran
//!
//! # Determinism Guarantees
//!
//! - Actions due at the same instant fire in FIFO scheduling order
//!   (tie-broken by a monotonically increasing sequence number)
//! - Actions enqueued *during* a firing pass that are already due execute
//!   within the same pass, modeling synchronous same-tick reactive chains
//! - A panicking action never aborts the rest of the pass; the clock
//!   records the failure and keeps going. The clock itself never panics.

use crate::time::Time;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type Action = Box<dyn FnOnce() + Send>;

/// A queued action. Ordering ignores the action itself: earliest due time
/// first, then lowest sequence number.
struct ScheduledAction {
    due: Time,
    seq: u64,
    action: Action,
}

impl Eq for ScheduledAction {}

impl PartialEq for ScheduledAction {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Ord for ScheduledAction {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap ordering: earliest due first, then FIFO by seq.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct ClockState {
    queue: BinaryHeap<ScheduledAction>,
    now: Time,
    next_seq: u64,
    failed_actions: u64,
    last_failure: Option<String>,
}

/// An independently advanceable logical time source.
///
/// Cloning yields another handle to the same clock, which is how scheduled
/// actions re-enter the clock to enqueue follow-up work.
#[derive(Clone)]
pub struct VirtualClock {
    name: &'static str,
    state: Arc<Mutex<ClockState>>,
}

impl VirtualClock {
    /// Creates a clock at `Time::ZERO` with an empty queue.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(ClockState {
                queue: BinaryHeap::new(),
                now: Time::ZERO,
                next_seq: 0,
                failed_actions: 0,
                last_failure: None,
            })),
        }
    }

    /// Returns the clock's diagnostic name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueues `action` to run at `now + delay`. Always succeeds.
    pub fn schedule(&self, delay: Duration, action: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().expect("lock poisoned");
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(ScheduledAction {
            due,
            seq,
            action: Box::new(action),
        });
    }

    /// Pops the next due action, if any.
    ///
    /// The queue lock is released before the caller runs the action, so
    /// actions may schedule onto this clock without deadlocking.
    fn pop_due(&self) -> Option<Action> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.queue.peek().is_some_and(|a| a.due <= state.now) {
            Some(state.queue.pop().expect("peeked entry present").action)
        } else {
            None
        }
    }

    /// Executes every currently-due action in scheduling order.
    ///
    /// Actions enqueued by an executing action and due at or before the
    /// current instant also run within this pass. Returns the wall-clock
    /// duration of the pass so the driver can [`advance`](Self::advance)
    /// the clock by the time firing took.
    pub fn fire(&self) -> Duration {
        let started = Instant::now();
        while let Some(action) = self.pop_due() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                let mut state = self.state.lock().expect("lock poisoned");
                state.failed_actions += 1;
                state.last_failure = Some(panic_message(payload.as_ref()));
            }
        }
        started.elapsed()
    }

    /// Moves `now` forward by `duration` without executing anything.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.now = state.now + duration;
    }

    /// Returns the current logical time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.state.lock().expect("lock poisoned").now
    }

    /// Returns the number of queued (not yet fired) actions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().expect("lock poisoned").queue.len()
    }

    /// Returns how many actions have panicked during firing passes.
    #[must_use]
    pub fn failed_actions(&self) -> u64 {
        self.state.lock().expect("lock poisoned").failed_actions
    }

    /// Returns the message of the most recent action panic, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<String> {
        self.state.lock().expect("lock poisoned").last_failure.clone()
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("VirtualClock")
            .field("name", &self.name)
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .field("failed_actions", &state.failed_actions)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
