//! The paged pipeline state machine.

use crate::backend::{FetchBackend, PageResult};
use crate::clock::VirtualClock;
use crate::error::FetchError;
use crate::logging::Logger;
use crate::subscriber::Subscription;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Terminal state of a pipeline, cached and replayed to late subscribers.
#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(Arc<FetchError>),
}

struct PagedState {
    /// The most recently requested page, for consecutive-dup suppression.
    last_requested: Option<u32>,
    /// Distinct pages awaiting their serialized backend call.
    pending: VecDeque<u32>,
    /// True while a backend call's result is not yet known.
    in_flight: bool,
    /// Every produced result, in production order.
    cache: Vec<PageResult>,
    terminal: Option<Terminal>,
    subscribers: Vec<Subscription>,
}

struct PagedShared {
    state: Mutex<PagedState>,
    backend: Arc<dyn FetchBackend>,
    background: VirtualClock,
    foreground: VirtualClock,
    logger: Logger,
    query: String,
    limit: usize,
}

impl PagedShared {
    /// Dispatches the next pending page unless a call is in flight or the
    /// stream has terminated. Serialization is by construction: the next
    /// call is only scheduled from here, and this only runs when no call
    /// is outstanding.
    fn maybe_dispatch(shared: &Arc<Self>) {
        let page = {
            let mut state = shared.state.lock().expect("lock poisoned");
            if state.in_flight || state.terminal.is_some() {
                return;
            }
            let Some(page) = state.pending.pop_front() else {
                return;
            };
            state.in_flight = true;
            page
        };

        let this = Arc::clone(shared);
        shared
            .background
            .schedule(Duration::ZERO, move || Self::invoke(&this, page));
    }

    /// Runs one backend call on the background clock and routes the result.
    fn invoke(shared: &Arc<Self>, page: u32) {
        let outcome = shared
            .backend
            .fetch_page(&shared.query, shared.limit, page);

        match outcome {
            Ok(result) if result.is_empty() => {
                shared
                    .logger
                    .debug(&format!("page {page} empty, stream completed"));
                let subscribers = {
                    let mut state = shared.state.lock().expect("lock poisoned");
                    state.in_flight = false;
                    state.terminal = Some(Terminal::Completed);
                    state.pending.clear();
                    state.subscribers.clone()
                };
                for subscriber in subscribers {
                    shared
                        .foreground
                        .schedule(Duration::ZERO, move || subscriber.deliver_complete());
                }
            }
            Ok(result) => {
                let subscribers = {
                    let mut state = shared.state.lock().expect("lock poisoned");
                    state.in_flight = false;
                    state.cache.push(result.clone());
                    state.subscribers.clone()
                };
                for subscriber in subscribers {
                    let result = result.clone();
                    shared
                        .foreground
                        .schedule(Duration::ZERO, move || subscriber.deliver_value(&result));
                }
                // The previous result is known, so the next pending page
                // may go out within this same background pass.
                Self::maybe_dispatch(shared);
            }
            Err(error) => {
                let error = Arc::new(error);
                shared.logger.debug(&format!("page {page} failed: {error}"));
                let subscribers = {
                    let mut state = shared.state.lock().expect("lock poisoned");
                    state.in_flight = false;
                    state.terminal = Some(Terminal::Failed(error.clone()));
                    state.pending.clear();
                    state.subscribers.clone()
                };
                for subscriber in subscribers {
                    // The error event is bookkept now, at production time;
                    // the consumer callback crosses on the foreground clock.
                    subscriber.record_error(error.clone());
                    let error = error.clone();
                    shared
                        .foreground
                        .schedule(Duration::ZERO, move || subscriber.deliver_error(&error));
                }
            }
        }
    }
}

/// The externally-driven page-number stream feeding one [`PagedFetch`].
///
/// The test driver publishes page numbers with [`push`](Self::push);
/// consecutive duplicates are suppressed before they reach the backend.
#[derive(Clone)]
pub struct PageRequests {
    shared: Arc<PagedShared>,
}

impl PageRequests {
    /// Publishes a page-number request.
    ///
    /// Suppressed without any effect when it equals the immediately
    /// preceding request or when the stream has already terminated.
    pub fn push(&self, page: u32) {
        {
            let mut state = self.shared.state.lock().expect("lock poisoned");
            if state.terminal.is_some() {
                self.shared
                    .logger
                    .debug(&format!("page {page} ignored, stream terminated"));
                return;
            }
            if state.last_requested == Some(page) {
                self.shared
                    .logger
                    .debug(&format!("page {page} suppressed, duplicate request"));
                return;
            }
            state.last_requested = Some(page);
            state.pending.push_back(page);
        }
        PagedShared::maybe_dispatch(&self.shared);
    }
}

impl std::fmt::Debug for PageRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRequests").finish_non_exhaustive()
    }
}

/// A paged, deduplicated, cached, terminating fetch pipeline.
///
/// Consumes exactly one [`PageRequests`] stream; backend calls run on the
/// background clock, results cross to subscribers on the foreground clock,
/// and everything produced is replayed to late subscribers.
pub struct PagedFetch {
    shared: Arc<PagedShared>,
}

impl PagedFetch {
    pub(crate) fn new(
        backend: Arc<dyn FetchBackend>,
        query: &str,
        limit: usize,
        background: VirtualClock,
        foreground: VirtualClock,
        logger: Logger,
    ) -> Self {
        Self {
            shared: Arc::new(PagedShared {
                state: Mutex::new(PagedState {
                    last_requested: None,
                    pending: VecDeque::new(),
                    in_flight: false,
                    cache: Vec::new(),
                    terminal: None,
                    subscribers: Vec::new(),
                }),
                backend,
                background,
                foreground,
                logger,
                query: query.to_owned(),
                limit,
            }),
        }
    }

    /// Returns the request stream handle for this pipeline.
    #[must_use]
    pub fn requests(&self) -> PageRequests {
        PageRequests {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Attaches a subscriber.
    ///
    /// Everything already produced — results and any terminal state — is
    /// scheduled for replay on the foreground clock, without new backend
    /// invocations. Subscribing the same subscription twice is a no-op
    /// apart from the replay.
    pub fn subscribe(&self, subscription: &Subscription) {
        let (replay, terminal) = {
            let mut state = self.shared.state.lock().expect("lock poisoned");
            if !state
                .subscribers
                .iter()
                .any(|s| s.same_subscription(subscription))
            {
                state.subscribers.push(subscription.clone());
            }
            (state.cache.clone(), state.terminal.clone())
        };

        for result in replay {
            let subscriber = subscription.clone();
            self.shared
                .foreground
                .schedule(Duration::ZERO, move || subscriber.deliver_value(&result));
        }
        match terminal {
            Some(Terminal::Completed) => {
                let subscriber = subscription.clone();
                self.shared
                    .foreground
                    .schedule(Duration::ZERO, move || subscriber.deliver_complete());
            }
            Some(Terminal::Failed(error)) => {
                let subscriber = subscription.clone();
                self.shared.foreground.schedule(Duration::ZERO, move || {
                    subscriber.record_error(error.clone());
                    subscriber.deliver_error(&error);
                });
            }
            None => {}
        }
    }

    /// Returns how many results have been produced so far.
    #[must_use]
    pub fn cached_results(&self) -> usize {
        self.shared.state.lock().expect("lock poisoned").cache.len()
    }

    /// Returns true once the stream has completed or failed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shared
            .state
            .lock()
            .expect("lock poisoned")
            .terminal
            .is_some()
    }
}

impl std::fmt::Debug for PagedFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().expect("lock poisoned");
        f.debug_struct("PagedFetch")
            .field("query", &self.shared.query)
            .field("limit", &self.shared.limit)
            .field("cached", &state.cache.len())
            .field("pending", &state.pending.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    struct Rig {
        background: VirtualClock,
        foreground: VirtualClock,
        backend: Arc<MockBackend>,
        pipeline: PagedFetch,
    }

    fn rig(backend: MockBackend) -> Rig {
        let background = VirtualClock::new("background");
        let foreground = VirtualClock::new("foreground");
        let backend = Arc::new(backend);
        let pipeline = PagedFetch::new(
            backend.clone(),
            "eggs",
            6,
            background.clone(),
            foreground.clone(),
            Logger::noop(),
        );
        Rig {
            background,
            foreground,
            backend,
            pipeline,
        }
    }

    fn fire_both(rig: &Rig) {
        rig.background.fire();
        rig.foreground.fire();
    }

    #[test]
    fn consecutive_duplicates_never_reach_the_backend() {
        let r = rig(MockBackend::new(Logger::noop()));
        let sub = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&sub);
        let requests = r.pipeline.requests();

        requests.push(1);
        requests.push(1);
        requests.push(2);
        requests.push(2);
        requests.push(2);
        requests.push(3);
        fire_both(&r);

        assert_eq!(r.backend.call_count(), 3);
        assert_eq!(sub.emitted(), 3);
    }

    #[test]
    fn revisiting_an_earlier_page_is_a_new_request() {
        let r = rig(MockBackend::new(Logger::noop()));
        let requests = r.pipeline.requests();

        requests.push(1);
        requests.push(2);
        requests.push(1);
        fire_both(&r);

        assert_eq!(r.backend.call_count(), 3);
    }

    #[test]
    fn pending_pages_are_serialized_within_one_pass() {
        let r = rig(MockBackend::new(Logger::noop()));
        let sub = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&sub);
        let requests = r.pipeline.requests();

        requests.push(1);
        requests.push(2);
        requests.push(3);
        // Nothing has run yet: work sits on the background queue.
        assert_eq!(r.backend.call_count(), 0);

        r.background.fire();
        assert_eq!(r.backend.call_count(), 3);
        // Results have not crossed the foreground boundary yet.
        assert_eq!(sub.emitted(), 0);

        r.foreground.fire();
        assert_eq!(sub.emitted(), 3);
        for value in sub.values() {
            assert_eq!(value.len(), 6);
        }
    }

    #[test]
    fn first_empty_page_terminates_permanently() {
        let r = rig(MockBackend::new(Logger::noop()));
        let sub = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&sub);
        let requests = r.pipeline.requests();

        for page in 1..=3 {
            requests.push(page);
        }
        fire_both(&r);
        sub.assert_not_completed();

        requests.push(4);
        r.background.fire();
        // The empty-page call itself happened.
        assert_eq!(r.backend.call_count(), 4);
        r.foreground.fire();
        assert_eq!(sub.emitted(), 3);
        sub.assert_completed();
        assert!(r.pipeline.is_terminated());

        // Even previously-unseen pages are dead after termination.
        requests.push(5);
        requests.push(6);
        fire_both(&r);
        assert_eq!(r.backend.call_count(), 4);
        assert_eq!(sub.emitted(), 3);
    }

    #[test]
    fn late_subscriber_replays_cache_without_new_invocations() {
        let r = rig(MockBackend::new(Logger::noop()));
        let first = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&first);
        let requests = r.pipeline.requests();

        for page in 1..=3 {
            requests.push(page);
        }
        fire_both(&r);
        assert_eq!(r.backend.call_count(), 3);

        let late = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&late);
        fire_both(&r);

        assert_eq!(r.backend.call_count(), 3);
        assert_eq!(late.emitted(), 3);
        late.assert_not_completed();
    }

    #[test]
    fn late_subscriber_after_completion_replays_the_completion() {
        let r = rig(MockBackend::new(Logger::noop()));
        let first = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&first);
        let requests = r.pipeline.requests();

        for page in 1..=4 {
            requests.push(page);
        }
        fire_both(&r);
        first.assert_completed();

        let late = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&late);
        fire_both(&r);

        assert_eq!(r.backend.call_count(), 4);
        assert_eq!(late.emitted(), 3);
        late.assert_completed();
    }

    #[test]
    fn backend_failure_terminates_and_replays_to_late_subscribers() {
        let r = rig(MockBackend::new(Logger::noop()).failing_page(2));
        let sub = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&sub);
        let requests = r.pipeline.requests();

        requests.push(1);
        requests.push(2);
        requests.push(3);
        r.background.fire();

        // Page 2 failed; page 3 must never be dispatched.
        assert_eq!(r.backend.call_count(), 2);
        // The error event is bookkept at production time.
        assert_eq!(sub.counter().error_count(), 1);

        r.foreground.fire();
        assert_eq!(sub.emitted(), 1);
        assert!(!sub.is_completed());

        let late = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&late);
        fire_both(&r);
        assert_eq!(late.emitted(), 1);
        assert_eq!(late.counter().error_count(), 1);
        assert_eq!(late.counter().error_events()[0].page(), Some(2));
        assert_eq!(r.backend.call_count(), 2);
    }

    #[test]
    fn unsubscribed_listener_misses_deliveries_but_cache_still_fills() {
        let r = rig(MockBackend::new(Logger::noop()));
        let sub = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&sub);
        let requests = r.pipeline.requests();

        requests.push(1);
        sub.unsubscribe();
        fire_both(&r);

        assert_eq!(sub.emitted(), 0);
        assert_eq!(r.backend.call_count(), 1);
        assert_eq!(r.pipeline.cached_results(), 1);
    }

    #[test]
    fn double_subscribe_does_not_double_future_deliveries() {
        let r = rig(MockBackend::new(Logger::noop()));
        let sub = Subscription::new(&Logger::noop());
        r.pipeline.subscribe(&sub);
        r.pipeline.subscribe(&sub);
        let requests = r.pipeline.requests();

        requests.push(1);
        fire_both(&r);
        assert_eq!(sub.emitted(), 1);
    }
}
