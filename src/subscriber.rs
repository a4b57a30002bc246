//! Consumers, event counting, and subscriptions.
//!
//! A [`Subscription`] binds a consumer (caller-supplied or the default
//! no-op) to a pipeline output and owns exactly one [`EventCounter`]. The
//! harness reads the counter in its trigger cycles; the pipeline drives
//! the delivery path. Counts only ever go up.

use crate::backend::PageResult;
use crate::error::FetchError;
use crate::logging::Logger;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A caller-supplied event sink attached to a subscription.
///
/// The default is [`NoopConsumer`]; the subscription's own counter records
/// events either way.
pub trait Consumer: Send + Sync {
    /// Called for each delivered page result.
    fn on_value(&self, result: &PageResult);
    /// Called once when the stream completes.
    fn on_complete(&self);
    /// Called once when the stream terminates with an error.
    fn on_error(&self, error: &FetchError);
}

/// Blanket impl so an `Arc`-shared consumer forwards to its inner value,
/// letting a driver keep one handle for assertions and attach a clone.
impl<C: Consumer + ?Sized> Consumer for Arc<C> {
    fn on_value(&self, result: &PageResult) {
        (**self).on_value(result);
    }
    fn on_complete(&self) {
        (**self).on_complete();
    }
    fn on_error(&self, error: &FetchError) {
        (**self).on_error(error);
    }
}

/// Swallows every event.
#[derive(Debug, Default)]
pub struct NoopConsumer;

impl Consumer for NoopConsumer {
    fn on_value(&self, _result: &PageResult) {}
    fn on_complete(&self) {}
    fn on_error(&self, _error: &FetchError) {}
}

/// Monotonically increasing event bookkeeping for one subscription.
#[derive(Debug, Default)]
pub struct EventCounter {
    emitted: AtomicUsize,
    errors: Mutex<Vec<Arc<FetchError>>>,
}

impl EventCounter {
    fn new() -> Self {
        Self::default()
    }

    /// Returns how many values have been delivered.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    /// Returns how many error events have been recorded.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.lock().expect("lock poisoned").len()
    }

    /// Returns a snapshot of the recorded error events, in order.
    #[must_use]
    pub fn error_events(&self) -> Vec<Arc<FetchError>> {
        self.errors.lock().expect("lock poisoned").clone()
    }

    fn record_value(&self) {
        self.emitted.fetch_add(1, Ordering::SeqCst);
    }

    fn record_error(&self, error: Arc<FetchError>) {
        self.errors.lock().expect("lock poisoned").push(error);
    }
}

struct SubscriptionInner {
    counter: EventCounter,
    values: Mutex<Vec<PageResult>>,
    completed: AtomicBool,
    active: AtomicBool,
    consumer: Box<dyn Consumer>,
    logger: Logger,
}

/// A handle binding a consumer to a pipeline output.
///
/// Cloning yields another handle to the same subscription; the pipeline
/// keeps one clone per subscriber for delivery, the harness keeps the
/// "current" one for foreground assertions.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Creates a subscription with the default no-op consumer.
    #[must_use]
    pub fn new(logger: &Logger) -> Self {
        Self::with_consumer(logger, NoopConsumer)
    }

    /// Creates a subscription forwarding all events to `consumer`.
    #[must_use]
    pub fn with_consumer(logger: &Logger, consumer: impl Consumer + 'static) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                counter: EventCounter::new(),
                values: Mutex::new(Vec::new()),
                completed: AtomicBool::new(false),
                active: AtomicBool::new(true),
                consumer: Box::new(consumer),
                logger: logger.clone(),
            }),
        }
    }

    /// Returns the subscription's event counter.
    #[must_use]
    pub fn counter(&self) -> &EventCounter {
        &self.inner.counter
    }

    /// Returns how many values have been delivered.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.inner.counter.emitted()
    }

    /// Returns a snapshot of all delivered values, in delivery order.
    #[must_use]
    pub fn values(&self) -> Vec<PageResult> {
        self.inner.values.lock().expect("lock poisoned").clone()
    }

    /// Returns true if the completion signal has been delivered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Returns true if the subscription still counts and forwards events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Stops counting and forwarding.
    ///
    /// Backend work already scheduled on the background clock still runs
    /// and still populates the pipeline cache; it simply has no listener.
    pub fn unsubscribe(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    /// Panics unless the completion signal has been delivered.
    pub fn assert_completed(&self) {
        assert!(
            self.is_completed(),
            "subscription expected to be completed, but no completion was delivered"
        );
    }

    /// Panics if the completion signal has been delivered.
    pub fn assert_not_completed(&self) {
        assert!(
            !self.is_completed(),
            "subscription expected not to be completed, but completion was delivered"
        );
    }

    /// Two handles to the same subscription compare equal.
    #[must_use]
    pub fn same_subscription(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Delivers a value: narrates, counts, records, forwards.
    pub fn deliver_value(&self, result: &PageResult) {
        if !self.is_active() {
            return;
        }
        self.inner.logger.info(&format!("--> value: {result}"));
        self.inner.counter.record_value();
        self.inner
            .values
            .lock()
            .expect("lock poisoned")
            .push(result.clone());
        self.inner.consumer.on_value(result);
    }

    /// Delivers the completion signal.
    pub fn deliver_complete(&self) {
        if !self.is_active() {
            return;
        }
        self.inner.logger.info("--> completed");
        self.inner.completed.store(true, Ordering::SeqCst);
        self.inner.consumer.on_complete();
    }

    /// Records an error event in the counter without invoking the consumer.
    ///
    /// Error bookkeeping happens the moment the error is produced so the
    /// harness baseline check sees it; the consumer callback is delivered
    /// separately on the foreground clock.
    pub(crate) fn record_error(&self, error: Arc<FetchError>) {
        if !self.is_active() {
            return;
        }
        self.inner.counter.record_error(error);
    }

    /// Delivers the error callback to the consumer.
    pub(crate) fn deliver_error(&self, error: &Arc<FetchError>) {
        if !self.is_active() {
            return;
        }
        self.inner.logger.info(&format!("--> error: {error}"));
        self.inner.consumer.on_error(error);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("emitted", &self.emitted())
            .field("errors", &self.counter().error_count())
            .field("completed", &self.is_completed())
            .field("active", &self.is_active())
            .finish()
    }
}
