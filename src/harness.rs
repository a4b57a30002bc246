//! The dual-clock trigger/assert cycle.
//!
//! [`DualClockHarness`] owns both virtual clocks, the current
//! [`Subscription`], the caller-supplied backend call counter, and the
//! logger. Its contract is a two-step protocol: "let background work run"
//! then "let foreground delivery run", each returning the delta in the
//! relevant observable counter and failing loudly if an error event
//! appeared that the driver did not expect.
//!
//! Splitting "did the backend run" from "did the consumer see results"
//! lets a test assert ordering precisely — for example that zero
//! foreground events occur before the background clock is fired, even
//! though both clocks are logically ready.

use crate::backend::CallCount;
use crate::clock::VirtualClock;
use crate::error::{ConfigError, FetchError, HarnessError};
use crate::logging::{LogLevel, Logger};
use crate::subscriber::{Consumer, Subscription};
use serde::Serialize;
use std::sync::Arc;

/// Which clock a trigger cycle fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// The clock I/O-bound work runs on.
    Background,
    /// The clock consumer-visible delivery runs on.
    Foreground,
}

impl std::fmt::Display for ClockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Foreground => write!(f, "foreground"),
        }
    }
}

/// The record of one trigger cycle.
///
/// Only deterministic fields are recorded; wall-clock elapsed and the
/// virtual `now` it feeds are narration, not report data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerCycle {
    /// Which clock fired.
    pub clock: ClockKind,
    /// The diagnostic label (may be empty).
    pub label: String,
    /// Delta in the cycle's observable counter.
    pub delta: usize,
    /// Error events recorded before the pass.
    pub errors_before: usize,
    /// Error events recorded after the pass.
    pub errors_after: usize,
}

/// A schema-versioned summary of every trigger cycle a harness ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    /// Report schema version.
    pub schema_version: u32,
    /// Cycles in execution order.
    pub cycles: Vec<TriggerCycle>,
}

impl HarnessReport {
    /// The current report schema version.
    pub const SCHEMA_VERSION: u32 = 1;

    /// Renders the report as a JSON value with a stable shape.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("report serializes")
    }
}

/// Builder for [`DualClockHarness`].
///
/// Every field is optional except the backend call counter, which is
/// domain-specific and has no sensible default; `build` fails fast when
/// it is absent.
#[derive(Default)]
pub struct HarnessBuilder {
    background: Option<VirtualClock>,
    foreground: Option<VirtualClock>,
    backend_calls: Option<Arc<dyn CallCount>>,
    logger: Option<Logger>,
}

impl HarnessBuilder {
    /// Supplies the background clock (default: a fresh one).
    #[must_use]
    pub fn background_clock(mut self, clock: VirtualClock) -> Self {
        self.background = Some(clock);
        self
    }

    /// Supplies the foreground clock (default: a fresh one).
    #[must_use]
    pub fn foreground_clock(mut self, clock: VirtualClock) -> Self {
        self.foreground = Some(clock);
        self
    }

    /// Supplies the backend invocation counter. Required.
    #[must_use]
    pub fn backend_calls(mut self, calls: impl CallCount + 'static) -> Self {
        self.backend_calls = Some(Arc::new(calls));
        self
    }

    /// Supplies the logger (default: console at `Debug`).
    #[must_use]
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Builds the harness, validating required dependencies.
    pub fn build(self) -> Result<DualClockHarness, ConfigError> {
        let backend_calls = self.backend_calls.ok_or(ConfigError::MissingCallCount)?;
        Ok(DualClockHarness {
            background: self
                .background
                .unwrap_or_else(|| VirtualClock::new("background")),
            foreground: self
                .foreground
                .unwrap_or_else(|| VirtualClock::new("foreground")),
            backend_calls,
            logger: self.logger.unwrap_or_else(|| Logger::new(LogLevel::Debug)),
            subscription: None,
            cycles: Vec::new(),
        })
    }
}

impl std::fmt::Debug for HarnessBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessBuilder")
            .field("background", &self.background)
            .field("foreground", &self.foreground)
            .field("has_backend_calls", &self.backend_calls.is_some())
            .finish_non_exhaustive()
    }
}

/// The dual virtual-clock orchestration engine.
pub struct DualClockHarness {
    background: VirtualClock,
    foreground: VirtualClock,
    backend_calls: Arc<dyn CallCount>,
    logger: Logger,
    subscription: Option<Subscription>,
    cycles: Vec<TriggerCycle>,
}

impl DualClockHarness {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Returns the background clock handle.
    #[must_use]
    pub const fn background(&self) -> &VirtualClock {
        &self.background
    }

    /// Returns the foreground clock handle.
    #[must_use]
    pub const fn foreground(&self) -> &VirtualClock {
        &self.foreground
    }

    /// Returns the injected logger.
    #[must_use]
    pub const fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Returns the current subscription.
    ///
    /// # Panics
    ///
    /// Panics if no subscription has been created; that is protocol
    /// misuse, not a recoverable state.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        self.subscription
            .as_ref()
            .expect("protocol misuse: no subscription exists; create one with new_subscription")
    }

    /// Creates a fresh subscription with the default no-op consumer and
    /// makes it current, replacing the counter baseline used by
    /// subsequent foreground assertions.
    pub fn new_subscription(&mut self) -> Subscription {
        self.bind_subscription(Subscription::new(&self.logger))
    }

    /// Creates a fresh subscription forwarding all events to `consumer`
    /// and makes it current.
    pub fn new_subscription_with(&mut self, consumer: impl Consumer + 'static) -> Subscription {
        self.bind_subscription(Subscription::with_consumer(&self.logger, consumer))
    }

    fn bind_subscription(&mut self, subscription: Subscription) -> Subscription {
        self.subscription = Some(subscription.clone());
        subscription
    }

    /// Fires the background clock and returns the delta in backend
    /// invocations, failing if an unexpected error event appeared.
    pub fn trigger_background(&mut self, label: &str) -> Result<usize, HarnessError> {
        let before_calls = self.backend_calls.count();
        let before_errors = self.error_count();

        self.fire(ClockKind::Background, label);

        let after_errors = self.error_count();
        let delta = self.backend_calls.count().saturating_sub(before_calls);
        self.record_cycle(ClockKind::Background, label, delta, before_errors, after_errors);
        self.check_errors(label, before_errors, after_errors)?;
        Ok(delta)
    }

    /// Fires the foreground clock and returns the delta in the current
    /// subscription's delivered values, failing if an unexpected error
    /// event appeared.
    ///
    /// # Panics
    ///
    /// Panics if no subscription exists (protocol misuse).
    pub fn trigger_foreground(&mut self, label: &str) -> Result<usize, HarnessError> {
        let before_emitted = self.subscription().emitted();
        let before_errors = self.error_count();

        self.fire(ClockKind::Foreground, label);

        let after_errors = self.error_count();
        let delta = self.subscription().emitted().saturating_sub(before_emitted);
        self.record_cycle(ClockKind::Foreground, label, delta, before_errors, after_errors);
        self.check_errors(label, before_errors, after_errors)?;
        Ok(delta)
    }

    /// Like [`trigger_background`](Self::trigger_background), but swallows
    /// the harness error and returns the captured cause instead.
    pub fn trigger_background_capturing_error(&mut self, label: &str) -> Option<Arc<FetchError>> {
        self.trigger_background(label)
            .err()
            .map(HarnessError::into_cause)
    }

    /// Like [`trigger_foreground`](Self::trigger_foreground), but swallows
    /// the harness error and returns the captured cause instead.
    pub fn trigger_foreground_capturing_error(&mut self, label: &str) -> Option<Arc<FetchError>> {
        self.trigger_foreground(label)
            .err()
            .map(HarnessError::into_cause)
    }

    /// Returns the report of every trigger cycle so far.
    #[must_use]
    pub fn report(&self) -> HarnessReport {
        HarnessReport {
            schema_version: HarnessReport::SCHEMA_VERSION,
            cycles: self.cycles.clone(),
        }
    }

    /// Error events recorded by the current subscription, or 0 before any
    /// subscription exists (background cycles are legal without one).
    fn error_count(&self) -> usize {
        self.subscription
            .as_ref()
            .map_or(0, |s| s.counter().error_count())
    }

    /// Fires `kind`'s clock and advances it by the wall-clock time the
    /// pass took, so subsequent relative delays stay consistent.
    fn fire(&self, kind: ClockKind, label: &str) {
        let clock = match kind {
            ClockKind::Background => &self.background,
            ClockKind::Foreground => &self.foreground,
        };

        self.logger.debug(&format!("==== {kind} fire ===="));
        if !label.is_empty() {
            self.logger.verbose(&format!("| {label}"));
        }

        let elapsed = clock.fire();
        clock.advance(elapsed);

        self.logger.info(&format!(
            "{kind}: pass took {}ms, virtual now {}",
            elapsed.as_millis(),
            clock.now()
        ));
        self.logger.debug(&format!("==== {kind} done ===="));
    }

    fn record_cycle(
        &mut self,
        clock: ClockKind,
        label: &str,
        delta: usize,
        errors_before: usize,
        errors_after: usize,
    ) {
        self.cycles.push(TriggerCycle {
            clock,
            label: label.to_owned(),
            delta,
            errors_before,
            errors_after,
        });
    }

    fn check_errors(
        &self,
        label: &str,
        before_errors: usize,
        after_errors: usize,
    ) -> Result<(), HarnessError> {
        if after_errors > before_errors {
            let events = self
                .subscription
                .as_ref()
                .map(|s| s.counter().error_events())
                .unwrap_or_default();
            let cause = events
                .get(before_errors)
                .cloned()
                .unwrap_or_else(|| Arc::new(FetchError::backend("unattributed error event")));
            self.logger.error(&format!("unexpected error event: {cause}"));
            return Err(HarnessError::UnexpectedErrorEvent {
                label: label.to_owned(),
                cause,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for DualClockHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualClockHarness")
            .field("background", &self.background)
            .field("foreground", &self.foreground)
            .field("has_subscription", &self.subscription.is_some())
            .field("cycles", &self.cycles.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn harness_with_counter(calls: Arc<AtomicUsize>) -> DualClockHarness {
        DualClockHarness::builder()
            .backend_calls(move || calls.load(Ordering::SeqCst))
            .logger(Logger::noop())
            .build()
            .expect("valid config")
    }

    #[test]
    fn builder_requires_a_call_counter() {
        let result = DualClockHarness::builder().logger(Logger::noop()).build();
        assert_eq!(result.unwrap_err(), ConfigError::MissingCallCount);
    }

    #[test]
    fn builder_defaults_fresh_clocks() {
        let harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        assert_eq!(harness.background().name(), "background");
        assert_eq!(harness.foreground().name(), "foreground");
    }

    #[test]
    fn firing_an_empty_clock_returns_zero_delta() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        assert_eq!(harness.trigger_background("nothing queued").unwrap(), 0);
    }

    #[test]
    fn background_delta_counts_invocations_since_baseline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut harness = harness_with_counter(calls.clone());

        for _ in 0..2 {
            let calls = calls.clone();
            harness.background().schedule(Duration::ZERO, move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(harness.trigger_background("two calls").unwrap(), 2);
        assert_eq!(harness.trigger_background("drained").unwrap(), 0);
    }

    #[test]
    fn foreground_delta_counts_the_current_subscription() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let sub = harness.new_subscription();

        let target = sub.clone();
        harness.foreground().schedule(Duration::ZERO, move || {
            target.deliver_value(&crate::backend::PageResult::new(vec![]));
        });

        assert_eq!(harness.trigger_foreground("one delivery").unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "protocol misuse")]
    fn foreground_trigger_without_subscription_is_protocol_misuse() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let _ = harness.trigger_foreground("no subscription");
    }

    #[test]
    fn new_subscription_resets_the_foreground_baseline() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let first = harness.new_subscription();

        let target = first.clone();
        harness.foreground().schedule(Duration::ZERO, move || {
            target.deliver_value(&crate::backend::PageResult::new(vec![]));
        });
        assert_eq!(harness.trigger_foreground("").unwrap(), 1);

        let second = harness.new_subscription();
        assert_eq!(second.emitted(), 0);
        assert_eq!(harness.trigger_foreground("").unwrap(), 0);
        assert!(harness.subscription().same_subscription(&second));
    }

    #[test]
    fn unexpected_error_event_fails_the_trigger_with_the_cause() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let sub = harness.new_subscription();

        let target = sub.clone();
        harness.background().schedule(Duration::ZERO, move || {
            target.record_error(Arc::new(FetchError::backend("boom").with_page(1)));
        });

        let err = harness.trigger_background("failing pass").unwrap_err();
        let HarnessError::UnexpectedErrorEvent { label, cause } = err;
        assert_eq!(label, "failing pass");
        assert_eq!(cause.page(), Some(1));
    }

    #[test]
    fn capturing_variant_swallows_and_returns_the_cause() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let sub = harness.new_subscription();

        let target = sub.clone();
        harness.background().schedule(Duration::ZERO, move || {
            target.record_error(Arc::new(FetchError::backend("boom")));
        });

        let cause = harness
            .trigger_background_capturing_error("")
            .expect("captured cause");
        assert_eq!(cause.message(), "boom");

        // Nothing new: the next capture returns None.
        assert!(harness.trigger_background_capturing_error("").is_none());
    }

    #[test]
    fn expected_errors_do_not_fail_later_cycles() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let sub = harness.new_subscription();

        let target = sub.clone();
        harness.background().schedule(Duration::ZERO, move || {
            target.record_error(Arc::new(FetchError::backend("boom")));
        });
        assert!(harness.trigger_background_capturing_error("").is_some());

        // The error is now part of the baseline.
        assert_eq!(harness.trigger_background("clean pass").unwrap(), 0);
    }

    #[test]
    fn report_records_cycles_in_order() {
        let mut harness = harness_with_counter(Arc::new(AtomicUsize::new(0)));
        let _ = harness.new_subscription();
        let _ = harness.trigger_background("first");
        let _ = harness.trigger_foreground("second");

        let report = harness.report();
        assert_eq!(report.schema_version, HarnessReport::SCHEMA_VERSION);
        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.cycles[0].clock, ClockKind::Background);
        assert_eq!(report.cycles[0].label, "first");
        assert_eq!(report.cycles[1].clock, ClockKind::Foreground);

        let json = report.to_json();
        assert_eq!(
            json["schema_version"].as_u64(),
            Some(u64::from(HarnessReport::SCHEMA_VERSION))
        );
        assert_eq!(json["cycles"][0]["clock"].as_str(), Some("background"));
        assert_eq!(json["cycles"][1]["delta"].as_u64(), Some(0));
    }
}
