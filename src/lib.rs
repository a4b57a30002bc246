//! Fetchlab: deterministic dual-clock test harness for paginated fetch pipelines.
//!
//! # Overview
//!
//! Fetchlab lets a test driver advance two independent virtual clocks — a
//! *background* clock for I/O-bound work and a *foreground* clock for
//! consumer-visible delivery — one step at a time, and assert exactly how
//! many events crossed each boundary. Any error event the driver did not
//! explicitly expect surfaces as a loud, immediately-attributable failure
//! at the trigger boundary instead of being silently swallowed.
//!
//! The protocol the harness is built to validate is an asynchronous
//! paginated-fetch pipeline: a stream of requested page numbers becomes a
//! stream of page results, with consecutive duplicate requests suppressed,
//! backend calls serialized in request order, every produced result cached
//! for late subscribers, and permanent termination on the first empty page.
//!
//! # Core Guarantees
//!
//! - **Determinism**: virtual time advances only when the driver asks;
//!   actions due at the same instant fire in scheduling order
//! - **Decoupled observation**: "work was produced" (background) and "work
//!   was observed" (foreground) are separate, independently-fired clocks
//! - **No silent errors**: a trigger cycle that observes an unexpected
//!   error event fails with the underlying cause attached
//! - **No real concurrency**: every operation completes synchronously or
//!   schedules a future action; nothing blocks, nothing races
//!
//! # Module Structure
//!
//! - [`time`]: logical timestamps for the virtual clocks
//! - [`logging`]: leveled diagnostic narration (sink capability + logger)
//! - [`error`]: error taxonomy (backend errors, harness errors)
//! - [`clock`]: the independently advanceable [`VirtualClock`]
//! - [`subscriber`]: consumer capability, event counting, subscriptions
//! - [`backend`]: the fetch capability and the canned mock backend
//! - [`pipeline`]: the paginated-fetch protocol under test
//! - [`harness`]: the dual-clock trigger/assert cycle

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod clock;
pub mod error;
pub mod harness;
pub mod logging;
pub mod pipeline;
pub mod subscriber;
pub mod time;

pub use backend::{CallCount, FetchBackend, MockBackend, PageResult, Record};
pub use clock::VirtualClock;
pub use error::{ConfigError, FetchError, FetchErrorKind, HarnessError};
pub use harness::{ClockKind, DualClockHarness, HarnessBuilder, HarnessReport, TriggerCycle};
pub use logging::{
    CaptureSink, ConsoleSink, LogLevel, LogRecord, LogSink, Logger, NoopSink, TracingSink,
};
pub use pipeline::{FetchService, PageRequests, PagedFetch, SingleShotFetch};
pub use subscriber::{Consumer, EventCounter, NoopConsumer, Subscription};
pub use time::Time;
