//! The paginated-fetch protocol under test.
//!
//! The protocol is implemented as one small explicit state machine rather
//! than a composition of general-purpose stream operators: only four
//! behaviors are required — consecutive-duplicate suppression, serialized
//! per-page backend calls, an append-only replay cache, and permanent
//! termination on the first empty page — and they interact subtly (the
//! cache must replay the termination, not just raw values).
//!
//! - [`PagedFetch`]: the paged pipeline; consumes one [`PageRequests`]
//!   stream, produces one cached result stream
//! - [`SingleShotFetch`]: the uncached one-invocation variant
//! - [`FetchService`]: thin front that owns the backend and both clock
//!   handles and constructs pipelines

mod paged;
mod service;
mod single_shot;

pub use paged::{PageRequests, PagedFetch};
pub use service::FetchService;
pub use single_shot::SingleShotFetch;
