//! The pipeline-constructing front.

use crate::backend::FetchBackend;
use crate::clock::VirtualClock;
use crate::logging::Logger;
use crate::pipeline::{PagedFetch, SingleShotFetch};
use std::sync::Arc;

/// Owns a backend and both clock handles, and constructs pipelines bound
/// to them.
///
/// One service typically lives for one test case, next to one
/// [`DualClockHarness`](crate::DualClockHarness) sharing the same clocks.
pub struct FetchService {
    backend: Arc<dyn FetchBackend>,
    background: VirtualClock,
    foreground: VirtualClock,
    logger: Logger,
}

impl FetchService {
    /// Creates a service over `backend` and the two clocks.
    #[must_use]
    pub fn new(
        backend: Arc<dyn FetchBackend>,
        background: VirtualClock,
        foreground: VirtualClock,
        logger: Logger,
    ) -> Self {
        Self {
            backend,
            background,
            foreground,
            logger,
        }
    }

    /// Creates a paged pipeline for `query`.
    #[must_use]
    pub fn paged(&self, query: &str, limit: usize) -> PagedFetch {
        PagedFetch::new(
            Arc::clone(&self.backend),
            query,
            limit,
            self.background.clone(),
            self.foreground.clone(),
            self.logger.clone(),
        )
    }

    /// Creates a single-shot fetch for the latest `count` results.
    #[must_use]
    pub fn latest(&self, count: usize) -> SingleShotFetch {
        SingleShotFetch::new(
            Arc::clone(&self.backend),
            count,
            self.background.clone(),
            self.foreground.clone(),
            self.logger.clone(),
        )
    }
}

impl std::fmt::Debug for FetchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchService")
            .field("background", &self.background.name())
            .field("foreground", &self.foreground.name())
            .finish_non_exhaustive()
    }
}
