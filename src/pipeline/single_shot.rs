//! The uncached single-shot fetch.

use crate::backend::FetchBackend;
use crate::clock::VirtualClock;
use crate::logging::Logger;
use crate::subscriber::Subscription;
use std::sync::Arc;
use std::time::Duration;

/// One backend invocation per subscription: no pagination, no dedup, no
/// cache. Each [`subscribe`](Self::subscribe) schedules a fresh backend
/// call on the background clock and a value-then-completion delivery on
/// the foreground clock.
pub struct SingleShotFetch {
    backend: Arc<dyn FetchBackend>,
    count: usize,
    background: VirtualClock,
    foreground: VirtualClock,
    logger: Logger,
}

impl SingleShotFetch {
    pub(crate) fn new(
        backend: Arc<dyn FetchBackend>,
        count: usize,
        background: VirtualClock,
        foreground: VirtualClock,
        logger: Logger,
    ) -> Self {
        Self {
            backend,
            count,
            background,
            foreground,
            logger,
        }
    }

    /// Schedules the fetch for `subscription`.
    pub fn subscribe(&self, subscription: &Subscription) {
        let backend = Arc::clone(&self.backend);
        let count = self.count;
        let foreground = self.foreground.clone();
        let logger = self.logger.clone();
        let subscriber = subscription.clone();

        self.background.schedule(Duration::ZERO, move || {
            match backend.fetch_latest(count) {
                Ok(result) => {
                    foreground.schedule(Duration::ZERO, move || {
                        subscriber.deliver_value(&result);
                        subscriber.deliver_complete();
                    });
                }
                Err(error) => {
                    let error = Arc::new(error);
                    logger.debug(&format!("latest({count}) failed: {error}"));
                    subscriber.record_error(error.clone());
                    foreground.schedule(Duration::ZERO, move || {
                        subscriber.deliver_error(&error);
                    });
                }
            }
        });
    }
}

impl std::fmt::Debug for SingleShotFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleShotFetch")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
