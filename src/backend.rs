//! The fetch capability and the canned in-memory backend.
//!
//! A [`FetchBackend`] produces one [`PageResult`] per request. The harness
//! core does not care whether the capability is backed by the bundled
//! [`MockBackend`] generator or a real wire transport; it only requires
//! that the pipeline invokes it on the background clock.
//!
//! Backend invocations are counted through the one-method [`CallCount`]
//! capability, which the harness consumes to compute background deltas.
//! "What counts as background work" is domain-specific, so the counter is
//! always caller-supplied.

use crate::error::FetchError;
use crate::logging::Logger;
use core::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One opaque record inside a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    payload: String,
}

impl Record {
    /// Creates a record with the given payload.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record({})", self.payload)
    }
}

/// An ordered sequence of records. The empty sequence is the sentinel
/// meaning "no more pages".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageResult {
    records: Vec<Record>,
}

impl PageResult {
    /// Creates a page result from records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Creates the "no more pages" sentinel.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if this is the termination sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the records in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl fmt::Display for PageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} records]", self.records.len())
    }
}

/// Produces one page result per request.
///
/// Implementations are invoked by the pipeline during background firing
/// passes only; they never schedule anything themselves.
pub trait FetchBackend: Send + Sync {
    /// Fetches one page of results for `query`.
    fn fetch_page(&self, query: &str, limit: usize, page: u32) -> Result<PageResult, FetchError>;

    /// Fetches the latest `count` results in a single shot.
    fn fetch_latest(&self, count: usize) -> Result<PageResult, FetchError>;
}

/// Reports how many backend invocations have happened so far.
///
/// Blanket-implemented for closures, so a driver can pass
/// `move || backend.call_count()` directly to the harness builder.
pub trait CallCount: Send + Sync {
    /// Returns the invocation count.
    fn count(&self) -> usize;
}

impl<F> CallCount for F
where
    F: Fn() -> usize + Send + Sync,
{
    fn count(&self) -> usize {
        self()
    }
}

/// A canned in-memory generator.
///
/// Pages `1..=non_empty_pages` yield `limit` records; later pages yield
/// the empty sentinel. Requests over the configured maximum fail the way
/// an overloaded real backend would. Every invocation is counted,
/// successful or not, matching a transport-level request counter.
#[derive(Debug)]
pub struct MockBackend {
    non_empty_pages: u32,
    max_results: usize,
    fail_page: Option<u32>,
    fail_all: bool,
    calls: AtomicUsize,
    logger: Logger,
}

impl MockBackend {
    /// The default result-count ceiling.
    pub const MAX_RESULTS: usize = 120;

    /// Creates a backend with three non-empty pages and the default limit.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self {
            non_empty_pages: 3,
            max_results: Self::MAX_RESULTS,
            fail_page: None,
            fail_all: false,
            calls: AtomicUsize::new(0),
            logger,
        }
    }

    /// Sets how many pages yield records before the empty sentinel.
    #[must_use]
    pub fn with_non_empty_pages(mut self, pages: u32) -> Self {
        self.non_empty_pages = pages;
        self
    }

    /// Sets the result-count ceiling.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Makes the given page fail with a backend error.
    #[must_use]
    pub fn failing_page(mut self, page: u32) -> Self {
        self.fail_page = Some(page);
        self
    }

    /// Makes every invocation fail with a backend error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Returns how many invocations have happened.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn generate(&self, count: usize) -> PageResult {
        let records: Vec<Record> = (0..count).map(|i| Record::new(i.to_string())).collect();
        for record in &records {
            self.logger.info(&format!("<-- {record}"));
        }
        PageResult::new(records)
    }

    fn check_limit(&self, count: usize) -> Result<(), FetchError> {
        if count > self.max_results {
            return Err(FetchError::invalid_request(format!(
                "max results: {}",
                self.max_results
            )));
        }
        Ok(())
    }
}

impl FetchBackend for MockBackend {
    fn fetch_page(&self, query: &str, limit: usize, page: u32) -> Result<PageResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.logger
            .debug(&format!("fetch_page query={query} limit={limit} page={page}"));

        if self.fail_all || self.fail_page == Some(page) {
            return Err(FetchError::backend("injected backend failure").with_page(page));
        }
        self.check_limit(limit)?;

        if page <= self.non_empty_pages {
            Ok(self.generate(limit))
        } else {
            Ok(PageResult::empty())
        }
    }

    fn fetch_latest(&self, count: usize) -> Result<PageResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.logger.debug(&format!("fetch_latest count={count}"));

        if self.fail_all {
            return Err(FetchError::backend("injected backend failure"));
        }
        self.check_limit(count)?;
        Ok(self.generate(count))
    }
}
