//! Error types and error handling strategy.
//!
//! Errors here fall into two very different roles:
//!
//! - [`FetchError`] is **data**: a backend failure travels through the
//!   pipeline as a terminal stream event, is cached alongside normal
//!   results, and is replayed identically to every current and future
//!   subscriber. The pipeline itself never returns an error.
//! - [`HarnessError`] is raised only at the harness boundary: a trigger
//!   cycle that observes more error events than its baseline fails with
//!   [`HarnessError::UnexpectedErrorEvent`], carrying the first new cause.
//!
//! Protocol misuse (for example asserting foreground deliveries with no
//! live subscription) is a programmer error and panics; it is never
//! represented as a recoverable value. Nothing in this crate retries
//! automatically.

use core::fmt;
use std::sync::Arc;

/// Classifies what went wrong inside a fetch backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The backend failed to produce a page.
    Backend,
    /// The request itself was unacceptable (for example, over the
    /// backend's result limit).
    InvalidRequest,
    /// The transport under the backend failed.
    Transport,
}

impl FetchErrorKind {
    /// Returns a short name for the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::InvalidRequest => "invalid request",
            Self::Transport => "transport",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A terminal error produced by a [`FetchBackend`](crate::FetchBackend).
///
/// Shared as `Arc<FetchError>` throughout the harness because a cached
/// terminal error is replayed to every late subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    page: Option<u32>,
}

impl FetchError {
    /// Creates a backend failure.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Backend,
            message: message.into(),
            page: None,
        }
    }

    /// Creates an invalid-request failure.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidRequest,
            message: message.into(),
            page: None,
        }
    }

    /// Creates a transport failure.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            message: message.into(),
            page: None,
        }
    }

    /// Attaches the page number the failure occurred on.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the page the failure occurred on, if known.
    #[must_use]
    pub const fn page(&self) -> Option<u32> {
        self.page
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{} error on page {page}: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FetchError {}

/// An error raised by the harness trigger cycle.
#[derive(Debug, Clone)]
pub enum HarnessError {
    /// A trigger cycle observed more error events than its baseline.
    UnexpectedErrorEvent {
        /// The trigger label (may be empty).
        label: String,
        /// The first error event past the baseline.
        cause: Arc<FetchError>,
    },
}

impl HarnessError {
    /// Returns the underlying cause.
    #[must_use]
    pub fn cause(&self) -> &Arc<FetchError> {
        match self {
            Self::UnexpectedErrorEvent { cause, .. } => cause,
        }
    }

    /// Consumes the error, returning the underlying cause.
    #[must_use]
    pub fn into_cause(self) -> Arc<FetchError> {
        match self {
            Self::UnexpectedErrorEvent { cause, .. } => cause,
        }
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedErrorEvent { label, cause } => {
                if label.is_empty() {
                    write!(f, "unexpected error event: {cause}")
                } else {
                    write!(f, "unexpected error event during '{label}': {cause}")
                }
            }
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnexpectedErrorEvent { cause, .. } => Some(cause.as_ref()),
        }
    }
}

/// A harness construction error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The required backend call counter was not supplied.
    MissingCallCount,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCallCount => {
                write!(f, "harness builder requires a backend call counter")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
