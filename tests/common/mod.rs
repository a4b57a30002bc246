#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use fetchlab::{
    DualClockHarness, FetchService, Logger, MockBackend, PageResult, TracingSink,
};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::Arc;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "FETCHLAB_PROPTEST_SEED";

/// Initialize test logging once per binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// A harness + service pair wired over one mock backend, the standard rig
/// for end-to-end scenarios.
pub struct TestRig {
    /// The canned backend both pipelines and assertions inspect.
    pub backend: Arc<MockBackend>,
    /// The harness driving both clocks.
    pub harness: DualClockHarness,
    /// The pipeline-constructing front sharing the harness clocks.
    pub service: FetchService,
}

/// Builds the standard rig over the given backend.
#[must_use]
pub fn rig_with_backend(backend: MockBackend) -> TestRig {
    init_test_logging();
    let logger = Logger::with_sink(fetchlab::LogLevel::Verbose, Arc::new(TracingSink));
    let backend = Arc::new(backend);

    let harness = DualClockHarness::builder()
        .backend_calls({
            let backend = backend.clone();
            move || backend.call_count()
        })
        .logger(logger.clone())
        .build()
        .expect("valid harness config");

    let service = FetchService::new(
        backend.clone(),
        harness.background().clone(),
        harness.foreground().clone(),
        logger,
    );

    TestRig {
        backend,
        harness,
        service,
    }
}

/// Builds the standard rig over a default mock backend.
#[must_use]
pub fn rig() -> TestRig {
    rig_with_backend(MockBackend::new(Logger::noop()))
}

/// Asserts a page result holds exactly `len` records.
pub fn assert_page_len(result: &PageResult, len: usize) {
    assert_eq!(
        result.len(),
        len,
        "expected a page of {len} records, got {result}"
    );
}
