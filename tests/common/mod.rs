#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use converge::error::{Error, ErrorKind};
use converge::executor::{InlineExecutor, SharedExecutor};
use converge::report::{set_reporter, ExceptionReporter};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::{Duration, Instant};

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "CONVERGE_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
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

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// An executor that runs tasks on the submitting thread.
#[must_use]
pub fn inline() -> SharedExecutor {
    Arc::new(InlineExecutor)
}

/// Reporter that records every swallowed failure.
#[derive(Debug, Default)]
pub struct CapturingReporter {
    seen: Mutex<Vec<(String, String, ErrorKind)>>,
}

impl CapturingReporter {
    /// Returns true once a failure whose message is `message` was reported
    /// by `operation`.
    pub fn saw(&self, operation: &str, message: &str) -> bool {
        self.seen
            .lock()
            .expect("reporter lock")
            .iter()
            .any(|(op, msg, _)| op == operation && msg == message)
    }

    /// Number of reports carrying `message`.
    pub fn count(&self, message: &str) -> usize {
        self.seen
            .lock()
            .expect("reporter lock")
            .iter()
            .filter(|(_, msg, _)| msg == message)
            .count()
    }

    /// Number of reports of failures of `kind`.
    pub fn count_kind(&self, kind: ErrorKind) -> usize {
        self.seen
            .lock()
            .expect("reporter lock")
            .iter()
            .filter(|(_, _, k)| *k == kind)
            .count()
    }
}

impl ExceptionReporter for CapturingReporter {
    fn report(&self, operation: &str, cause: &Error) {
        self.seen.lock().expect("reporter lock").push((
            operation.to_string(),
            cause.message().unwrap_or_default().to_string(),
            cause.kind(),
        ));
    }
}

/// Installs one capturing reporter for the whole test binary.
///
/// Tests share it, so each test should use failure messages no other test
/// uses.
pub fn capturing_reporter() -> Arc<CapturingReporter> {
    static REPORTER: OnceLock<Arc<CapturingReporter>> = OnceLock::new();
    Arc::clone(REPORTER.get_or_init(|| {
        let reporter = Arc::new(CapturingReporter::default());
        set_reporter(reporter.clone());
        reporter
    }))
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a test section within a phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}
