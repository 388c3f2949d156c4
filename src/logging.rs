//! Minimal `stderr` logging, keyed off one numeric environment variable.
//!
//! Grounded on the teacher's `info!("[PARENCHYMA] Constructing a backend
//! using the {} framework", ..)` call in `backend.rs`, which implies a `log`
//! facade without pulling in a full `tracing-subscriber` stack. See
//! SPEC_FULL.md §4.K.

use std::sync::Once;

use log::{LevelFilter, Log, Metadata, Record};

/// The environment variable that controls verbosity.
///
/// `0` (or unset/unparseable) → error, `1` → warn, `2` → info, `3`+ → debug.
pub const LOG_LEVEL_VAR: &str = "TENSORFORGE_LOG";

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[tensorforge] [{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn level_from_env() -> LevelFilter {
    let raw = std::env::var(LOG_LEVEL_VAR).ok();
    match raw.as_deref().and_then(|s| s.trim().parse::<u8>().ok()) {
        Some(0) | None => LevelFilter::Error,
        Some(1) => LevelFilter::Warn,
        Some(2) => LevelFilter::Info,
        Some(_) => LevelFilter::Debug,
    }
}

static INIT: Once = Once::new();

/// Installs the `stderr` logger, reading [`LOG_LEVEL_VAR`] once.
///
/// Safe to call repeatedly (and from multiple threads); only the first call
/// has any effect. Called lazily the first time the default pool (§4.L) is
/// constructed, mirroring the teacher's habit of logging on first backend
/// construction.
pub fn init_logging() {
    INIT.call_once(|| {
        log::set_max_level(level_from_env());
        // `set_logger` only fails if a logger was already installed, which
        // `Once` already prevents.
        let _ = log::set_logger(&StderrLogger);
    });
}
