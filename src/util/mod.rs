//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::Level;

/// Local wall-clock time plus `offset`, in seconds since the Unix epoch
pub fn current_time(offset: f64) -> f64 {
    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    };
    now + offset
}

/// Lowercase hex rendering of raw bytes, as used in diagnostics
pub fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Installs a stderr subscriber whose level follows `verbosity`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}
