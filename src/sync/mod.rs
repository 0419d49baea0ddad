//! Contract with the time-sync engine
//!
//! The engine owns the SNTP exchange itself: how many requests are sent,
//! how responses are validated and combined, how a server reply is built,
//! and how the local clock is adjusted. It drives the [`Transport`]
//! primitives and reads its thresholds from the [`Config`] it is given.
//!
//! Validation failures are reported with the engine-facing errors
//! ([`Error::TooFewResponses`], [`Error::BadResponses`],
//! [`Error::NoGoodResponse`], [`Error::NtpInconsistency`],
//! [`Error::NtpInsanity`]), which the facade passes through unchanged.
//!
//! [`Error::TooFewResponses`]: crate::Error::TooFewResponses
//! [`Error::BadResponses`]: crate::Error::BadResponses
//! [`Error::NoGoodResponse`]: crate::Error::NoGoodResponse
//! [`Error::NtpInconsistency`]: crate::Error::NtpInconsistency
//! [`Error::NtpInsanity`]: crate::Error::NtpInsanity

use crate::core::{Config, Result};
use crate::network::Transport;

/// An SNTP engine driven by the facade
pub trait SyncEngine {
    /// Samples `hostname` and returns its clock offset in seconds.
    ///
    /// Positive means the server is ahead of the local clock. The engine
    /// opens, uses and closes its own transport handles.
    fn run_client(&mut self, transport: &mut Transport, config: &Config, hostname: &str) -> Result<f64>;

    /// Handles at most one pending request on the listening `handle`.
    ///
    /// Returns whether a request was answered.
    fn serve(&mut self, transport: &mut Transport, config: &Config, handle: usize) -> Result<bool>;

    /// Slews or steps the local clock by `offset` seconds, bounded by
    /// `config.max_adjustment`.
    fn adjust_clock(&mut self, offset: f64, config: &Config) -> Result<()>;
}
