//! msntp: an embeddable SNTP client and server transport
//!
//! This library resolves a peer under a hard deadline, exchanges UDP
//! datagrams through a small table of endpoints with bounded waits, and
//! exposes that as a client/server facade with one signed error code space.
//!
//! The SNTP exchange itself (sampling, validation, clock adjustment) is
//! supplied by the caller as a [`SyncEngine`].
//!
//! ```no_run
//! use msntp::{Config, Result, Sntp, SyncEngine, Transport};
//!
//! struct Engine;
//!
//! impl SyncEngine for Engine {
//!     fn run_client(&mut self, transport: &mut Transport, config: &Config, host: &str) -> Result<f64> {
//!         transport.open(1, Some(host), config.resolve_timeout, config)?;
//!         // ... exchange packets, validate, compute the offset ...
//!         transport.close(1)?;
//!         Ok(0.0)
//!     }
//!
//!     fn serve(&mut self, _: &mut Transport, _: &Config, _: usize) -> Result<bool> {
//!         Ok(false)
//!     }
//!
//!     fn adjust_clock(&mut self, _: f64, _: &Config) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut sntp = Sntp::new(Engine)?;
//! match sntp.get_offset("pool.ntp.org", 123) {
//!     Ok(offset) => println!("offset {}.{:06}s", offset.sec, offset.usec),
//!     Err(_) => eprintln!("{} ({})", sntp.strerror(), sntp.last_error_code()),
//! }
//! # Ok::<(), msntp::Error>(())
//! ```

pub mod core;
pub mod network;
pub mod sntp;
pub mod sync;
pub mod util;

// Re-export commonly used items
pub use crate::core::{describe, Config, Error, LibraryCode, Result, Role, Timeval};
pub use crate::network::{Datagram, Drained, Transport, TransportError};
pub use crate::sntp::{ServerState, Sntp};
pub use crate::sync::SyncEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
