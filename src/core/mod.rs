//! Core types and constants shared by the transport and the facade
//!
//! This module contains the error taxonomy, the caller-owned configuration
//! and the library's time representation.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{describe, Error, LibraryCode, Result};
pub use self::types::{
    Config,
    Role,
    Timeval,
};

/// Number of endpoint slots in a transport table
pub const MAX_SOCKETS: usize = 10;

/// Well-known NTP port
pub const DEFAULT_PORT: u16 = 123;

/// Largest datagram accepted by a flush pass
pub const MAX_PACKET_SIZE: usize = 1024;
