//! UDP transport and peer resolution
//!
//! This module owns the socket table the time-sync engine drives, and the
//! bounded resolver it uses to find peers.

pub mod blocking;
mod resolver;
mod transport;

pub use self::resolver::{AddressResolver, Resolution, ResolveError};
pub use self::transport::{Datagram, Drained, Transport, TransportError};
