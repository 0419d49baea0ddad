//! Bounded address resolution
//!
//! Lookups run on a private current-thread tokio runtime under
//! `tokio::time::timeout`. When the deadline fires, the lookup future is
//! dropped and the in-flight query is abandoned. An [`AddressResolver`] must
//! not be created, used or dropped inside another tokio runtime; tokio
//! panics when a runtime is blocked on or shut down from async context.

use std::cell::Cell;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, trace};
use trust_dns_resolver::config::LookupIpStrategy;
use trust_dns_resolver::error::{ResolveError as DnsError, ResolveErrorKind};
use trust_dns_resolver::system_conf::read_system_conf;
use trust_dns_resolver::TokioAsyncResolver;

use crate::core::LibraryCode;
use crate::util::hex;

/// Errors produced while resolving a peer address
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid IP number {0}")]
    InvalidIpLiteral(String),

    #[error("the address of {0} does not seem to be an Internet one")]
    AddressFamilyMismatch(String),

    #[error("unable to set up address resolution: {0}")]
    InternalSetup(String),

    #[error("unable to set up access to NTP server {host}: no answer within {after:?}")]
    Timeout { host: String, after: Duration },

    #[error("unable to locate IP address of {host}: {reason}")]
    Lookup {
        host: String,
        reason: String,
        os_code: Option<i32>,
    },
}

impl ResolveError {
    fn lookup(host: &str, err: &DnsError) -> Self {
        let os_code = match err.kind() {
            ResolveErrorKind::Io(io) => io.raw_os_error(),
            _ => None,
        };
        ResolveError::Lookup {
            host: host.to_string(),
            reason: err.to_string(),
            os_code,
        }
    }

    /// Position of this error in the signed code space
    pub fn code(&self) -> i32 {
        match self {
            ResolveError::InvalidIpLiteral(_) => LibraryCode::IpAddress.code(),
            ResolveError::AddressFamilyMismatch(_) => LibraryCode::AfInet.code(),
            ResolveError::InternalSetup(_) | ResolveError::Timeout { .. } => {
                LibraryCode::Internal.code()
            }
            ResolveError::Lookup { os_code, .. } => match os_code {
                Some(code) if *code > 0 => *code,
                _ => LibraryCode::Unknown.code(),
            },
        }
    }
}

/// Outcome of a resolution
///
/// The reserved addresses are always the well-known constants, whatever
/// host was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved unicast peer, or the wildcard address when no host was given
    pub peer: Ipv4Addr,
    pub loopback: Ipv4Addr,
    pub wildcard: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    /// Port in host byte order
    pub port: u16,
}

impl Resolution {
    fn new(peer: Ipv4Addr, port: u16) -> Self {
        Resolution {
            peer,
            loopback: Ipv4Addr::LOCALHOST,
            wildcard: Ipv4Addr::UNSPECIFIED,
            broadcast: Ipv4Addr::BROADCAST,
            port,
        }
    }

    /// Port as it appears on the wire
    pub fn port_be(&self) -> u16 {
        self.port.to_be()
    }

    /// Peer address with the configured port
    pub fn peer_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.peer, self.port)
    }

    /// Whether no specific peer was resolved
    pub fn is_wildcard(&self) -> bool {
        self.peer == self.wildcard
    }
}

/// Armed resolution deadline, disarmed when dropped
struct Deadline<'a> {
    armed: &'a Cell<bool>,
    expires: Instant,
}

impl<'a> Deadline<'a> {
    fn arm(armed: &'a Cell<bool>, timeout: Duration) -> Result<Self, ResolveError> {
        let expires = Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| ResolveError::InternalSetup(format!("deadline {:?} out of range", timeout)))?;
        if armed.replace(true) {
            return Err(ResolveError::InternalSetup(
                "a resolution deadline is already armed".to_string(),
            ));
        }
        Ok(Deadline { armed, expires })
    }

    fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        self.armed.set(false);
    }
}

/// Resolves host names and IPv4 literals under a wall-clock ceiling
pub struct AddressResolver {
    /// Runtime driving lookups and their deadlines
    runtime: Runtime,
    /// Name service client, built on first use
    dns: Option<TokioAsyncResolver>,
    /// Set while a deadline is armed
    armed: Cell<bool>,
    /// Look up the canonical name of numeric literals for diagnostics
    canonical_names: bool,
}

impl AddressResolver {
    /// Creates a new resolver
    pub fn new() -> Result<Self, ResolveError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ResolveError::InternalSetup(format!("unable to start resolver runtime: {}", e)))?;

        Ok(AddressResolver {
            runtime,
            dns: None,
            armed: Cell::new(false),
            canonical_names: false,
        })
    }

    /// Enables the diagnostic reverse lookup of numeric literals
    pub fn set_canonical_names(&mut self, enabled: bool) {
        self.canonical_names = enabled;
    }

    /// Whether a deadline is currently armed
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    /// Resolves `hostname`, or the wildcard address when it is `None`.
    ///
    /// A host starting with a decimal digit is parsed as a dotted-decimal
    /// IPv4 literal, which is authoritative; anything else is looked up by
    /// name. The port is never looked up.
    pub fn resolve(
        &mut self,
        hostname: Option<&str>,
        port: u16,
        timeout: Duration,
    ) -> Result<Resolution, ResolveError> {
        let host = match hostname {
            Some(host) => host,
            None => return Ok(Resolution::new(Ipv4Addr::UNSPECIFIED, port)),
        };

        let peer = if host.starts_with(|c: char| c.is_ascii_digit()) {
            let literal: Ipv4Addr = host
                .parse()
                .map_err(|_| ResolveError::InvalidIpLiteral(host.to_string()))?;
            if self.canonical_names {
                self.log_canonical_name(host, literal, timeout);
            }
            literal
        } else {
            self.lookup(host, timeout)?
        };

        let resolution = Resolution::new(peer, port);
        debug!(
            "using NTP server {} ({}) port {} [address={} port={}]",
            host,
            peer,
            port,
            hex(&peer.octets()),
            hex(&resolution.port_be().to_ne_bytes()),
        );
        Ok(resolution)
    }

    /// Forward lookup taking the first IPv4 record
    fn lookup(&mut self, host: &str, timeout: Duration) -> Result<Ipv4Addr, ResolveError> {
        self.ensure_dns()?;
        let lookup = self.guarded(host, timeout, |dns| dns.lookup_ip(host))?;

        lookup
            .iter()
            .find_map(|addr| match addr {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| ResolveError::AddressFamilyMismatch(host.to_string()))
    }

    fn log_canonical_name(&mut self, host: &str, literal: Ipv4Addr, timeout: Duration) {
        let name = self.ensure_dns().and_then(|_| {
            self.guarded(host, timeout, |dns| dns.reverse_lookup(IpAddr::V4(literal)))
        });
        match name {
            Ok(names) => match names.iter().next() {
                Some(name) => info!("{} is {}", literal, name),
                None => debug!("{} has no canonical name", literal),
            },
            Err(e) => debug!("canonical name lookup for {} failed: {}", host, e),
        }
    }

    /// Runs one query with the deadline armed for exactly its duration
    fn guarded<'a, T, F, Fut>(&'a self, host: &str, timeout: Duration, query: F) -> Result<T, ResolveError>
    where
        F: FnOnce(&'a TokioAsyncResolver) -> Fut,
        Fut: Future<Output = Result<T, DnsError>>,
    {
        let dns = self
            .dns
            .as_ref()
            .ok_or_else(|| ResolveError::InternalSetup("name service not initialised".to_string()))?;

        let deadline = Deadline::arm(&self.armed, timeout)?;
        let remaining = deadline.remaining();
        trace!("looking up {} with {:?} left", host, remaining);
        let outcome = self
            .runtime
            .block_on(async move { tokio::time::timeout(remaining, query(dns)).await });
        drop(deadline);

        match outcome {
            Err(_) => {
                debug!("lookup of {} timed out after {:?}", host, timeout);
                Err(ResolveError::Timeout {
                    host: host.to_string(),
                    after: timeout,
                })
            }
            Ok(result) => result.map_err(|e| ResolveError::lookup(host, &e)),
        }
    }

    fn ensure_dns(&mut self) -> Result<(), ResolveError> {
        if self.dns.is_some() {
            return Ok(());
        }

        let (config, mut opts) = read_system_conf().map_err(|e| {
            ResolveError::InternalSetup(format!("unable to read system resolver configuration: {}", e))
        })?;
        opts.ip_strategy = LookupIpStrategy::Ipv4thenIpv6;

        let _context = self.runtime.enter();
        let dns = TokioAsyncResolver::tokio(config, opts)
            .map_err(|e| ResolveError::InternalSetup(e.to_string()))?;
        self.dns = Some(dns);
        Ok(())
    }
}
