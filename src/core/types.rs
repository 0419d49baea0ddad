use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{Error, Result};

/// Transport role of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends requests to one peer and waits for its replies
    Client,
    /// Binds the configured port and replies to whoever asked last
    Server,
    /// Sends unsolicited replies to the network broadcast address
    Broadcast,
    /// Binds the configured port and receives unsolicited replies
    Listen,
}

impl Role {
    /// Whether the local side binds the configured port
    pub fn binds_port(&self) -> bool {
        matches!(self, Role::Server | Role::Listen)
    }

    /// Whether reads wait for data instead of polling
    pub fn waits_on_read(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether the sender of each received datagram becomes the reply target
    pub fn records_sender(&self) -> bool {
        matches!(self, Role::Server | Role::Listen)
    }
}

/// Configuration for one SNTP operation or server session
///
/// This is passed explicitly into every facade and transport call; nothing
/// is kept in process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Port of the remote server, or the local port in server roles
    pub port: u16,
    /// Active role
    pub role: Role,
    /// Number of request rounds
    pub count: u32,
    /// Total time spread across the rounds
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub delay: Duration,
    /// Wait for a reply in each round
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub waiting: Duration,
    /// Minimum acceptable error bound in seconds
    pub min_error: f64,
    /// Maximum acceptable error bound in seconds
    pub max_error: f64,
    /// Dispersion bound in seconds; zero leaves the choice to the engine
    pub dispersion: f64,
    /// Largest clock adjustment in seconds; `None` is unbounded
    pub max_adjustment: Option<f64>,
    /// Diagnostic verbosity
    pub verbose: u8,
    /// Ceiling on address resolution
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub resolve_timeout: Duration,
}

impl Config {
    /// Defaults applied at the start of every client-style call
    pub fn client(port: u16) -> Self {
        let count = 5;
        let delay = Duration::from_secs(15);
        Config {
            port,
            role: Role::Client,
            count,
            delay,
            waiting: delay / count,
            min_error: 0.1,
            max_error: 5.0,
            dispersion: 0.0,
            max_adjustment: None,
            verbose: 0,
            resolve_timeout: delay,
        }
    }

    /// Defaults for a server session listening on `port`
    pub fn server(port: u16) -> Self {
        Config {
            role: Role::Server,
            ..Config::client(port)
        }
    }

    /// Returns a copy with a different role
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Checks that the values are usable by an engine
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::config("round count must be at least 1"));
        }
        if !(self.min_error > 0.0) {
            return Err(Error::config("minimum error must be positive"));
        }
        if !(self.max_error >= self.min_error) {
            return Err(Error::config("maximum error is below the minimum error"));
        }
        if !(self.dispersion >= 0.0) {
            return Err(Error::config("dispersion cannot be negative"));
        }
        if let Some(ceiling) = self.max_adjustment {
            if !(ceiling > 0.0) {
                return Err(Error::config("adjustment ceiling must be positive"));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::client(super::DEFAULT_PORT)
    }
}

/// Seconds plus microseconds, the library's time representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timeval {
    /// Whole seconds, rounded towards negative infinity
    pub sec: i64,
    /// Microseconds in `0..1_000_000`
    pub usec: i64,
}

impl Timeval {
    /// Splits fractional seconds into whole seconds and microseconds
    pub fn from_secs_f64(value: f64) -> Self {
        let whole = value.floor();
        let mut sec = whole as i64;
        let mut usec = ((value - whole) * 1_000_000.0).round() as i64;
        if usec >= 1_000_000 {
            sec += 1;
            usec -= 1_000_000;
        }
        Timeval { sec, usec }
    }

    /// Fractional seconds
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.usec as f64 / 1_000_000.0
    }

    /// Whether this value lies before zero
    pub fn is_negative(&self) -> bool {
        self.sec < 0
    }

    /// Magnitude as a Duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.as_secs_f64().abs())
    }

    /// Interprets this value as seconds since the Unix epoch
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.sec, (self.usec * 1_000) as u32).single()
    }
}
