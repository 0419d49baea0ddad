//! Client and server facade
//!
//! [`Sntp`] maps the six public operations onto an explicit [`Config`] and
//! a [`SyncEngine`], and normalises every outcome into the signed code
//! space: `0` on success, a positive `errno`, or a negative
//! [`LibraryCode`](crate::LibraryCode).
//!
//! Client-style calls without an explicit configuration always start from
//! [`Config::client`]; nothing carries over between calls. The server
//! session keeps its configuration from `start_server` until `stop_server`.

mod server;

pub use self::server::{ServerState, SERVER_HANDLE};

use std::net::SocketAddrV4;

use tracing::{debug, info, warn};

use crate::core::{describe, Config, Error, Result, Role, Timeval};
use crate::network::Transport;
use crate::sync::SyncEngine;
use crate::util::current_time;

/// Outcome of the most recent fallible operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: i32,
    pub message: String,
}

impl LastError {
    fn success() -> Self {
        LastError {
            code: 0,
            message: describe(0),
        }
    }
}

/// Embeddable SNTP client and server
pub struct Sntp<E> {
    engine: E,
    transport: Transport,
    server: ServerState,
    last_error: LastError,
}

impl<E: SyncEngine> Sntp<E> {
    /// Creates a facade around `engine` with an empty socket table.
    ///
    /// Like [`Transport::new`], this must not be called from inside a tokio
    /// runtime, and the facade must not be dropped there either.
    pub fn new(engine: E) -> Result<Self> {
        Ok(Sntp {
            engine,
            transport: Transport::new()?,
            server: ServerState::Unstarted,
            last_error: LastError::success(),
        })
    }

    /// Synchronizes the local clock to `hostname`
    pub fn set_clock(&mut self, hostname: &str, port: u16) -> Result<()> {
        self.set_clock_with(&Config::client(port), hostname)
    }

    /// [`Sntp::set_clock`] with an explicit configuration
    pub fn set_clock_with(&mut self, config: &Config, hostname: &str) -> Result<()> {
        let result = self.client_offset(config, hostname).and_then(|(offset, config)| {
            info!("adjusting clock by {:.6}s", offset);
            self.engine.adjust_clock(offset, &config)
        });
        self.record(result)
    }

    /// Difference between the server clock and the local clock; positive
    /// when the server is ahead
    pub fn get_offset(&mut self, hostname: &str, port: u16) -> Result<Timeval> {
        self.get_offset_with(&Config::client(port), hostname)
    }

    /// [`Sntp::get_offset`] with an explicit configuration
    pub fn get_offset_with(&mut self, config: &Config, hostname: &str) -> Result<Timeval> {
        let result = self
            .client_offset(config, hostname)
            .map(|(offset, _)| Timeval::from_secs_f64(offset));
        self.record(result)
    }

    /// Current time according to the server
    pub fn get_time(&mut self, hostname: &str, port: u16) -> Result<Timeval> {
        self.get_time_with(&Config::client(port), hostname)
    }

    /// [`Sntp::get_time`] with an explicit configuration
    pub fn get_time_with(&mut self, config: &Config, hostname: &str) -> Result<Timeval> {
        let result = self
            .client_offset(config, hostname)
            .map(|(offset, _)| Timeval::from_secs_f64(current_time(offset)));
        self.record(result)
    }

    /// Opens the listening endpoint on `port`
    pub fn start_server(&mut self, port: u16) -> Result<()> {
        self.start_server_with(&Config::server(port))
    }

    /// [`Sntp::start_server`] with an explicit configuration
    pub fn start_server_with(&mut self, config: &Config) -> Result<()> {
        let result = self.listen(config);
        self.record(result)
    }

    /// Handles at most one pending request without waiting.
    ///
    /// Returns whether a request was answered.
    pub fn serve(&mut self) -> Result<bool> {
        let result = self.serve_one();
        self.record(result)
    }

    /// Closes the listening endpoint. Does nothing unless listening.
    pub fn stop_server(&mut self) -> Result<()> {
        let result = self.shutdown();
        self.record(result)
    }

    /// Human-readable description of the last outcome; never empty
    pub fn strerror(&self) -> String {
        if self.last_error.code < 0 && !self.last_error.message.is_empty() {
            self.last_error.message.clone()
        } else {
            describe(self.last_error.code)
        }
    }

    /// Code of the last outcome
    pub fn last_error_code(&self) -> i32 {
        self.last_error.code
    }

    pub fn last_error(&self) -> &LastError {
        &self.last_error
    }

    pub fn state(&self) -> &ServerState {
        &self.server
    }

    /// Bound address of the listening endpoint
    pub fn server_addr(&self) -> Option<SocketAddrV4> {
        if !self.server.is_listening() {
            return None;
        }
        self.transport.local_addr(SERVER_HANDLE).ok()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn client_offset(&mut self, config: &Config, hostname: &str) -> Result<(f64, Config)> {
        if hostname.is_empty() {
            return Err(Error::config("hostname must not be empty"));
        }
        let config = config.clone().with_role(Role::Client);
        config.validate()?;

        let offset = self
            .engine
            .run_client(&mut self.transport, &config, hostname)?;
        debug!("offset from {} port {} is {:.6}s", hostname, config.port, offset);
        Ok((offset, config))
    }

    fn listen(&mut self, config: &Config) -> Result<()> {
        let config = if config.role.binds_port() {
            config.clone()
        } else {
            config.clone().with_role(Role::Server)
        };
        config.validate()?;

        self.transport
            .open(SERVER_HANDLE, None, config.resolve_timeout, &config)?;
        info!(
            "SNTP server listening on {}",
            self.transport.local_addr(SERVER_HANDLE)?
        );
        self.server = ServerState::Listening(config);
        Ok(())
    }

    fn serve_one(&mut self) -> Result<bool> {
        let config = match &self.server {
            ServerState::Listening(config) => config,
            _ => return Err(Error::NotListening),
        };

        match self.engine.serve(&mut self.transport, config, SERVER_HANDLE) {
            Err(Error::Transport(e)) if e.is_timeout() => Ok(false),
            other => other,
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.server.is_listening() {
            return Ok(());
        }
        self.server = ServerState::Stopped;
        self.transport.close(SERVER_HANDLE)?;
        info!("SNTP server stopped");
        Ok(())
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        self.last_error = match &result {
            Ok(_) => LastError::success(),
            Err(e) => {
                warn!("{}", e);
                LastError {
                    code: e.code(),
                    message: e.to_string(),
                }
            }
        };
        result
    }
}
