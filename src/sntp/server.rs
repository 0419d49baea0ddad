use crate::core::Config;

/// Transport handle reserved for the listening endpoint
pub const SERVER_HANDLE: usize = 0;

/// Lifecycle of the facade's server session
#[derive(Debug, Clone, PartialEq)]
pub enum ServerState {
    /// `start_server` has not been called
    Unstarted,
    /// The endpoint is open; requests may be served
    Listening(Config),
    /// `stop_server` closed the endpoint
    Stopped,
}

impl ServerState {
    /// Session configuration while listening
    pub fn config(&self) -> Option<&Config> {
        match self {
            ServerState::Listening(config) => Some(config),
            _ => None,
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, ServerState::Listening(_))
    }
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState::Unstarted
    }
}
