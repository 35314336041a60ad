//! Server configuration

use std::time::Duration;

use crate::protocol::constants::DEFAULT_SERVER_IDENT;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identification string sent in WELCOME
    pub server_ident: String,

    /// Send WELCOME when a client connects
    pub send_welcome: bool,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_connections: usize,

    /// Answer unreplied calls with a timeout error after this long
    /// (None = wait forever)
    pub call_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_ident: DEFAULT_SERVER_IDENT.to_string(),
            send_welcome: true,
            max_connections: 0, // Unlimited
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl ServerConfig {
    /// Set the server identification string
    pub fn server_ident(mut self, ident: impl Into<String>) -> Self {
        self.server_ident = ident.into();
        self
    }

    /// Do not send WELCOME on connect
    pub fn disable_welcome(mut self) -> Self {
        self.send_welcome = false;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Never time out calls
    pub fn disable_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }
}
