use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use crate::error::{RconError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how to reach a server. The rcon port carries the admin
/// console, the query port is only handed to a [ServerQuery](crate::query::ServerQuery).
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: IpAddr,
    pub rcon_port: u16,
    pub query_port: u16,
    pub password: String,
}

impl ConnectionInfo {
    pub fn new(host: IpAddr, rcon_port: u16, query_port: u16, password: impl Into<String>) -> Self {
        ConnectionInfo {
            host,
            rcon_port,
            query_port,
            password: password.into(),
        }
    }

    /// Parse a textual address, failing the same way [validate](Self::validate) does.
    pub fn parse_host(host: &str) -> Result<IpAddr> {
        host.trim()
            .parse()
            .map_err(|_| RconError::InvalidConnectionInfo("host is not a valid ip address"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rcon_port == 0 {
            return Err(RconError::InvalidConnectionInfo("rcon port is not set"));
        }
        if self.query_port == 0 {
            return Err(RconError::InvalidConnectionInfo("query port is not set"));
        }
        if self.password.is_empty() {
            return Err(RconError::InvalidConnectionInfo("password is empty"));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn rcon_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.rcon_port)
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("rcon_port", &self.rcon_port)
            .field("query_port", &self.query_port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How response text line breaks are handed back to the caller. The server
/// only ever sends `\n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Preserve,
    /// Turn every lone `\n` into `\r\n`.
    CrLf,
}

impl LineEnding {
    pub fn apply(self, text: String) -> String {
        match self {
            LineEnding::Preserve => text,
            LineEnding::CrLf => {
                let mut normalized = String::with_capacity(text.len() + text.len() / 16);
                let mut previous = None;
                for c in text.chars() {
                    if c == '\n' && previous != Some('\r') {
                        normalized.push('\r');
                    }
                    normalized.push(c);
                    previous = Some(c);
                }
                normalized
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on opening the socket plus the auth handshake.
    pub connect_timeout: Duration,
    /// Bound on waiting for one command's full response.
    pub command_timeout: Duration,
    pub line_ending: LineEnding,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: DEFAULT_TIMEOUT,
            command_timeout: DEFAULT_TIMEOUT,
            line_ending: LineEnding::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }
}
