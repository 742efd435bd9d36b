use thiserror::Error;
use tokio::time::error::Elapsed;

pub type Result<T> = std::result::Result<T, RconError>;

/// Boxed error returned by external collaborators such as a [ServerQuery](crate::query::ServerQuery).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if the connection info is incomplete (zero port, empty password, bad address).
    #[error("invalid connection info: {0}")]
    InvalidConnectionInfo(&'static str),
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// The reference server could not listen on the requested address.
    #[error("cannot bind to address")]
    BindError(#[source] std::io::Error),
    /// The stream was established, but there was a problem writing to the socket.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// The stream was established, but there was a problem reading from the socket.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    /// The server closed the connection.
    #[error("connection closed by host")]
    ConnectionClosed,
    /// Returned if you can't remember the password.
    #[error("bad password")]
    AuthenticationError,
    /// The size field of a frame is outside of the accepted range.
    #[error("malformed frame: declared size {0}")]
    MalformedFrame(i32),
    /// An outgoing packet is too big to be framed; holds the body length.
    #[error("packet too large: {0} byte body")]
    PacketTooLarge(usize),
    /// Returned if we received a packet that does not have a type known to us.
    #[error("unknown rcon packet type: {0}")]
    UnknownPacketType(i32),
    /// A well-formed packet arrived that makes no sense at this point of the exchange.
    #[error("unexpected packet (id {id}): {reason}")]
    UnexpectedPacket { id: i32, reason: &'static str },
    /// Returned if the body is mangled in some way.
    #[error("packet body malformed (not valid utf-8)")]
    MalformedPacketBody(#[from] std::string::FromUtf8Error),
    /// Returned if the server did not respond in time.
    #[error("timeout")]
    TimeoutError(#[from] Elapsed),
    #[error("not connected")]
    NotConnected,
    /// Another command is still waiting for its response.
    #[error("a command is already in flight")]
    Busy,
    #[error("server query failed")]
    QueryError(#[source] BoxError),
}

/// Coarse category of an [RconError], for callers that only care about
/// what kind of failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Authentication,
    Protocol,
    Timeout,
    NotConnected,
    Busy,
    InvalidInput,
}

impl RconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RconError::InvalidConnectionInfo(_) | RconError::PacketTooLarge(_) => {
                ErrorKind::InvalidInput
            }
            RconError::UnreachableHost(_)
            | RconError::BindError(_)
            | RconError::SendError(_)
            | RconError::ReceiveError(_)
            | RconError::ConnectionClosed
            | RconError::QueryError(_) => ErrorKind::Connection,
            RconError::AuthenticationError => ErrorKind::Authentication,
            RconError::MalformedFrame(_)
            | RconError::UnknownPacketType(_)
            | RconError::UnexpectedPacket { .. }
            | RconError::MalformedPacketBody(_) => ErrorKind::Protocol,
            RconError::TimeoutError(_) => ErrorKind::Timeout,
            RconError::NotConnected => ErrorKind::NotConnected,
            RconError::Busy => ErrorKind::Busy,
        }
    }
}
