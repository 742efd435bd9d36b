use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::watch,
    time::{self, Instant},
};

use crate::{
    config::ConnectionInfo,
    error::{RconError, Result},
    packet::{Direction, Packet, PacketType, AUTH_REQUEST_ID},
};

const READ_CHUNK: usize = 4096;

/// Lifecycle of a single rcon connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Faulted,
}

/// Framed access to a byte stream. Keeps whatever part of the next frame has
/// already arrived.
pub(crate) struct Transport<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Transport<S> {
    fn new(stream: S) -> Self {
        Transport {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Write all packets back to back in a single write so nothing else can
    /// end up between them on the wire.
    pub(crate) async fn write_packets(&mut self, packets: &[Packet]) -> Result<()> {
        let mut payload = Vec::new();
        for packet in packets {
            packet.check_size()?;
            payload.extend_from_slice(&packet.pack());
        }

        self.stream
            .write_all(&payload)
            .await
            .map_err(RconError::SendError)?;
        self.stream.flush().await.map_err(RconError::SendError)
    }

    pub(crate) async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = Packet::take_from(&mut self.buffer, Direction::ClientBound)? {
                return Ok(packet);
            }

            self.buffer.reserve(READ_CHUNK);
            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(RconError::ReceiveError)?;
            if read == 0 {
                return Err(RconError::ConnectionClosed);
            }
        }
    }
}

/// Owns the socket to one server and drives the auth handshake. Other
/// components only reach the socket through [ConnectionManager::transport].
pub struct ConnectionManager<S = TcpStream> {
    transport: Option<Transport<S>>,
    state: watch::Sender<ConnectionState>,
}

impl<S> Default for ConnectionManager<S> {
    fn default() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        ConnectionManager {
            transport: None,
            state,
        }
    }
}

impl ConnectionManager<TcpStream> {
    /// Open a tcp connection and authenticate. Opening the socket and the
    /// handshake share one deadline.
    pub async fn connect(&mut self, info: &ConnectionInfo, timeout: Duration) -> Result<()> {
        info.validate()?;
        self.disconnect();

        let deadline = Instant::now() + timeout;
        let addr = info.rcon_addr();
        self.set_state(ConnectionState::Connecting);

        let stream = match time::timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                let err = RconError::UnreachableHost(err);
                self.abort(&err);
                return Err(err);
            }
            Err(elapsed) => {
                let err = RconError::from(elapsed);
                self.abort(&err);
                return Err(err);
            }
        };

        trace!("opened tcp stream to {}, attempting auth", addr);
        self.handshake(stream, &info.password, deadline).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> ConnectionManager<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Authenticate over a stream that is already open.
    pub async fn attach(&mut self, stream: S, password: &str, timeout: Duration) -> Result<()> {
        self.disconnect();
        self.handshake(stream, password, Instant::now() + timeout).await
    }

    /// Close the socket. Safe to call in any state.
    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            debug!("closing rcon connection");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// The framed socket, as long as the connection is usable.
    pub(crate) fn transport(&mut self) -> Result<&mut Transport<S>> {
        match (self.state(), self.transport.as_mut()) {
            (ConnectionState::Ready, Some(transport)) => Ok(transport),
            _ => Err(RconError::NotConnected),
        }
    }

    /// Record a transport or protocol failure that happened while a command
    /// was in flight.
    pub(crate) fn fault(&mut self, err: &RconError) {
        if matches!(err, RconError::ConnectionClosed) {
            warn!("server closed the rcon connection");
            self.transport = None;
            self.set_state(ConnectionState::Disconnected);
        } else {
            warn!("rcon connection faulted: {}", err);
            self.set_state(ConnectionState::Faulted);
        }
    }

    async fn handshake(&mut self, stream: S, password: &str, deadline: Instant) -> Result<()> {
        self.set_state(ConnectionState::Authenticating);

        let outcome = time::timeout_at(deadline, authenticate(Transport::new(stream), password))
            .await
            .map_err(RconError::from)
            .and_then(|result| result);

        match outcome {
            Ok(transport) => {
                trace!("auth complete");
                self.transport = Some(transport);
                self.set_state(ConnectionState::Ready);
                Ok(())
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    // A failed connect never leaves a half-open connection behind.
    fn abort(&mut self, err: &RconError) {
        warn!("rcon connect failed: {}", err);
        self.set_state(ConnectionState::Faulted);
        self.transport = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("rcon connection state {:?} -> {:?}", previous, state);
        }
    }
}

async fn authenticate<S: AsyncRead + AsyncWrite + Unpin>(
    mut transport: Transport<S>,
    password: &str,
) -> Result<Transport<S>> {
    let auth_packet = Packet::new(AUTH_REQUEST_ID, PacketType::Auth, password);

    trace!("sending auth packet to server");
    transport.write_packets(&[auth_packet]).await?;

    loop {
        let response = transport.read_packet().await?;
        trace!("receive response for packet id {}", response.id());
        match response.packet_type() {
            // some servers send an empty response value ahead of the real answer
            PacketType::ResponseValue if response.body().is_empty() => continue,
            PacketType::AuthResponse if response.id() == AUTH_REQUEST_ID => return Ok(transport),
            PacketType::AuthResponse => return Err(RconError::AuthenticationError),
            _ => {
                return Err(RconError::UnexpectedPacket {
                    id: response.id(),
                    reason: "expected an auth response",
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, packet::AUTH_FAILED_ID};
    use tokio_test::io::{Builder, Mock};

    fn auth(password: &str) -> Vec<u8> {
        Packet::new(AUTH_REQUEST_ID, PacketType::Auth, password).pack()
    }

    fn from_server(id: i32, packet_type: PacketType, body: &str) -> Vec<u8> {
        Packet::new(id, packet_type, body).pack()
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn accepts_echoed_auth_id_after_empty_response() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&from_server(AUTH_REQUEST_ID, PacketType::ResponseValue, ""))
            .read(&from_server(AUTH_REQUEST_ID, PacketType::AuthResponse, ""))
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        manager.attach(stream, "secret", TIMEOUT).await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Ready);
        assert!(manager.transport().is_ok());
    }

    #[tokio::test]
    async fn accepts_auth_response_without_leading_packet() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&from_server(AUTH_REQUEST_ID, PacketType::AuthResponse, ""))
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        manager.attach(stream, "secret", TIMEOUT).await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn rejected_auth_leaves_connection_closed() {
        for password in ["", "wrong", "päßwörd with spaces"] {
            let stream = Builder::new()
                .write(&auth(password))
                .read(&from_server(AUTH_REQUEST_ID, PacketType::ResponseValue, ""))
                .read(&from_server(AUTH_FAILED_ID, PacketType::AuthResponse, ""))
                .build();

            let mut manager = ConnectionManager::<Mock>::new();
            let err = manager.attach(stream, password, TIMEOUT).await.unwrap_err();

            assert!(matches!(err, RconError::AuthenticationError));
            assert_eq!(manager.state(), ConnectionState::Disconnected);
            assert!(matches!(manager.transport(), Err(RconError::NotConnected)));
        }
    }

    #[tokio::test]
    async fn mismatched_auth_id_is_rejected() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&from_server(42, PacketType::AuthResponse, ""))
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        let err = manager.attach(stream, "secret", TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn garbage_during_auth_is_a_protocol_error() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&[0xff; 12])
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        let err = manager.attach(stream, "secret", TIMEOUT).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn non_empty_response_during_auth_is_unexpected() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&from_server(AUTH_REQUEST_ID, PacketType::ResponseValue, "hello"))
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        let err = manager.attach(stream, "secret", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, RconError::UnexpectedPacket { .. }));
    }

    #[tokio::test]
    async fn server_hanging_up_during_auth() {
        let stream = Builder::new().write(&auth("secret")).build();

        let mut manager = ConnectionManager::<Mock>::new();
        let err = manager.attach(stream, "secret", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, RconError::ConnectionClosed));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&from_server(AUTH_REQUEST_ID, PacketType::AuthResponse, ""))
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        let mut states = manager.subscribe();
        manager.attach(stream, "secret", TIMEOUT).await.unwrap();

        manager.disconnect();
        manager.disconnect();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn fault_keeps_state_until_disconnect() {
        let stream = Builder::new()
            .write(&auth("secret"))
            .read(&from_server(AUTH_REQUEST_ID, PacketType::AuthResponse, ""))
            .build();

        let mut manager = ConnectionManager::<Mock>::new();
        manager.attach(stream, "secret", TIMEOUT).await.unwrap();

        manager.fault(&RconError::MalformedFrame(-1));
        assert_eq!(manager.state(), ConnectionState::Faulted);
        assert!(matches!(manager.transport(), Err(RconError::NotConnected)));

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
