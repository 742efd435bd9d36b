//! Minimal rcon endpoint speaking the server side of the protocol. Handy for
//! trying the client without a game server and for tests.
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::BytesMut;
use log::{debug, error, info};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    task::JoinHandle,
};

use crate::{
    error::{RconError, Result},
    packet::{Direction, Packet, PacketType, AUTH_FAILED_ID},
};

/// Largest response body sent in one packet by default, as srcds does.
pub const DEFAULT_FRAGMENT_SIZE: usize = 4096;

type Handler = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Every packet the server received, in arrival order, across all connections.
/// Only kept when enabled with [Server::with_packet_log].
#[derive(Clone, Default)]
pub struct PacketLog(Arc<Mutex<Vec<Packet>>>);

impl PacketLog {
    pub fn packets(&self) -> Vec<Packet> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, packet: Packet) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(packet);
    }
}

#[derive(Clone)]
struct Settings {
    password: String,
    handler: Handler,
    fragment_size: usize,
    response_delay: Option<Duration>,
    log: Option<PacketLog>,
}

pub struct Server {
    listener: TcpListener,
    settings: Settings,
}

impl Server {
    /// Listen on `addr`. `handler` turns a command into its output.
    pub async fn bind<A, F>(addr: A, password: &str, handler: F) -> Result<Self>
    where
        A: ToSocketAddrs,
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(RconError::BindError)?;

        Ok(Server {
            listener,
            settings: Settings {
                password: password.to_string(),
                handler: Arc::new(handler),
                fragment_size: DEFAULT_FRAGMENT_SIZE,
                response_delay: None,
                log: None,
            },
        })
    }

    /// Split command output into packets of at most `size` bytes.
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.settings.fragment_size = size.max(1);
        self
    }

    /// Wait this long before answering each non-empty command.
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.settings.response_delay = Some(delay);
        self
    }

    /// Record every received packet in a [PacketLog].
    pub fn with_packet_log(mut self) -> Self {
        self.settings.log.get_or_insert_with(PacketLog::default);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(RconError::BindError)
    }

    pub fn packet_log(&self) -> Option<PacketLog> {
        self.settings.log.clone()
    }

    pub fn start(self) -> JoinHandle<()> {
        let Server { listener, settings } = self;

        tokio::spawn(async move {
            if let Ok(addr) = listener.local_addr() {
                info!("rcon server running on {}", addr);
            }
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let settings = settings.clone();
                        tokio::spawn(async move {
                            if let Err(err) = Server::process(stream, addr, settings).await {
                                error!("connection from {} failed: {}", addr, err);
                            }
                        });
                    }
                    Err(e) => error!("{:?}", e),
                }
            }
        })
    }

    async fn process(mut stream: TcpStream, addr: SocketAddr, settings: Settings) -> Result<()> {
        info!("accept from {:?}", addr);
        // replies go out as several small writes
        if let Err(err) = stream.set_nodelay(true) {
            debug!("cannot disable nagle for {}: {}", addr, err);
        }

        let mut buffer = BytesMut::with_capacity(DEFAULT_FRAGMENT_SIZE);
        let mut authenticated = false;

        loop {
            let Some(packet) = Packet::take_from(&mut buffer, Direction::ServerBound)? else {
                buffer.reserve(DEFAULT_FRAGMENT_SIZE);
                let read = stream
                    .read_buf(&mut buffer)
                    .await
                    .map_err(RconError::ReceiveError)?;
                if read == 0 {
                    debug!("{} hung up", addr);
                    return Ok(());
                }
                continue;
            };

            if let Some(log) = &settings.log {
                log.push(packet.clone());
            }
            let id = packet.id();

            let replies = match packet.packet_type() {
                PacketType::Auth => {
                    authenticated = packet.body() == settings.password.as_bytes();
                    let answer = if authenticated { id } else { AUTH_FAILED_ID };
                    vec![
                        Packet::new(id, PacketType::ResponseValue, ""),
                        Packet::new(answer, PacketType::AuthResponse, ""),
                    ]
                }
                PacketType::ExecCommand if !authenticated => {
                    info!("closing unauthenticated connection from {}", addr);
                    return Ok(());
                }
                PacketType::ExecCommand if packet.body().is_empty() => {
                    vec![Packet::new(id, PacketType::ResponseValue, "")]
                }
                PacketType::ExecCommand => {
                    if let Some(delay) = settings.response_delay {
                        tokio::time::sleep(delay).await;
                    }
                    let command = String::from_utf8_lossy(packet.body());
                    let output = (settings.handler)(&command);
                    fragments(id, output.as_bytes(), settings.fragment_size)
                }
                PacketType::AuthResponse | PacketType::ResponseValue => {
                    return Err(RconError::UnexpectedPacket {
                        id,
                        reason: "clients only send auth and exec packets",
                    })
                }
            };

            let payload: Vec<u8> = replies.iter().flat_map(Packet::pack).collect();
            stream
                .write_all(&payload)
                .await
                .map_err(RconError::SendError)?;
        }
    }
}

fn fragments(id: i32, output: &[u8], size: usize) -> Vec<Packet> {
    if output.is_empty() {
        return vec![Packet::new(id, PacketType::ResponseValue, "")];
    }
    output
        .chunks(size)
        .map(|chunk| Packet::new(id, PacketType::ResponseValue, chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_split_into_sized_fragments() {
        let packets = fragments(100, b"abcdefg", 3);
        let bodies: Vec<&[u8]> = packets.iter().map(Packet::body).collect();
        assert_eq!(bodies, vec![&b"abc"[..], &b"def"[..], &b"g"[..]]);
        assert!(packets.iter().all(|p| p.id() == 100));
    }

    #[tokio::test]
    async fn packet_log_is_opt_in() {
        let server = Server::bind("127.0.0.1:0", "secret", str::to_string)
            .await
            .unwrap();
        assert!(server.packet_log().is_none());

        let server = server.with_packet_log();
        assert!(server.packet_log().unwrap().packets().is_empty());
    }

    #[test]
    fn empty_output_still_gets_an_answer() {
        let packets = fragments(100, b"", 3);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].body().is_empty());
    }
}
