use crate::{
    commands::AdminCommand,
    config::{ClientConfig, ConnectionInfo},
    connection::{ConnectionManager, ConnectionState},
    correlator::Correlator,
    error::{RconError, Result},
    packet::PacketType,
    players::{parse_players, PlayerRecord},
    query::{ServerInfo, ServerQuery},
};
use log::{debug, trace};
use tokio::sync::{watch, Mutex, MutexGuard};

/// Asynchronous rcon client for a single server. Call `connect()` to establish
/// a connection and authenticate.
///
/// Commands are serialized: while one command waits for its response, others
/// queue behind it ([Client::send_command]) or fail with [RconError::Busy]
/// ([Client::try_send_command]). Share it behind an `Arc` to use it from
/// several tasks; open a second `Client` for a second session.
///
/// ## Example
/// ```no_run
/// use squadcon::{client::Client, config::{ClientConfig, ConnectionInfo}};
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     let host = ConnectionInfo::parse_host("127.0.0.1")?;
///     let client = Client::new(ClientConfig::default());
///     client
///         .connect(ConnectionInfo::new(host, 21114, 27165, "<put rcon password here>"))
///         .await?;
///
///     for player in client.list_players().await? {
///         println!("{} {} {}", player.slot, player.steam_id, player.name);
///     }
///     client.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct Client {
    session: Mutex<Session>,
    state: watch::Receiver<ConnectionState>,
    config: ClientConfig,
}

struct Session {
    connection: ConnectionManager,
    correlator: Correlator,
    info: Option<ConnectionInfo>,
}

impl Default for Client {
    fn default() -> Self {
        Client::new(ClientConfig::default())
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let connection: ConnectionManager = ConnectionManager::default();
        let state = connection.subscribe();

        Client {
            session: Mutex::new(Session {
                connection,
                correlator: Correlator::new(config.command_timeout),
                info: None,
            }),
            state,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect and authenticate, replacing any previous connection. Waits
    /// for a command that is still in flight.
    pub async fn connect(&self, info: ConnectionInfo) -> Result<()> {
        info.validate()?;
        let mut session = self.session.lock().await;

        debug!("connecting to {}", info.rcon_addr());
        let result = session
            .connection
            .connect(&info, self.config.connect_timeout)
            .await;
        session.info = Some(info);
        result
    }

    /// Close the connection. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        self.session.lock().await.connection.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Run a command and return the full response text, waiting for any
    /// command that is already in flight.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let session = self.session.lock().await;
        self.exchange(session, command).await
    }

    /// Like [Client::send_command], but fails with [RconError::Busy] instead
    /// of waiting for another command to finish.
    pub async fn try_send_command(&self, command: &str) -> Result<String> {
        let session = self.session.try_lock().map_err(|_| RconError::Busy)?;
        self.exchange(session, command).await
    }

    pub async fn execute(&self, command: &AdminCommand) -> Result<String> {
        self.send_command(&command.to_string()).await
    }

    pub async fn list_players(&self) -> Result<Vec<PlayerRecord>> {
        let response = self.execute(&AdminCommand::ListPlayers).await?;
        Ok(parse_players(&response))
    }

    /// Ask the query collaborator for the status of the server this client
    /// was last pointed at. Does not need an authenticated connection.
    pub async fn server_info<Q: ServerQuery>(&self, query: &Q) -> Result<ServerInfo> {
        let (host, query_port) = {
            let session = self.session.lock().await;
            let info = session.info.as_ref().ok_or(RconError::NotConnected)?;
            (info.host, info.query_port)
        };

        trace!("querying server info from {}:{}", host, query_port);
        query
            .query(host, query_port)
            .await
            .map_err(RconError::QueryError)
    }

    async fn exchange(&self, mut session: MutexGuard<'_, Session>, command: &str) -> Result<String> {
        let Session {
            connection,
            correlator,
            ..
        } = &mut *session;

        trace!("sending command {:?}", command);
        let body = correlator
            .send(connection, PacketType::ExecCommand, command)
            .await?;
        let text = String::from_utf8(body)?;

        Ok(self.config.line_ending.apply(text))
    }
}
