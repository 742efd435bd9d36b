use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::{self, Instant},
};

use crate::{
    connection::ConnectionManager,
    error::{RconError, Result},
    packet::{Packet, PacketType, AUTH_REQUEST_ID},
};

/// First id handed out for commands. Ids below it are reserved for auth.
pub const FIRST_COMMAND_ID: i32 = 100;

/// Monotonic request ids, wrapping back to [FIRST_COMMAND_ID] at `i32::MAX`.
#[derive(Debug, Clone)]
pub struct RequestIds {
    next: i32,
}

impl Default for RequestIds {
    fn default() -> Self {
        RequestIds::starting_at(FIRST_COMMAND_ID)
    }
}

impl RequestIds {
    pub fn starting_at(next: i32) -> Self {
        RequestIds {
            next: next.max(FIRST_COMMAND_ID),
        }
    }

    pub fn next_id(&mut self) -> i32 {
        let id = self.next;
        self.next = if id == i32::MAX {
            FIRST_COMMAND_ID
        } else {
            id + 1
        };
        debug_assert_ne!(id, AUTH_REQUEST_ID);
        id
    }
}

/// A command waiting for its response. Fragments for `request_id` pile up in
/// `body` until the reply to `probe_id` shows up.
#[derive(Debug)]
struct PendingRequest {
    request_id: i32,
    probe_id: i32,
    issued_at: Instant,
    body: BytesMut,
}

impl PendingRequest {
    fn finish(mut self) -> Vec<u8> {
        while self.body.last() == Some(&0) {
            self.body.truncate(self.body.len() - 1);
        }
        trace!(
            "request {} complete after {:?} ({} bytes)",
            self.request_id,
            self.issued_at.elapsed(),
            self.body.len()
        );
        self.body.to_vec()
    }
}

/// Matches responses to commands. One command is in flight at a time; the
/// caller holds `&mut self` for the whole exchange.
#[derive(Debug)]
pub struct Correlator {
    ids: RequestIds,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Correlator {
            ids: RequestIds::default(),
            timeout,
        }
    }

    pub fn with_ids(mut self, ids: RequestIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one command and wait for its complete response body.
    ///
    /// Since the server can split up the response but won't tell us how many
    /// packets to expect, a second blank command is sent right behind the
    /// real one. Responses arrive in order, so everything for the real id up
    /// to the blank command's reply is the full response.
    pub async fn send<S>(
        &mut self,
        connection: &mut ConnectionManager<S>,
        packet_type: PacketType,
        body: &str,
    ) -> Result<Vec<u8>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let transport = connection.transport()?;

        let request = Packet::new(self.ids.next_id(), packet_type, body);
        request.check_size()?;
        let probe = Packet::new(self.ids.next_id(), PacketType::ExecCommand, "");
        let mut pending = PendingRequest {
            request_id: request.id(),
            probe_id: probe.id(),
            issued_at: Instant::now(),
            body: BytesMut::new(),
        };
        let deadline = pending.issued_at + self.timeout;

        trace!(
            "sending request {} with probe {}",
            pending.request_id,
            pending.probe_id
        );
        // a write cut short leaves half a frame on the wire, so the stream
        // can't be trusted afterwards
        let written = time::timeout_at(deadline, transport.write_packets(&[request, probe]))
            .await
            .map_err(RconError::from)
            .and_then(|result| result);
        if let Err(err) = written {
            connection.fault(&err);
            return Err(err);
        }

        let collected = time::timeout_at(deadline, async {
            loop {
                let response = transport.read_packet().await?;
                trace!("receive response for packet id {}", response.id());
                if response.id() == pending.request_id {
                    pending.body.extend_from_slice(response.body());
                } else if response.id() == pending.probe_id {
                    return Ok(());
                } else {
                    debug!("discarding packet for stale request {}", response.id());
                }
            }
        })
        .await;

        match collected {
            Ok(Ok(())) => Ok(pending.finish()),
            Ok(Err(err)) => {
                connection.fault(&err);
                Err(err)
            }
            // late fragments carry an old id and get discarded by the next command
            Err(elapsed) => {
                debug!(
                    "request {} timed out with {} bytes received",
                    pending.request_id,
                    pending.body.len()
                );
                Err(elapsed.into())
            }
        }
    }
}
