use bytes::{Buf, BytesMut};

use crate::error::{RconError, Result};

/// Request id reserved for the authentication packet. Command ids never use it.
pub const AUTH_REQUEST_ID: i32 = 1;
/// Request id the server answers with when authentication is rejected.
pub const AUTH_FAILED_ID: i32 = -1;
/// Largest `size` field we accept. Anything bigger is treated as a corrupted stream.
pub const MAX_PACKET_SIZE: i32 = 64 * 1024;

const SIZE_FIELD_LEN: usize = 4;

/// Which way a packet travels. The protocol reuses tag `2` for both
/// `SERVERDATA_EXECCOMMAND` and `SERVERDATA_AUTH_RESPONSE`, so a tag can
/// only be interpreted once we know who sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    ServerBound,
    /// Server to client.
    ClientBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    // SERVERDATA_AUTH
    Auth,
    // SERVERDATA_EXECCOMMAND
    ExecCommand,
    // SERVERDATA_AUTH_RESPONSE
    AuthResponse,
    // SERVERDATA_RESPONSE_VALUE
    ResponseValue,
}

impl PacketType {
    pub const fn tag(self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::ExecCommand => 2,
            PacketType::AuthResponse => 2,
            PacketType::ResponseValue => 0,
        }
    }

    pub const fn direction(self) -> Direction {
        match self {
            PacketType::Auth | PacketType::ExecCommand => Direction::ServerBound,
            PacketType::AuthResponse | PacketType::ResponseValue => Direction::ClientBound,
        }
    }

    pub fn from_tag(tag: i32, direction: Direction) -> Result<Self> {
        match (direction, tag) {
            (Direction::ServerBound, 3) => Ok(PacketType::Auth),
            (Direction::ServerBound, 2) => Ok(PacketType::ExecCommand),
            (Direction::ClientBound, 2) => Ok(PacketType::AuthResponse),
            (Direction::ClientBound, 0) => Ok(PacketType::ResponseValue),
            _ => Err(RconError::UnknownPacketType(tag)),
        }
    }
}

/// A single rcon frame. Bodies are kept as raw bytes: a response may be split
/// in the middle of a multi-byte character, so text decoding happens only
/// after fragments are joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: i32,
    packet_type: PacketType,
    body: Vec<u8>,
}

impl Packet {
    /// id + type + body terminator + empty string terminator
    pub const BASE_PACKET_SIZE: i32 = 10;

    pub fn new(id: i32, packet_type: PacketType, body: impl Into<Vec<u8>>) -> Self {
        Packet {
            id,
            packet_type,
            body: body.into(),
        }
    }

    // The only field that varies in length is the body, so the size is the
    // byte length of the body plus 10. Saturates at `i32::MAX` for bodies
    // that can't be framed at all.
    pub fn size(&self) -> i32 {
        i32::try_from(self.body.len())
            .ok()
            .and_then(|len| len.checked_add(Self::BASE_PACKET_SIZE))
            .unwrap_or(i32::MAX)
    }

    /// Fails with [RconError::PacketTooLarge] unless the packet fits in a
    /// frame of at most [MAX_PACKET_SIZE] bytes.
    pub fn check_size(&self) -> Result<i32> {
        let size = self.size();
        if size > MAX_PACKET_SIZE {
            return Err(RconError::PacketTooLarge(self.body.len()));
        }
        Ok(size)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn pack(&self) -> Vec<u8> {
        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::with_capacity(self.size() as usize + SIZE_FIELD_LEN);
        payload.extend_from_slice(&self.size().to_le_bytes());
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.extend_from_slice(&self.packet_type.tag().to_le_bytes());
        payload.extend_from_slice(&self.body);
        // null terminate the body, then the empty second string the protocol expects
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }

    /// Decode one packet from the front of `incoming`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a whole frame, or
    /// the packet together with the number of bytes it occupied.
    pub fn unpack(incoming: &[u8], direction: Direction) -> Result<Option<(Packet, usize)>> {
        let Some(size_bytes) = incoming.get(..SIZE_FIELD_LEN) else {
            return Ok(None);
        };
        let size = i32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);
        if !(Self::BASE_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(RconError::MalformedFrame(size));
        }

        let frame_len = SIZE_FIELD_LEN + size as usize;
        let Some(frame) = incoming.get(SIZE_FIELD_LEN..frame_len) else {
            return Ok(None);
        };

        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let tag = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let packet_type = PacketType::from_tag(tag, direction)?;
        // the last two bytes are the body terminator and the empty string
        let body = frame[8..frame.len() - 2].to_vec();

        Ok(Some((Packet::new(id, packet_type, body), frame_len)))
    }

    /// Streaming variant of [Packet::unpack]: consumes the frame from the
    /// buffer on success and leaves partial frames untouched.
    pub fn take_from(buffer: &mut BytesMut, direction: Direction) -> Result<Option<Packet>> {
        match Self::unpack(buffer, direction)? {
            Some((packet, consumed)) => {
                buffer.advance(consumed);
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}
