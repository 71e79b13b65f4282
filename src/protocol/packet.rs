//! Packet framing: the fixed header, body limits and the `OPEN_WRITE` body
// (c) 2025 Ross Younger

use std::{borrow::Cow, fmt::Display};

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use int_enum::IntEnum;
use static_assertions::const_assert;

/// Largest frame (header plus body) either side will ever put on the wire
pub const MAX_FRAME: usize = 8192;
/// Size of the fixed frame header
pub const HEADER_SIZE: usize = 6;
/// Largest permissible packet body
pub const MAX_BODY: usize = MAX_FRAME - HEADER_SIZE;

// body_length is carried in a u16
const_assert!(MAX_BODY <= u16::MAX as usize);

/// What a packet asks the peer to do.
///
/// On the wire this is a raw `u16`; values outside this set are carried
/// unchanged and treated as plain text by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntEnum, strum::Display)]
#[repr(u16)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Human-readable text, printed by the receiver
    PlainText = 0,
    /// End of a file transfer
    Close = 1,
    /// Client request: send me the named file
    OpenRead = 2,
    /// Start of a file transfer (server to client)
    OpenWrite = 3,
    /// A chunk of file data
    WriteChunk = 4,
    /// Client request: list a directory
    ListDir = 5,
    /// Client request: change the session's working directory
    ChangeDir = 6,
    /// Client request: report the session's working directory
    PrintDir = 7,
}

/// The frame header declared a body longer than [`MAX_BODY`].
///
/// The stream cannot be resynchronised after this; the connection must close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame header declares a {declared}-byte body (limit {MAX_BODY})")]
pub struct FramingError {
    /// The offending length
    pub declared: u16,
}

/// Problems constructing or interpreting a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The body would not fit in a single frame
    #[error("packet body of {0} bytes exceeds the {MAX_BODY}-byte limit")]
    BodyTooLong(usize),
    /// `OPEN_WRITE` bodies start with a 4-byte size
    #[error("OPEN_WRITE body is {0} bytes long; at least 4 are required")]
    ShortOpenWrite(usize),
    /// The `OPEN_WRITE` filename was empty or not UTF-8
    #[error("OPEN_WRITE carries an unusable filename")]
    BadFilename,
}

/// The fixed 6-byte frame header.
///
/// Layout: `body_length`, `action`, `id`; each an unsigned 16-bit little-endian integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Number of body bytes following the header
    pub body_length: u16,
    /// Raw action tag; see [`Header::action`]
    pub action: u16,
    /// Transfer id (zero when the action has no transfer)
    pub id: u16,
}

impl Header {
    /// Interprets the raw action tag. Returns None for tags we don't know.
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        Action::try_from(self.action).ok()
    }

    /// Serialises the header
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut cursor = &mut out[..];
        cursor.put_u16_le(self.body_length);
        cursor.put_u16_le(self.action);
        cursor.put_u16_le(self.id);
        out
    }

    /// Deserialises a header, rejecting over-long bodies.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, FramingError> {
        let mut cursor = &bytes[..];
        let body_length = cursor.get_u16_le();
        if usize::from(body_length) > MAX_BODY {
            return Err(FramingError {
                declared: body_length,
            });
        }
        Ok(Self {
            body_length,
            action: cursor.get_u16_le(),
            id: cursor.get_u16_le(),
        })
    }
}

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    action: u16,
    id: u16,
    body: Bytes,
}

impl Packet {
    /// Standard constructor
    pub fn new(action: Action, id: u16, body: impl Into<Bytes>) -> Result<Self, PacketError> {
        Self::with_raw_action(action.into(), id, body)
    }

    /// Constructs a packet with an arbitrary action tag, which need not be one we recognise
    pub fn with_raw_action(
        action: u16,
        id: u16,
        body: impl Into<Bytes>,
    ) -> Result<Self, PacketError> {
        let body = body.into();
        if body.len() > MAX_BODY {
            return Err(PacketError::BodyTooLong(body.len()));
        }
        Ok(Self { action, id, body })
    }

    /// A packet with no body
    #[must_use]
    pub fn empty(action: Action, id: u16) -> Self {
        Self {
            action: action.into(),
            id,
            body: Bytes::new(),
        }
    }

    /// A single `PLAIN_TEXT` packet
    pub fn text(message: &str) -> Result<Self, PacketError> {
        Self::new(Action::PlainText, 0, Bytes::copy_from_slice(message.as_bytes()))
    }

    /// Splits arbitrarily long text into as many `PLAIN_TEXT` packets as needed.
    ///
    /// Breaks fall at line boundaries where possible; a single line longer than
    /// [`MAX_BODY`] is broken at a character boundary.
    #[must_use]
    pub fn text_packets(message: &str) -> Vec<Self> {
        split_text(message, MAX_BODY)
            .into_iter()
            .map(|part| Self {
                action: Action::PlainText.into(),
                id: 0,
                body: Bytes::copy_from_slice(part.as_bytes()),
            })
            .collect()
    }

    /// Reassembles a packet from a validated header and its body.
    pub(crate) fn from_wire(header: Header, body: Bytes) -> Self {
        debug_assert_eq!(usize::from(header.body_length), body.len());
        Self {
            action: header.action,
            id: header.id,
            body,
        }
    }

    /// The packet's action, if we recognise it
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        Action::try_from(self.action).ok()
    }

    /// The raw action tag
    #[must_use]
    pub fn raw_action(&self) -> u16 {
        self.action
    }

    /// Transfer id
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Packet payload
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body, interpreted as text. Invalid UTF-8 is replaced, not rejected.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// The header that describes this packet
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // length was checked at construction
    pub fn header(&self) -> Header {
        Header {
            body_length: self.body.len() as u16,
            action: self.action,
            id: self.id,
        }
    }

    /// Serialises the packet, header and body, ready to be written in one go
    #[must_use]
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.body.len());
        buf.put_slice(&self.header().encode());
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.action() {
            Some(a) => write!(f, "{a}")?,
            None => write!(f, "UNKNOWN_{}", self.action)?,
        }
        write!(f, "#{} ({} bytes)", self.id, self.body.len())
    }
}

fn split_text(text: &str, limit: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.len() > limit {
        let mut fits = limit;
        while !rest.is_char_boundary(fits) {
            fits -= 1;
        }
        // prefer the last newline that fits
        let cut = rest[..fits].rfind('\n').map_or(fits, |nl| nl + 1);
        let (head, tail) = rest.split_at(cut);
        parts.push(head);
        rest = tail;
    }
    if !rest.is_empty() || parts.is_empty() {
        parts.push(rest);
    }
    parts
}

/// Body of an `OPEN_WRITE` packet: `final_size` (u32 little-endian) then the filename (UTF-8, unterminated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenWrite {
    /// Exact number of bytes that will follow in `WRITE_CHUNK` packets
    pub final_size: u32,
    /// Name the receiver should save the file under
    pub filename: String,
}

impl OpenWrite {
    /// Serialises the body
    pub fn encode(&self) -> Result<Bytes, PacketError> {
        let len = 4 + self.filename.len();
        if len > MAX_BODY {
            return Err(PacketError::BodyTooLong(len));
        }
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u32_le(self.final_size);
        buf.put_slice(self.filename.as_bytes());
        Ok(buf.freeze())
    }

    /// Wraps the body up into a packet
    pub fn to_packet(&self, id: u16) -> Result<Packet, PacketError> {
        Packet::new(Action::OpenWrite, id, self.encode()?)
    }

    /// Parses a received body
    pub fn decode(body: &[u8]) -> Result<Self, PacketError> {
        if body.len() < 4 {
            return Err(PacketError::ShortOpenWrite(body.len()));
        }
        let mut cursor = body;
        let final_size = cursor.get_u32_le();
        let filename = std::str::from_utf8(cursor).map_err(|_| PacketError::BadFilename)?;
        if filename.is_empty() {
            return Err(PacketError::BadFilename);
        }
        Ok(Self {
            final_size,
            filename: filename.to_owned(),
        })
    }
}
