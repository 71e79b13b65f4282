// (c) 2025 Ross Younger

//! 📖 The rfa wire protocol
//!
//! rfa speaks a simple framed protocol over a single TCP stream.
//!
//! ## Framing
//!
//! Every message is a [`Packet`]: a fixed 6-byte [`Header`] followed by a body.
//!
//! | Offset | Size | Field         | Meaning                                  |
//! |--------|------|---------------|------------------------------------------|
//! | 0      | 2    | `body_length` | number of body bytes that follow          |
//! | 2      | 2    | `action`      | what the packet asks for (see [`Action`]) |
//! | 4      | 2    | `id`          | transfer id, or 0                         |
//!
//! All integers are unsigned and little-endian.
//! No frame may exceed [`MAX_FRAME`] bytes, so a body is at most [`MAX_BODY`] bytes.
//! A header declaring a longer body is a fatal framing error: the connection is closed.
//!
//! ## Conversation
//!
//! The client sends requests (`LIST_DIR`, `CHANGE_DIR`, `PRINT_DIR`, `OPEN_READ`), each of which
//! carries a path in its body where it needs one. Paths are relative to the session's working directory,
//! which starts at the server's root.
//!
//! The server answers with `PLAIN_TEXT` packets for anything human-readable (listings, errors,
//! the working directory), and with file transfers for `OPEN_READ`:
//!
//! 1. `OPEN_WRITE` with a fresh id; its body is `final_size` (u32 LE) followed by the bare filename
//! 1. zero or more `WRITE_CHUNK` packets with the same id, in file order
//! 1. `CLOSE` with the same id
//!
//! Transfers may interleave with one another and with text, but each transfer's packets arrive in order.
//! The server allocates ids per connection, starting at 0 and wrapping at 65535.
//!
//! Either side ends the conversation by closing its send side of the stream.
//!
//! Unknown action values are printed as text.

mod channel;
mod packet;

pub use channel::{Channel, ChannelClosed, ChannelError, ChannelOutcome, Dispatcher, Outbox};
#[cfg(test)]
pub(crate) use channel::read_packet;
pub use packet::{
    Action, FramingError, HEADER_SIZE, Header, MAX_BODY, MAX_FRAME, OpenWrite, Packet, PacketError,
};
