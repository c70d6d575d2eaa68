//! Peer wire protocol: messages, stream framing, and per-peer sessions.
//!
//! A connection to a peer starts with a fixed 68-byte [`Handshake`]; every
//! later message is a 4-byte big-endian length prefix, a 1-byte type, and a
//! payload. The [`Framer`] turns arbitrary TCP chunks into complete frames,
//! and a [`PeerSession`] drives one peer through handshake, bitfield,
//! interest, and chunk-by-chunk piece download.

mod bitfield;
mod error;
mod framer;
mod message;
mod peer_id;
mod session;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use framer::{Frame, Framer, MAX_FRAME_LEN};
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN, PROTOCOL};
pub use peer_id::PeerId;
pub use session::{DisconnectReason, PeerSession, SessionEvent, SessionState, REQUEST_TIMEOUT};

#[cfg(test)]
mod tests;
