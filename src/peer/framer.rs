use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN, PROTOCOL};
use bytes::BytesMut;

/// Upper bound on the length prefix of a single frame.
///
/// The largest legitimate message is a Piece carrying one 16 KiB chunk plus
/// its 9-byte header; anything near a megabyte is a corrupt or hostile
/// length prefix and would otherwise make us buffer unboundedly.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// A complete frame emitted by the [`Framer`].
#[derive(Debug, Clone)]
pub enum Frame {
    Handshake(Handshake),
    Message(Message),
}

/// Incremental splitter from a raw byte stream into protocol frames.
///
/// TCP gives no message boundaries: one read may hold half a message or
/// several. [`push`] buffers incoming bytes and [`next_frame`] emits
/// complete frames in arrival order, never splitting a frame across
/// emissions. The emitted frames are identical no matter how the input was
/// chunked.
///
/// [`push`]: Framer::push
/// [`next_frame`]: Framer::next_frame
///
/// # Examples
///
/// ```
/// use minnow::peer::{Frame, Framer, Message};
///
/// let mut framer = Framer::new();
///
/// // An unchoke frame delivered one byte at a time.
/// for &byte in &[0u8, 0, 0, 1, 1] {
///     framer.push(&[byte]);
/// }
///
/// match framer.next_frame().unwrap() {
///     Some(Frame::Message(Message::Unchoke)) => {}
///     other => panic!("unexpected frame: {:?}", other),
/// }
/// assert!(framer.next_frame().unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(32 * 1024),
        }
    }

    /// Appends raw bytes received from the socket.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// [`PeerError::FrameTooLarge`] if a length prefix exceeds
    /// [`MAX_FRAME_LEN`], and any [`Message::decode`] error for a complete
    /// but malformed frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, PeerError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        // A handshake has no length prefix, so it must be sniffed: anything
        // starting with <19>"BitTorrent protocol" is one. While the buffer
        // is still a proper prefix of that header we cannot classify it yet.
        let header_len = self.buf.len().min(20);
        if self.buf[..header_len] == handshake_header()[..header_len] {
            if self.buf.len() < HANDSHAKE_LEN {
                return Ok(None);
            }

            let frame = self.buf.split_to(HANDSHAKE_LEN);
            let handshake = Handshake::decode(&frame)?;
            return Ok(Some(Frame::Handshake(handshake)));
        }

        if self.buf.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;

        if length > MAX_FRAME_LEN {
            return Err(PeerError::FrameTooLarge(length));
        }

        let total_len = 4 + length;
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let frame = self.buf.split_to(total_len);
        let message = Message::decode(frame.freeze())?;
        Ok(Some(Frame::Message(message)))
    }

    /// Number of buffered bytes not yet emitted as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn handshake_header() -> [u8; 20] {
    let mut header = [0u8; 20];
    header[0] = 19;
    header[1..].copy_from_slice(PROTOCOL);
    header
}
