use super::bitfield::Bitfield;
use super::error::PeerError;
use super::framer::{Frame, Framer};
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use crate::download::PieceStore;
use crate::piece::{Layout, PieceTable, CHUNK_LENGTH};
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long to wait for the next chunk of an in-flight piece before the
/// session gives up and requeues it. Rearmed on every chunk received.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection state of a peer session. Strictly forward-progressing except
/// for the fall back to `Disconnected` on failure or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    HandshakeCompleted,
    Unchoked,
    Downloading,
}

/// Why a session ended. Reported to the coordinator; never fatal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote end refused the TCP connection.
    Refused,
    /// The peer closed the connection.
    Closed,
    /// No chunk arrived within [`REQUEST_TIMEOUT`].
    Timeout,
    /// The peer broke the protocol (bad handshake, unexpected message).
    ProtocolViolation,
    /// Socket or disk I/O failed.
    TransportError,
    /// The peer advertised nothing we still need; we closed.
    NothingWanted,
}

impl From<&PeerError> for DisconnectReason {
    fn from(err: &PeerError) -> Self {
        match err {
            PeerError::ConnectionRefused => DisconnectReason::Refused,
            PeerError::ConnectionClosed => DisconnectReason::Closed,
            PeerError::Timeout => DisconnectReason::Timeout,
            PeerError::Io(_) => DisconnectReason::TransportError,
            _ => DisconnectReason::ProtocolViolation,
        }
    }
}

/// Notifications a session sends its coordinator.
///
/// These are the only things the coordinator ever observes: raw peer errors
/// stay inside the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    PieceDownloaded {
        addr: SocketAddr,
        index: usize,
    },
    Disconnected {
        addr: SocketAddr,
        reason: DisconnectReason,
    },
}

struct InFlight {
    index: usize,
    buf: BytesMut,
    chunks_received: u32,
    deadline: Instant,
}

/// One state machine per remote peer.
///
/// A session owns its socket, receive buffer, and in-flight chunk buffer.
/// It shares only the piece table with its sibling sessions and reports
/// progress to the coordinator over a channel. Run it to completion with
/// [`PeerSession::run`]; every exit path requeues an in-flight piece and
/// emits exactly one `Disconnected` event.
pub struct PeerSession {
    addr: SocketAddr,
    info_hash: [u8; 20],
    client_id: PeerId,
    expected_peer_id: Option<[u8; 20]>,
    table: Arc<PieceTable>,
    layout: Layout,
    store: PieceStore,
    events: mpsc::Sender<SessionEvent>,
    state: SessionState,
    bitfield: Option<Bitfield>,
    in_flight: Option<InFlight>,
}

impl PeerSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        addr: SocketAddr,
        info_hash: [u8; 20],
        client_id: PeerId,
        expected_peer_id: Option<[u8; 20]>,
        table: Arc<PieceTable>,
        layout: Layout,
        store: PieceStore,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            addr,
            info_hash,
            client_id,
            expected_peer_id,
            table,
            layout,
            store,
            events,
            state: SessionState::Disconnected,
            bitfield: None,
            in_flight: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session until the connection ends, then notifies the
    /// coordinator. Never panics or propagates: peer failures are isolated
    /// to this session.
    pub async fn run(mut self) {
        let reason = match self.drive().await {
            Ok(reason) => reason,
            Err(err) => {
                debug!(peer = %self.addr, error = %err, "session ended");
                DisconnectReason::from(&err)
            }
        };

        if let Some(in_flight) = self.in_flight.take() {
            self.table.release(in_flight.index);
            debug!(peer = %self.addr, piece = in_flight.index, "requeued in-flight piece");
        }

        self.state = SessionState::Disconnected;
        debug!(peer = %self.addr, ?reason, "disconnected");

        // The coordinator may already be gone during shutdown.
        let _ = self
            .events
            .send(SessionEvent::Disconnected {
                addr: self.addr,
                reason,
            })
            .await;
    }

    async fn drive(&mut self) -> Result<DisconnectReason, PeerError> {
        let mut stream = TcpStream::connect(self.addr).await.map_err(|err| {
            if err.kind() == ErrorKind::ConnectionRefused {
                PeerError::ConnectionRefused
            } else {
                PeerError::Io(err)
            }
        })?;

        self.state = SessionState::Connected;
        debug!(peer = %self.addr, "connected, sending handshake");

        let handshake = Handshake::new(self.info_hash, *self.client_id.as_bytes());
        stream.write_all(&handshake.encode()).await?;

        let mut framer = Framer::new();
        let mut read_buf = BytesMut::with_capacity(32 * 1024);

        loop {
            while let Some(frame) = framer.next_frame()? {
                if let Some(close) = self.handle_frame(frame, &mut stream).await? {
                    return Ok(close);
                }
            }

            // While a piece is in flight the read races the chunk deadline.
            let read = stream.read_buf(&mut read_buf);
            let n = match self.in_flight.as_ref().map(|p| p.deadline) {
                Some(deadline) => tokio::time::timeout_at(deadline, read)
                    .await
                    .map_err(|_| PeerError::Timeout)??,
                None => read.await?,
            };

            if n == 0 {
                return Ok(DisconnectReason::Closed);
            }

            framer.push(&read_buf.split());
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Frame,
        stream: &mut TcpStream,
    ) -> Result<Option<DisconnectReason>, PeerError> {
        match frame {
            Frame::Handshake(handshake) => {
                self.on_handshake(handshake)?;
                Ok(None)
            }
            Frame::Message(message) => self.on_message(message, stream).await,
        }
    }

    fn on_handshake(&mut self, handshake: Handshake) -> Result<(), PeerError> {
        if self.state != SessionState::Connected {
            return Err(PeerError::Violation("unexpected handshake".into()));
        }

        if handshake.info_hash != self.info_hash {
            return Err(PeerError::InfoHashMismatch);
        }

        if let Some(expected) = self.expected_peer_id {
            if handshake.peer_id != expected {
                // The protocol allows this; trackers hand out stale ids.
                warn!(peer = %self.addr, "peer id does not match tracker-provided id");
            }
        }

        debug!(peer = %self.addr, "handshake completed");
        self.state = SessionState::HandshakeCompleted;
        Ok(())
    }

    async fn on_message(
        &mut self,
        message: Message,
        stream: &mut TcpStream,
    ) -> Result<Option<DisconnectReason>, PeerError> {
        if self.state == SessionState::Connected {
            return Err(PeerError::Violation("message before handshake".into()));
        }

        match message {
            Message::KeepAlive => {
                debug!(peer = %self.addr, "keep-alive");
                Ok(None)
            }
            Message::Bitfield(bits) => self.on_bitfield(bits, stream).await,
            Message::Unchoke => {
                self.on_unchoke(stream).await?;
                Ok(None)
            }
            Message::Piece { index, begin, data } => {
                self.on_piece(index, begin, data, stream).await?;
                Ok(None)
            }
            Message::Choke => {
                // Download-only client: an in-flight piece is reclaimed by
                // the chunk deadline rather than cancelled here.
                debug!(peer = %self.addr, "choked");
                Ok(None)
            }
            other => {
                debug!(peer = %self.addr, message = ?other, "ignoring message");
                Ok(None)
            }
        }
    }

    async fn on_bitfield(
        &mut self,
        bits: Bytes,
        stream: &mut TcpStream,
    ) -> Result<Option<DisconnectReason>, PeerError> {
        if self.state != SessionState::HandshakeCompleted {
            return Err(PeerError::Violation("bitfield after transfer started".into()));
        }

        if bits.len() < self.layout.piece_count().div_ceil(8) {
            return Err(PeerError::Violation("bitfield too short".into()));
        }

        let bitfield = Bitfield::from_bytes(bits, self.layout.piece_count());
        let wanted = self.table.has_wanted(&bitfield);
        self.bitfield = Some(bitfield);

        if !wanted {
            debug!(peer = %self.addr, "peer has no required pieces, closing");
            return Ok(Some(DisconnectReason::NothingWanted));
        }

        debug!(peer = %self.addr, "sending interested");
        stream.write_all(&Message::Interested.encode()).await?;
        Ok(None)
    }

    async fn on_unchoke(&mut self, stream: &mut TcpStream) -> Result<(), PeerError> {
        if matches!(
            self.state,
            SessionState::Unchoked | SessionState::Downloading
        ) {
            return Ok(());
        }

        debug!(peer = %self.addr, "unchoked");
        self.state = SessionState::Unchoked;
        self.begin_next_piece(stream).await
    }

    /// Claims the next required piece this peer advertises and requests its
    /// first chunk, or idles if the peer has nothing left for us.
    async fn begin_next_piece(&mut self, stream: &mut TcpStream) -> Result<(), PeerError> {
        let claimed = match self.bitfield.as_ref() {
            Some(bitfield) => self.table.claim_next(bitfield),
            None => None,
        };

        match claimed {
            Some(index) => {
                debug!(peer = %self.addr, piece = index, "starting piece");
                self.state = SessionState::Downloading;
                self.in_flight = Some(InFlight {
                    index,
                    buf: BytesMut::with_capacity(self.layout.piece_length_at(index) as usize),
                    chunks_received: 0,
                    deadline: Instant::now() + REQUEST_TIMEOUT,
                });
                self.request_chunk(index, 0, stream).await
            }
            None => {
                debug!(peer = %self.addr, "no required piece available, idling");
                self.state = SessionState::Unchoked;
                Ok(())
            }
        }
    }

    async fn request_chunk(
        &mut self,
        index: usize,
        chunk: u32,
        stream: &mut TcpStream,
    ) -> Result<(), PeerError> {
        let request = Message::Request {
            index: index as u32,
            begin: chunk * CHUNK_LENGTH,
            length: self.layout.chunk_length_at(index, chunk),
        };

        stream.write_all(&request.encode()).await?;
        Ok(())
    }

    async fn on_piece(
        &mut self,
        index: u32,
        begin: u32,
        data: Bytes,
        stream: &mut TcpStream,
    ) -> Result<(), PeerError> {
        if self.state != SessionState::Downloading {
            return Err(PeerError::Violation("piece while not downloading".into()));
        }

        let complete = {
            let in_flight = self
                .in_flight
                .as_mut()
                .ok_or_else(|| PeerError::Violation("piece without request".into()))?;

            let expected_begin = in_flight.chunks_received * CHUNK_LENGTH;
            let expected_len =
                self.layout.chunk_length_at(in_flight.index, in_flight.chunks_received);

            if index as usize != in_flight.index
                || begin != expected_begin
                || data.len() != expected_len as usize
            {
                return Err(PeerError::Violation(format!(
                    "unexpected chunk: piece {} offset {} ({} bytes)",
                    index,
                    begin,
                    data.len()
                )));
            }

            in_flight.buf.extend_from_slice(&data);
            in_flight.chunks_received += 1;
            in_flight.deadline = Instant::now() + REQUEST_TIMEOUT;

            in_flight.chunks_received >= self.layout.chunks_needed(in_flight.index)
        };

        if !complete {
            let (piece, chunk) = match self.in_flight.as_ref() {
                Some(in_flight) => (in_flight.index, in_flight.chunks_received),
                None => return Ok(()),
            };
            return self.request_chunk(piece, chunk, stream).await;
        }

        if let Some(done) = self.in_flight.take() {
            if let Err(err) = self.store.write_piece(done.index, &done.buf).await {
                self.table.release(done.index);
                return Err(err.into());
            }

            let first = self.table.mark_downloaded(done.index);
            debug!(peer = %self.addr, piece = done.index, "piece downloaded");

            if first {
                let _ = self
                    .events
                    .send(SessionEvent::PieceDownloaded {
                        addr: self.addr,
                        index: done.index,
                    })
                    .await;
            }

            self.begin_next_piece(stream).await?;
        }

        Ok(())
    }
}
