//! minnow - a minimal BitTorrent download client
//!
//! Downloads a single-file torrent: parse the metainfo, announce to the
//! HTTP tracker, then fetch pieces concurrently from a handful of peers
//! over the peer wire protocol and assemble them into the output file.
//!
//! # Modules
//!
//! - [`bencode`] - Bencode encoding/decoding
//! - [`metainfo`] - Torrent file parsing and info hashing
//! - [`piece`] - Piece geometry and the shared piece-state table
//! - [`peer`] - Peer wire protocol: messages, framing, sessions
//! - [`tracker`] - HTTP tracker announces
//! - [`download`] - Swarm coordination and piece assembly

pub mod bencode;
pub mod download;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod tracker;

pub use bencode::{decode, decode_prefix, encode, BencodeError, Value};
pub use download::{Download, DownloadError, PieceStore, MAX_ACTIVE_PEERS};
pub use metainfo::{Info, InfoHash, Metainfo, MetainfoError};
pub use peer::{
    Bitfield, Frame, Framer, Handshake, Message, PeerError, PeerId, PeerSession, SessionEvent,
    SessionState,
};
pub use piece::{Layout, PieceState, PieceTable, CHUNK_LENGTH};
pub use tracker::{Announce, AnnounceResponse, HttpTracker, TrackerError, TrackerEvent, TrackerPeer};
