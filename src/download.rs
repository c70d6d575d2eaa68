//! Swarm coordination: drive peer sessions until every piece is on disk.
//!
//! A [`Download`] fans a tracker's peer list out to at most
//! [`MAX_ACTIVE_PEERS`] concurrent [`PeerSession`]s, all sharing one piece
//! table. Sessions that fail are replaced from the remaining pool; when the
//! last piece lands, the per-piece files are assembled into the output file.
//!
//! [`PeerSession`]: crate::peer::PeerSession

mod coordinator;
mod error;
mod storage;

pub use coordinator::{Download, MAX_ACTIVE_PEERS};
pub use error::DownloadError;
pub use storage::PieceStore;

#[cfg(test)]
mod tests;
