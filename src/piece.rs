//! Piece geometry and shared piece-state accounting.
//!
//! A torrent's payload is divided into fixed-size pieces (the last piece may
//! be shorter), each transferred as a sequence of 16 KiB chunks. [`Layout`]
//! answers the pure geometry questions; [`PieceTable`] is the one structure
//! shared between peer sessions, tracking which pieces are still required,
//! claimed, or done.

mod layout;
mod table;

pub use layout::{Layout, CHUNK_LENGTH};
pub use table::{PieceState, PieceTable};
