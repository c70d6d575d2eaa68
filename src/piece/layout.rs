use crate::metainfo::Info;

/// Size of a piece chunk (block) on the wire, in bytes.
pub const CHUNK_LENGTH: u32 = 16384;

/// Piece geometry for one torrent.
///
/// Pure functions of the piece length, total payload length, and piece
/// count. Every piece has the configured length except the last, which
/// carries the remainder when the total is not an exact multiple.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    piece_length: u64,
    total_length: u64,
    piece_count: usize,
}

impl Layout {
    pub fn new(piece_length: u64, total_length: u64, piece_count: usize) -> Self {
        Self {
            piece_length,
            total_length,
            piece_count,
        }
    }

    pub fn from_info(info: &Info) -> Self {
        Self::new(info.piece_length(), info.total_length(), info.piece_count())
    }

    /// Number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Byte length of the piece at `index`.
    pub fn piece_length_at(&self, index: usize) -> u64 {
        let remainder = self.total_length % self.piece_length;
        if index == self.piece_count - 1 && remainder != 0 {
            remainder
        } else {
            self.piece_length
        }
    }

    /// Number of chunks needed to transfer the piece at `index`.
    pub fn chunks_needed(&self, index: usize) -> u32 {
        self.piece_length_at(index).div_ceil(CHUNK_LENGTH as u64) as u32
    }

    /// Byte length of chunk number `chunk` within the piece at `index`.
    ///
    /// All chunks are [`CHUNK_LENGTH`] bytes except the final chunk of a
    /// piece, which carries whatever remains.
    pub fn chunk_length_at(&self, index: usize, chunk: u32) -> u32 {
        let offset = chunk as u64 * CHUNK_LENGTH as u64;
        let remaining = self.piece_length_at(index).saturating_sub(offset);
        remaining.min(CHUNK_LENGTH as u64) as u32
    }
}
