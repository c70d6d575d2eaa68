use crate::peer::Bitfield;
use parking_lot::Mutex;

/// Download state of a single piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
    /// Not yet downloaded and not claimed by any session.
    Required,
    /// Claimed by a session that is currently fetching its chunks.
    Downloading,
    /// All chunks written to disk.
    Downloaded,
}

#[derive(Debug)]
struct TableInner {
    states: Vec<PieceState>,
    downloaded: usize,
}

/// The piece-state table shared by all peer sessions of a download.
///
/// Selecting the next required piece and marking it `Downloading` is a
/// single critical section, so two sessions can never claim the same piece.
/// Completion is tracked with an incremental counter rather than a scan.
#[derive(Debug)]
pub struct PieceTable {
    inner: Mutex<TableInner>,
    piece_count: usize,
}

impl PieceTable {
    /// Creates a table with every piece `Required`.
    pub fn new(piece_count: usize) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                states: vec![PieceState::Required; piece_count],
                downloaded: 0,
            }),
            piece_count,
        }
    }

    /// Atomically claims the lowest-indexed `Required` piece the peer
    /// advertises, marking it `Downloading`.
    pub fn claim_next(&self, bitfield: &Bitfield) -> Option<usize> {
        let mut inner = self.inner.lock();

        for (index, state) in inner.states.iter_mut().enumerate() {
            if *state == PieceState::Required && bitfield.has(index) {
                *state = PieceState::Downloading;
                return Some(index);
            }
        }

        None
    }

    /// Requeues a piece whose download failed, reverting `Downloading` to
    /// `Required` so another session can claim it.
    pub fn release(&self, index: usize) {
        let mut inner = self.inner.lock();
        if inner.states.get(index) == Some(&PieceState::Downloading) {
            inner.states[index] = PieceState::Required;
        }
    }

    /// Marks a piece `Downloaded`. Returns `true` only on the first
    /// transition for that piece.
    pub fn mark_downloaded(&self, index: usize) -> bool {
        let mut inner = self.inner.lock();
        match inner.states.get(index) {
            Some(PieceState::Downloaded) | None => false,
            Some(_) => {
                inner.states[index] = PieceState::Downloaded;
                inner.downloaded += 1;
                true
            }
        }
    }

    /// Returns `true` if the peer advertises at least one piece that is
    /// still `Required`.
    pub fn has_wanted(&self, bitfield: &Bitfield) -> bool {
        let inner = self.inner.lock();
        inner
            .states
            .iter()
            .enumerate()
            .any(|(index, state)| *state == PieceState::Required && bitfield.has(index))
    }

    /// Returns `true` once every piece is `Downloaded`.
    pub fn all_downloaded(&self) -> bool {
        self.inner.lock().downloaded == self.piece_count
    }

    /// Number of pieces currently `Downloaded`.
    pub fn downloaded_count(&self) -> usize {
        self.inner.lock().downloaded
    }

    /// Total number of pieces.
    pub fn len(&self) -> usize {
        self.piece_count
    }

    pub fn is_empty(&self) -> bool {
        self.piece_count == 0
    }

    /// Current state of the piece at `index`.
    pub fn state(&self, index: usize) -> Option<PieceState> {
        self.inner.lock().states.get(index).copied()
    }
}
