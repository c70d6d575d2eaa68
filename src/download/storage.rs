use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// On-disk staging area for downloaded pieces.
///
/// Each completed piece is written to its own file named after the piece
/// index, so an interrupted download leaves no partially-written output
/// file. [`assemble`] concatenates them in index order into the final file
/// and removes the staging files.
///
/// [`assemble`]: PieceStore::assemble
#[derive(Debug, Clone)]
pub struct PieceStore {
    dir: PathBuf,
}

impl PieceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn piece_path(&self, index: usize) -> PathBuf {
        self.dir.join(index.to_string())
    }

    /// Writes a completed piece to its staging file.
    pub async fn write_piece(&self, index: usize, data: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.piece_path(index), data).await?;
        debug!(piece = index, bytes = data.len(), "piece written");
        Ok(())
    }

    /// Reads a staged piece back.
    pub async fn read_piece(&self, index: usize) -> io::Result<Vec<u8>> {
        fs::read(self.piece_path(index)).await
    }

    /// Concatenates pieces `0..piece_count` into `output` and removes the
    /// staging files.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::NotFound`] if any piece is missing, in
    /// which case nothing is cleaned up.
    pub async fn assemble(&self, piece_count: usize, output: &Path) -> io::Result<()> {
        let mut file = fs::File::create(output).await?;

        for index in 0..piece_count {
            let piece = self.read_piece(index).await?;
            file.write_all(&piece).await?;
        }

        file.flush().await?;

        for index in 0..piece_count {
            fs::remove_file(self.piece_path(index)).await?;
        }
        // The staging dir is only gone if nothing else was put in it.
        let _ = fs::remove_dir(&self.dir).await;

        debug!(pieces = piece_count, output = %output.display(), "assembled");
        Ok(())
    }
}
