#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("piece storage failed: {0}")]
    Io(#[from] std::io::Error),

    /// Every peer disconnected (or none was usable) while pieces were
    /// still missing. Terminal: retrying needs a fresh announce.
    #[error("all peers exhausted with {missing} pieces still missing")]
    SwarmStalled { missing: usize },
}
