use crate::bencode::BencodeError;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("unsupported tracker url: {0}")]
    UnsupportedUrl(String),

    #[error("announce request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("tracker returned failure: {0}")]
    Failure(String),

    #[error("invalid tracker response: {0}")]
    InvalidResponse(String),

    #[error("invalid bencode in tracker response: {0}")]
    Bencode(#[from] BencodeError),
}
