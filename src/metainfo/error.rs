use thiserror::Error;

use crate::bencode::BencodeError;

/// Errors that can occur when parsing torrent files.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The torrent file contains invalid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A required field is missing from the torrent file.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The torrent describes multiple files, which is not supported.
    #[error("multi-file torrents are not supported")]
    MultiFile,

    /// An I/O error occurred while reading the torrent file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
