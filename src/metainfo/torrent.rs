use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode};
use bytes::Bytes;
use std::path::Path;

/// A parsed torrent file.
///
/// # Examples
///
/// ```no_run
/// use minnow::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = Metainfo::from_bytes(&data)?;
///
/// println!("Torrent: {}", metainfo.info.name);
/// println!("Size: {} bytes", metainfo.info.total_length());
/// println!("Info hash: {}", metainfo.info_hash);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary describing the payload.
    pub info: Info,
    /// SHA-1 of the bencoded info dictionary.
    pub info_hash: InfoHash,
    /// Tracker announce URL.
    pub announce: String,
    raw_info: Bytes,
}

/// The info dictionary from a single-file torrent.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the downloaded file.
    pub name: String,
    /// Number of bytes per piece (except possibly the last piece).
    pub piece_length: u64,
    /// SHA-1 hash of each piece (20 bytes each).
    pub pieces: Vec<[u8; 20]>,
    total_length: u64,
}

impl Info {
    /// Number of bytes per piece.
    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    /// Number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Total payload size in bytes.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid bencode, a required field
    /// (`announce`, `info`, `name`, `piece length`, `pieces`, `length`) is
    /// missing or malformed, or the torrent describes multiple files.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let announce = dict
            .get(b"announce".as_slice())
            .and_then(|v| v.as_str())
            .ok_or(MetainfoError::MissingField("announce"))?
            .to_string();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;

        let info_dict = info_value
            .as_dict()
            .ok_or(MetainfoError::InvalidField("info"))?;

        // Re-encode the info dict; BTreeMap iteration restores canonical
        // key order, so the hash matches the original bytes.
        let raw_info = Bytes::from(encode(info_value)?);
        let info_hash = InfoHash::from_info_bytes(&raw_info);

        let name = info_dict
            .get(b"name".as_slice())
            .and_then(|v| v.as_str())
            .ok_or(MetainfoError::MissingField("name"))?
            .to_string();

        let piece_length = info_dict
            .get(b"piece length".as_slice())
            .and_then(|v| v.as_integer())
            .filter(|&n| n > 0)
            .ok_or(MetainfoError::MissingField("piece length"))? as u64;

        let pieces_bytes = info_dict
            .get(b"pieces".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or(MetainfoError::MissingField("pieces"))?;

        if pieces_bytes.len() % 20 != 0 {
            return Err(MetainfoError::InvalidField("pieces"));
        }

        let pieces: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(chunk);
                arr
            })
            .collect();

        if info_dict.get(b"files".as_slice()).is_some() {
            return Err(MetainfoError::MultiFile);
        }

        let total_length = info_dict
            .get(b"length".as_slice())
            .and_then(|v| v.as_integer())
            .filter(|&n| n >= 0)
            .ok_or(MetainfoError::MissingField("length"))? as u64;

        Ok(Self {
            info: Info {
                name,
                piece_length,
                pieces,
                total_length,
            },
            info_hash,
            announce,
            raw_info,
        })
    }

    /// Reads and parses a torrent file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MetainfoError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Returns the raw bencoded info dictionary.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }
}
