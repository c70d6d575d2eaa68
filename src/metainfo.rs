//! Torrent metainfo parsing.
//!
//! A `.torrent` file is a bencoded dictionary with an `announce` URL and an
//! `info` dictionary describing the payload. The SHA-1 hash of the bencoded
//! `info` dictionary (the info hash) identifies the torrent in handshakes
//! and tracker announces.
//!
//! Only single-file torrents are supported; multi-file layouts are rejected
//! at parse time.

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{Info, Metainfo};
