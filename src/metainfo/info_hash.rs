use sha1::{Digest, Sha1};
use std::fmt;

/// The SHA-1 hash of a torrent's bencoded info dictionary.
///
/// The info hash identifies a torrent everywhere: it is sent in the wire
/// handshake and, percent-encoded, in the tracker announce query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Computes the info hash from the bencoded info dictionary bytes.
    pub fn from_info_bytes(raw_info: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(raw_info);
        Self(hasher.finalize().into())
    }

    /// Wraps raw hash bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 20 hash bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Percent-encodes the hash for use in a tracker query string.
    ///
    /// Unreserved characters (`A-Z a-z 0-9 - _ . ~`) pass through; every
    /// other byte becomes `%XX`.
    ///
    /// # Examples
    ///
    /// ```
    /// use minnow::metainfo::InfoHash;
    ///
    /// let mut raw = [0u8; 20];
    /// raw[0] = b'a';
    /// raw[1] = 0xff;
    /// let hash = InfoHash::from_bytes(raw);
    /// assert!(hash.url_encode().starts_with("a%ff%00"));
    /// ```
    pub fn url_encode(&self) -> String {
        let mut encoded = String::with_capacity(60);

        for &byte in &self.0 {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
                encoded.push(byte as char);
            } else {
                encoded.push_str(&format!("%{:02x}", byte));
            }
        }

        encoded
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
