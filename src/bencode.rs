//! Bencode encoding and decoding.
//!
//! Bencode is the serialization format BitTorrent uses for `.torrent` files
//! and tracker responses. It has four data types:
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` → 42 |
//! | Byte String | `<length>:<data>` | `4:spam` → "spam" |
//! | List | `l<items>e` | `l4:spami42ee` → ["spam", 42] |
//! | Dictionary | `d<key><value>...e` | `d3:foo3:bare` → {"foo": "bar"} |
//!
//! # Examples
//!
//! ```
//! use minnow::bencode::{decode, decode_prefix, encode};
//!
//! let value = decode(b"d4:spaml1:a1:bee").unwrap();
//! let list = value.get(b"spam").and_then(|v| v.as_list()).unwrap();
//! assert_eq!(list[0].as_str(), Some("a"));
//!
//! // Streams may carry trailing data; `decode_prefix` returns the remainder.
//! let (value, rest) = decode_prefix(b"i42etrailing").unwrap();
//! assert_eq!(value.as_integer(), Some(42));
//! assert_eq!(rest, b"trailing");
//!
//! let encoded = encode(&value).unwrap();
//! assert_eq!(encoded, b"i42e");
//! ```
//!
//! # Error Handling
//!
//! Decoding never partially applies: any malformed input fails the whole
//! decode with a [`BencodeError`], e.g. [`BencodeError::UnexpectedEof`] for
//! truncated input or [`BencodeError::InvalidDictKey`] when a dictionary key
//! is not a byte string.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_prefix};
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;
