//! HTTP tracker announces.
//!
//! A tracker is the rendezvous point of a swarm: the client announces
//! itself over HTTP and receives the addresses of other peers in a
//! bencoded response. Both the dictionary-list and compact peer formats
//! are supported.

mod error;
mod http;
mod response;

pub use error::TrackerError;
pub use http::{parse_announce, Announce, HttpTracker};
pub use response::{AnnounceResponse, TrackerEvent, TrackerPeer};
