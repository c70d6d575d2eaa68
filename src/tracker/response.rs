use std::net::SocketAddr;

/// The event field of an announce, from the client's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    Started,
    Stopped,
    Completed,
}

impl TrackerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerEvent::Started => "started",
            TrackerEvent::Stopped => "stopped",
            TrackerEvent::Completed => "completed",
        }
    }
}

/// One peer listed in an announce response.
///
/// The compact format carries no peer id, so it is optional here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerPeer {
    pub addr: SocketAddr,
    pub peer_id: Option<[u8; 20]>,
}

/// A successful announce response.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before re-announcing.
    pub interval: Option<u64>,
    pub peers: Vec<TrackerPeer>,
}
