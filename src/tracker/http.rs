use super::error::TrackerError;
use super::response::{AnnounceResponse, TrackerEvent, TrackerPeer};
use crate::bencode::{decode, Value};
use crate::metainfo::InfoHash;
use crate::peer::PeerId;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::debug;

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for one announce request.
#[derive(Debug, Clone)]
pub struct Announce {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Option<TrackerEvent>,
}

/// Client for a single HTTP tracker.
pub struct HttpTracker {
    url: String,
    client: reqwest::Client,
}

impl HttpTracker {
    /// Creates a tracker client for `url`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::UnsupportedUrl`] unless the scheme is `http` or
    /// `https`. UDP trackers in particular are not supported.
    pub fn new(url: impl Into<String>) -> Result<Self, TrackerError> {
        let url = url.into();

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::UnsupportedUrl(url));
        }

        let client = reqwest::Client::builder()
            .timeout(ANNOUNCE_TIMEOUT)
            .build()?;

        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends an announce and parses the bencoded response.
    ///
    /// The info hash and peer id are raw bytes, not UTF-8, so their query
    /// parameters are percent-encoded by hand rather than left to a URL
    /// builder that would mangle them.
    pub async fn announce(&self, params: &Announce) -> Result<AnnounceResponse, TrackerError> {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            separator,
            params.info_hash.url_encode(),
            params.peer_id,
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
        );

        if let Some(event) = params.event {
            url.push_str("&event=");
            url.push_str(event.as_str());
        }

        debug!(tracker = %self.url, event = ?params.event, "announcing");

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let response = parse_announce(&body)?;
        debug!(tracker = %self.url, peers = response.peers.len(), "announce ok");
        Ok(response)
    }
}

/// Parses a bencoded announce response body.
///
/// Handles the `failure reason` key, the dictionary-list `peers` format
/// (with `ip`, `port`, and optional `peer id`), and the compact format of
/// packed 6-byte address entries.
pub fn parse_announce(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let value = decode(body)?;
    let dict = value
        .as_dict()
        .ok_or_else(|| TrackerError::InvalidResponse("response is not a dict".into()))?;

    if let Some(reason) = value.get(b"failure reason") {
        let reason = reason
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_else(|| "unknown".into());
        return Err(TrackerError::Failure(reason));
    }

    let interval = value
        .get(b"interval")
        .and_then(Value::as_integer)
        .and_then(|i| u64::try_from(i).ok());

    let peers = match dict.get(b"peers".as_slice()) {
        Some(Value::List(entries)) => parse_peer_dicts(entries)?,
        Some(Value::Bytes(packed)) => parse_compact_peers(packed)?,
        Some(_) => {
            return Err(TrackerError::InvalidResponse(
                "peers is neither a list nor a string".into(),
            ))
        }
        None => Vec::new(),
    };

    Ok(AnnounceResponse { interval, peers })
}

fn parse_peer_dicts(entries: &[Value]) -> Result<Vec<TrackerPeer>, TrackerError> {
    let mut peers = Vec::with_capacity(entries.len());

    for entry in entries {
        let ip = entry
            .get(b"ip")
            .and_then(Value::as_bytes)
            .ok_or_else(|| TrackerError::InvalidResponse("peer entry missing ip".into()))?;
        let port = entry
            .get(b"port")
            .and_then(Value::as_integer)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| TrackerError::InvalidResponse("peer entry missing port".into()))?;

        let ip: IpAddr = std::str::from_utf8(ip)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TrackerError::InvalidResponse("peer entry has invalid ip".into()))?;

        let peer_id = entry
            .get(b"peer id")
            .and_then(Value::as_bytes)
            .and_then(|id| <[u8; 20]>::try_from(id.as_ref()).ok());

        peers.push(TrackerPeer {
            addr: SocketAddr::new(ip, port),
            peer_id,
        });
    }

    Ok(peers)
}

fn parse_compact_peers(packed: &[u8]) -> Result<Vec<TrackerPeer>, TrackerError> {
    if packed.len() % 6 != 0 {
        return Err(TrackerError::InvalidResponse(
            "compact peers length is not a multiple of 6".into(),
        ));
    }

    let peers = packed
        .chunks_exact(6)
        .map(|entry| {
            let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
            let port = u16::from_be_bytes([entry[4], entry[5]]);
            TrackerPeer {
                addr: SocketAddr::new(IpAddr::V4(ip), port),
                peer_id: None,
            }
        })
        .collect();

    Ok(peers)
}
