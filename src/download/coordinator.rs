use super::error::DownloadError;
use super::storage::PieceStore;
use crate::metainfo::{InfoHash, Metainfo};
use crate::peer::{PeerId, PeerSession, SessionEvent};
use crate::piece::{Layout, PieceTable};
use crate::tracker::TrackerPeer;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Upper bound on concurrently connected peers.
pub const MAX_ACTIVE_PEERS: usize = 3;

/// Coordinates one torrent download across a pool of peers.
///
/// Peers beyond [`MAX_ACTIVE_PEERS`] wait in a pool; whenever an active
/// session disconnects, for any reason, the next pooled peer takes its
/// slot. The download finishes when every piece is marked downloaded, and
/// stalls permanently once no active or pooled peer remains.
pub struct Download {
    info_hash: InfoHash,
    client_id: PeerId,
    layout: Layout,
    table: Arc<PieceTable>,
    store: PieceStore,
    output: PathBuf,
}

impl Download {
    pub fn new(
        metainfo: &Metainfo,
        client_id: PeerId,
        store: PieceStore,
        output: impl Into<PathBuf>,
    ) -> Self {
        let layout = Layout::from_info(&metainfo.info);

        Self {
            info_hash: metainfo.info_hash,
            client_id,
            layout,
            table: Arc::new(PieceTable::new(layout.piece_count())),
            store,
            output: output.into(),
        }
    }

    /// Shared piece table, mainly for progress inspection.
    pub fn table(&self) -> &Arc<PieceTable> {
        &self.table
    }

    /// Runs the download against `peers` until every piece is on disk,
    /// then assembles the output file.
    ///
    /// # Errors
    ///
    /// [`DownloadError::SwarmStalled`] when all peers are exhausted while
    /// pieces are still missing, and any I/O error from assembly.
    pub async fn run(&self, peers: Vec<TrackerPeer>) -> Result<PathBuf, DownloadError> {
        let total = self.layout.piece_count();
        info!(
            pieces = total,
            peers = peers.len(),
            output = %self.output.display(),
            "download starting"
        );

        let (events_tx, mut events_rx) = mpsc::channel::<SessionEvent>(64);
        let mut pool: VecDeque<TrackerPeer> = peers.into();
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();
        let mut active = 0usize;

        while active < MAX_ACTIVE_PEERS {
            let Some(peer) = pool.pop_front() else { break };
            sessions.push(self.spawn_session(peer, events_tx.clone()));
            active += 1;
        }

        while !self.table.all_downloaded() {
            if active == 0 {
                let missing = total - self.table.downloaded_count();
                return Err(DownloadError::SwarmStalled { missing });
            }

            // Sessions never outlive `run`, and we hold a sender, so the
            // channel cannot close here.
            let Some(event) = events_rx.recv().await else { break };

            match event {
                SessionEvent::PieceDownloaded { addr, index } => {
                    info!(
                        piece = index,
                        peer = %addr,
                        downloaded = self.table.downloaded_count(),
                        total,
                        "piece complete"
                    );
                }
                SessionEvent::Disconnected { addr, reason } => {
                    active -= 1;
                    debug!(peer = %addr, ?reason, active, pooled = pool.len(), "peer gone");

                    if let Some(peer) = pool.pop_front() {
                        sessions.push(self.spawn_session(peer, events_tx.clone()));
                        active += 1;
                    }
                }
            }
        }

        // Idle sessions may still be connected; the download is done.
        for session in sessions {
            session.abort();
        }

        self.store.assemble(total, &self.output).await?;
        info!(output = %self.output.display(), "download complete");
        Ok(self.output.clone())
    }

    fn spawn_session(
        &self,
        peer: TrackerPeer,
        events: mpsc::Sender<SessionEvent>,
    ) -> JoinHandle<()> {
        debug!(peer = %peer.addr, "starting session");

        let session = PeerSession::new(
            peer.addr,
            *self.info_hash.as_bytes(),
            self.client_id,
            peer.peer_id,
            Arc::clone(&self.table),
            self.layout,
            self.store.clone(),
            events,
        );

        tokio::spawn(session.run())
    }
}
