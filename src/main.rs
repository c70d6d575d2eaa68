use minnow::download::{Download, PieceStore};
use minnow::metainfo::Metainfo;
use minnow::peer::PeerId;
use minnow::tracker::{Announce, HttpTracker, TrackerEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LISTEN_PORT: u16 = 6881;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(output) => {
            println!("{}", output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let torrent = args
        .next()
        .ok_or("usage: minnow <torrent-file> [output-dir]")?;
    let out_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let metainfo = Metainfo::from_file(&torrent)?;
    info!(
        name = %metainfo.info.name,
        size = metainfo.info.total_length(),
        pieces = metainfo.info.piece_count(),
        info_hash = %metainfo.info_hash,
        "torrent loaded"
    );

    let client_id = PeerId::generate();
    let tracker = HttpTracker::new(metainfo.announce.clone())?;
    let response = tracker
        .announce(&Announce {
            info_hash: metainfo.info_hash,
            peer_id: client_id,
            port: LISTEN_PORT,
            uploaded: 0,
            downloaded: 0,
            left: metainfo.info.total_length(),
            event: Some(TrackerEvent::Started),
        })
        .await?;
    info!(peers = response.peers.len(), "announce ok");

    let staging = std::env::temp_dir().join(format!("minnow-{}", metainfo.info_hash));
    let output = out_dir.join(&metainfo.info.name);

    let download = Download::new(&metainfo, client_id, PieceStore::new(staging), &output);
    let finished = download.run(response.peers).await?;

    Ok(finished)
}
