use super::*;
use crate::metainfo::Metainfo;
use crate::peer::{Handshake, Message, PeerId, HANDSHAKE_LEN};
use crate::tracker::TrackerPeer;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn piece_store_round_trip_and_assemble() {
    let dir = tempfile::tempdir().unwrap();
    let store = PieceStore::new(dir.path().join("pieces"));

    store.write_piece(1, b"world").await.unwrap();
    store.write_piece(0, b"hello ").await.unwrap();
    assert_eq!(store.read_piece(0).await.unwrap(), b"hello ");

    let output = dir.path().join("greeting.txt");
    store.assemble(2, &output).await.unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"hello world");
    // Staging files are gone after assembly.
    assert!(store.read_piece(0).await.is_err());
    assert!(store.read_piece(1).await.is_err());
}

#[tokio::test]
async fn assemble_fails_on_missing_piece() {
    let dir = tempfile::tempdir().unwrap();
    let store = PieceStore::new(dir.path().join("pieces"));

    store.write_piece(0, b"only the first").await.unwrap();

    let output = dir.path().join("out");
    assert!(store.assemble(2, &output).await.is_err());
    // The staged piece survives a failed assembly.
    assert_eq!(store.read_piece(0).await.unwrap(), b"only the first");
}

/// A parseable single-file torrent: `piece_count` pieces of `piece_length`
/// bytes with `length` total. The piece hashes are zeroed filler.
fn fake_metainfo(piece_length: u64, length: u64, piece_count: usize) -> Metainfo {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce23:http://tracker.test/ann4:infod");
    data.extend_from_slice(format!("6:lengthi{}e", length).as_bytes());
    data.extend_from_slice(b"4:name8:file.bin");
    data.extend_from_slice(format!("12:piece lengthi{}e", piece_length).as_bytes());
    data.extend_from_slice(format!("6:pieces{}:", piece_count * 20).as_bytes());
    data.extend_from_slice(&vec![0u8; piece_count * 20]);
    data.extend_from_slice(b"ee");
    Metainfo::from_bytes(&data).unwrap()
}

#[tokio::test]
async fn stalls_without_peers() {
    let dir = tempfile::tempdir().unwrap();
    let metainfo = fake_metainfo(16384, 16384, 1);
    let download = Download::new(
        &metainfo,
        PeerId::generate(),
        PieceStore::new(dir.path().join("pieces")),
        dir.path().join("out"),
    );

    match download.run(Vec::new()).await {
        Err(DownloadError::SwarmStalled { missing }) => assert_eq!(missing, 1),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn stalls_when_every_peer_refuses() {
    // Bind and drop to get addresses nothing is listening on.
    let dead_peer = || async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        TrackerPeer {
            addr: listener.local_addr().unwrap(),
            peer_id: None,
        }
    };
    let peers = vec![dead_peer().await, dead_peer().await];

    let dir = tempfile::tempdir().unwrap();
    let metainfo = fake_metainfo(16384, 20000, 2);
    let download = Download::new(
        &metainfo,
        PeerId::generate(),
        PieceStore::new(dir.path().join("pieces")),
        dir.path().join("out"),
    );

    match download.run(peers).await {
        Err(DownloadError::SwarmStalled { missing }) => assert_eq!(missing, 2),
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Scripted seeder for [`downloads_and_assembles_from_fake_peer`]: serves
/// the whole payload as a single one-chunk piece, then closes.
async fn serve_single_piece(listener: TcpListener, info_hash: [u8; 20], payload: Vec<u8>) {
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut buf = [0u8; HANDSHAKE_LEN];
    socket.read_exact(&mut buf).await.unwrap();
    assert_eq!(Handshake::decode(&buf).unwrap().info_hash, info_hash);

    let reply = Handshake::new(info_hash, *b"-FK0001-000000000000");
    socket.write_all(&reply.encode()).await.unwrap();

    let bitfield = Message::Bitfield(Bytes::from_static(&[0x80]));
    socket.write_all(&bitfield.encode()).await.unwrap();

    let mut interested = [0u8; 5];
    socket.read_exact(&mut interested).await.unwrap();

    socket.write_all(&Message::Unchoke.encode()).await.unwrap();

    let mut request = [0u8; 17];
    socket.read_exact(&mut request).await.unwrap();

    let piece = Message::Piece {
        index: 0,
        begin: 0,
        data: payload.into(),
    };
    socket.write_all(&piece.encode()).await.unwrap();
}

#[tokio::test]
async fn downloads_and_assembles_from_fake_peer() {
    let payload = vec![0x5A; 4321];
    let metainfo = fake_metainfo(16384, payload.len() as u64, 1);
    let info_hash = *metainfo.info_hash.as_bytes();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer = TrackerPeer {
        addr: listener.local_addr().unwrap(),
        peer_id: None,
    };
    let seeder = tokio::spawn(serve_single_piece(listener, info_hash, payload.clone()));

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join(&metainfo.info.name);
    let download = Download::new(
        &metainfo,
        PeerId::generate(),
        PieceStore::new(dir.path().join("pieces")),
        &output,
    );

    let finished = download.run(vec![peer]).await.unwrap();
    seeder.await.unwrap();

    assert_eq!(finished, output);
    assert_eq!(std::fs::read(&output).unwrap(), payload);
    assert!(download.table().all_downloaded());
}
