use super::*;
use crate::download::PieceStore;
use crate::piece::{Layout, PieceState, PieceTable, CHUNK_LENGTH};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn sample_handshake() -> Handshake {
    Handshake::new([0xAA; 20], *b"-MN0001-abcdefghijkl")
}

#[test]
fn handshake_round_trip() {
    let handshake = sample_handshake();
    let encoded = handshake.encode();
    assert_eq!(encoded.len(), HANDSHAKE_LEN);
    assert_eq!(encoded[0], 19);
    assert_eq!(&encoded[1..20], PROTOCOL);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, handshake.info_hash);
    assert_eq!(decoded.peer_id, handshake.peer_id);
    assert_eq!(decoded.reserved, [0u8; 8]);
}

#[test]
fn handshake_rejects_wrong_protocol() {
    let mut encoded = sample_handshake().encode().to_vec();
    encoded[5] ^= 0xFF;
    assert!(matches!(
        Handshake::decode(&encoded),
        Err(PeerError::InvalidHandshake)
    ));
}

#[test]
fn message_round_trips() {
    let messages = [
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0b1010_0000])),
        Message::Request {
            index: 3,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 16384,
            data: Bytes::from_static(b"chunk payload"),
        },
        Message::Cancel {
            index: 3,
            begin: 0,
            length: 16384,
        },
    ];

    for message in messages {
        let encoded = message.encode();
        let decoded = Message::decode(encoded).unwrap();
        match (&message, &decoded) {
            (Message::KeepAlive, Message::KeepAlive) => {}
            (Message::Choke, Message::Choke) => {}
            (Message::Unchoke, Message::Unchoke) => {}
            (Message::Interested, Message::Interested) => {}
            (Message::NotInterested, Message::NotInterested) => {}
            (Message::Have { piece: a }, Message::Have { piece: b }) => assert_eq!(a, b),
            (Message::Bitfield(a), Message::Bitfield(b)) => assert_eq!(a, b),
            (
                Message::Request {
                    index: a1,
                    begin: a2,
                    length: a3,
                },
                Message::Request {
                    index: b1,
                    begin: b2,
                    length: b3,
                },
            ) => assert_eq!((a1, a2, a3), (b1, b2, b3)),
            (
                Message::Piece {
                    index: a1,
                    begin: a2,
                    data: a3,
                },
                Message::Piece {
                    index: b1,
                    begin: b2,
                    data: b3,
                },
            ) => assert_eq!((a1, a2, a3), (b1, b2, b3)),
            (
                Message::Cancel {
                    index: a1,
                    begin: a2,
                    length: a3,
                },
                Message::Cancel {
                    index: b1,
                    begin: b2,
                    length: b3,
                },
            ) => assert_eq!((a1, a2, a3), (b1, b2, b3)),
            (sent, received) => panic!("{:?} decoded as {:?}", sent, received),
        }
    }
}

#[test]
fn message_rejects_unknown_id() {
    let frame = Bytes::from_static(&[0, 0, 0, 1, 99]);
    assert!(matches!(
        Message::decode(frame),
        Err(PeerError::InvalidMessageId(99))
    ));
}

#[test]
fn framer_emits_unchoke() {
    let mut framer = Framer::new();
    framer.push(&[0, 0, 0, 1, 1]);

    match framer.next_frame().unwrap() {
        Some(Frame::Message(Message::Unchoke)) => {}
        other => panic!("unexpected frame: {:?}", other),
    }
    assert!(framer.next_frame().unwrap().is_none());
    assert_eq!(framer.buffered(), 0);
}

#[test]
fn framer_output_is_independent_of_chunking() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&sample_handshake().encode());
    stream.extend_from_slice(&Message::Bitfield(Bytes::from_static(&[0xF0])).encode());
    stream.extend_from_slice(&Message::Unchoke.encode());
    stream.extend_from_slice(&Message::KeepAlive.encode());
    stream.extend_from_slice(
        &Message::Piece {
            index: 0,
            begin: 0,
            data: Bytes::from_static(b"data"),
        }
        .encode(),
    );

    // Whole stream at once, byte at a time, and odd-sized chunks must all
    // yield the same frame sequence.
    for chunk_size in [stream.len(), 1, 3, 7] {
        let mut framer = Framer::new();
        let mut frames = Vec::new();

        for chunk in stream.chunks(chunk_size) {
            framer.push(chunk);
            while let Some(frame) = framer.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 5, "chunk_size {}", chunk_size);
        assert!(matches!(frames[0], Frame::Handshake(_)));
        assert!(matches!(frames[1], Frame::Message(Message::Bitfield(_))));
        assert!(matches!(frames[2], Frame::Message(Message::Unchoke)));
        assert!(matches!(frames[3], Frame::Message(Message::KeepAlive)));
        assert!(matches!(frames[4], Frame::Message(Message::Piece { .. })));
        assert_eq!(framer.buffered(), 0);
    }
}

#[test]
fn framer_waits_for_split_handshake() {
    let encoded = sample_handshake().encode();
    let mut framer = Framer::new();

    framer.push(&encoded[..10]);
    assert!(framer.next_frame().unwrap().is_none());

    framer.push(&encoded[10..40]);
    assert!(framer.next_frame().unwrap().is_none());

    framer.push(&encoded[40..]);
    assert!(matches!(
        framer.next_frame().unwrap(),
        Some(Frame::Handshake(_))
    ));
}

#[test]
fn framer_rejects_oversized_length_prefix() {
    let mut framer = Framer::new();
    framer.push(&u32::MAX.to_be_bytes());
    assert!(matches!(
        framer.next_frame(),
        Err(PeerError::FrameTooLarge(_))
    ));
}

#[test]
fn bitfield_indexes_from_high_bit() {
    let bits = Bitfield::from_bytes(Bytes::from_static(&[0b1000_0001, 0b0100_0000]), 10);
    assert!(bits.has(0));
    assert!(bits.has(7));
    assert!(bits.has(9));
    assert!(!bits.has(1));
    assert!(!bits.has(8));
    assert!(!bits.has(10));
    assert_eq!(bits.count_ones(), 3);
}

#[test]
fn bitfield_pads_short_payload_and_clears_spare_bits() {
    let padded = Bitfield::from_bytes(Bytes::new(), 12);
    assert_eq!(padded.as_bytes().len(), 2);
    assert!(padded.is_empty());

    // Spare bits past the piece count are noise and must be dropped.
    let noisy = Bitfield::from_bytes(Bytes::from_static(&[0xFF, 0xFF]), 12);
    assert_eq!(noisy.count_ones(), 12);
    assert!(!noisy.has(12));
}

#[test]
fn bitfield_drops_extra_payload_bytes() {
    // 4 pieces fit in one byte; the two extra noise bytes must not count.
    let noisy = Bitfield::from_bytes(Bytes::from_static(&[0x00, 0xFF, 0xFF]), 4);
    assert_eq!(noisy.as_bytes().len(), 1);
    assert_eq!(noisy.count_ones(), 0);
    assert!(noisy.is_empty());
}

#[test]
fn peer_id_has_client_prefix() {
    let id = PeerId::generate();
    assert_eq!(&id.as_bytes()[..8], b"-MN0001-");
    assert_eq!(id.client_id(), Some("MN0001"));

    let other = PeerId::generate();
    assert_ne!(id.as_bytes(), other.as_bytes());
}

/// A scripted remote peer: handshakes, advertises every piece, unchokes,
/// then answers chunk requests from `piece_data` until all chunks are
/// served, and closes.
async fn serve_fake_peer(
    listener: TcpListener,
    info_hash: [u8; 20],
    layout: Layout,
    piece_data: Vec<Vec<u8>>,
) {
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut buf = [0u8; HANDSHAKE_LEN];
    socket.read_exact(&mut buf).await.unwrap();
    let received = Handshake::decode(&buf).unwrap();
    assert_eq!(received.info_hash, info_hash);

    let reply = Handshake::new(info_hash, *b"-FK0001-000000000000");
    socket.write_all(&reply.encode()).await.unwrap();

    let mut bits = Bitfield::new(layout.piece_count());
    for index in 0..layout.piece_count() {
        bits.set(index);
    }
    let bitfield = Message::Bitfield(Bytes::copy_from_slice(bits.as_bytes()));
    socket.write_all(&bitfield.encode()).await.unwrap();

    let mut interested = [0u8; 5];
    socket.read_exact(&mut interested).await.unwrap();
    assert_eq!(interested, [0, 0, 0, 1, 2]);

    socket.write_all(&Message::Unchoke.encode()).await.unwrap();

    let total_chunks: u32 = (0..layout.piece_count())
        .map(|index| layout.chunks_needed(index))
        .sum();

    for _ in 0..total_chunks {
        let mut request = [0u8; 17];
        socket.read_exact(&mut request).await.unwrap();

        let decoded = Message::decode(Bytes::copy_from_slice(&request)).unwrap();
        let Message::Request {
            index,
            begin,
            length,
        } = decoded
        else {
            panic!("expected request, got {:?}", decoded);
        };

        let piece = &piece_data[index as usize];
        let chunk = piece[begin as usize..(begin + length) as usize].to_vec();
        let response = Message::Piece {
            index,
            begin,
            data: chunk.into(),
        };
        socket.write_all(&response.encode()).await.unwrap();
    }
}

#[tokio::test]
async fn session_downloads_every_piece_from_fake_peer() {
    let info_hash = [7u8; 20];
    let piece_data = vec![
        vec![0xAB; CHUNK_LENGTH as usize + 100],
        vec![0xCD; CHUNK_LENGTH as usize + 100],
        vec![0xEF; 5000],
    ];
    let total_length: u64 = piece_data.iter().map(|p| p.len() as u64).sum();
    let layout = Layout::new(CHUNK_LENGTH as u64 + 100, total_length, piece_data.len());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_fake_peer(
        listener,
        info_hash,
        layout,
        piece_data.clone(),
    ));

    let dir = tempfile::tempdir().unwrap();
    let store = PieceStore::new(dir.path());
    let table = Arc::new(PieceTable::new(layout.piece_count()));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        info_hash,
        PeerId::generate(),
        None,
        Arc::clone(&table),
        layout,
        store.clone(),
        events_tx,
    );
    tokio::spawn(session.run());

    let mut downloaded = Vec::new();
    loop {
        match events_rx.recv().await.unwrap() {
            SessionEvent::PieceDownloaded { index, .. } => downloaded.push(index),
            SessionEvent::Disconnected { reason, .. } => {
                assert_eq!(reason, DisconnectReason::Closed);
                break;
            }
        }
    }
    server.await.unwrap();

    downloaded.sort_unstable();
    assert_eq!(downloaded, vec![0, 1, 2]);
    assert!(table.all_downloaded());
    for (index, expected) in piece_data.iter().enumerate() {
        assert_eq!(table.state(index), Some(PieceState::Downloaded));
        assert_eq!(&store.read_piece(index).await.unwrap(), expected);
    }
}

#[tokio::test]
async fn session_closes_when_peer_has_nothing_wanted() {
    let info_hash = [9u8; 20];
    let layout = Layout::new(CHUNK_LENGTH as u64, CHUNK_LENGTH as u64 * 2, 2);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; HANDSHAKE_LEN];
        socket.read_exact(&mut buf).await.unwrap();

        let reply = Handshake::new(info_hash, *b"-FK0001-000000000000");
        socket.write_all(&reply.encode()).await.unwrap();

        // Empty bitfield: this peer has no pieces at all.
        let bitfield = Message::Bitfield(Bytes::from_static(&[0x00]));
        socket.write_all(&bitfield.encode()).await.unwrap();

        // Hold the socket open; the session must hang up on its own.
        let mut scratch = [0u8; 64];
        let _ = socket.read(&mut scratch).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PieceTable::new(layout.piece_count()));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        info_hash,
        PeerId::generate(),
        None,
        Arc::clone(&table),
        layout,
        PieceStore::new(dir.path()),
        events_tx,
    );
    tokio::spawn(session.run());

    match events_rx.recv().await.unwrap() {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::NothingWanted);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn session_reports_refused_connection() {
    // Bind and drop to get an address nothing is listening on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let layout = Layout::new(CHUNK_LENGTH as u64, CHUNK_LENGTH as u64, 1);
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PieceTable::new(1));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        [1u8; 20],
        PeerId::generate(),
        None,
        table,
        layout,
        PieceStore::new(dir.path()),
        events_tx,
    );
    tokio::spawn(session.run());

    match events_rx.recv().await.unwrap() {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::Refused);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn session_requeues_piece_when_peer_disappears_mid_piece() {
    let info_hash = [3u8; 20];
    let piece_len = CHUNK_LENGTH as u64 * 2;
    let layout = Layout::new(piece_len, piece_len, 1);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; HANDSHAKE_LEN];
        socket.read_exact(&mut buf).await.unwrap();

        let reply = Handshake::new(info_hash, *b"-FK0001-000000000000");
        socket.write_all(&reply.encode()).await.unwrap();

        let bitfield = Message::Bitfield(Bytes::from_static(&[0x80]));
        socket.write_all(&bitfield.encode()).await.unwrap();

        let mut interested = [0u8; 5];
        socket.read_exact(&mut interested).await.unwrap();

        socket.write_all(&Message::Unchoke.encode()).await.unwrap();

        // Serve the first chunk, then vanish with the piece half done.
        let mut request = [0u8; 17];
        socket.read_exact(&mut request).await.unwrap();
        let chunk = Message::Piece {
            index: 0,
            begin: 0,
            data: Bytes::from(vec![0x55; CHUNK_LENGTH as usize]),
        };
        socket.write_all(&chunk.encode()).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PieceTable::new(1));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        info_hash,
        PeerId::generate(),
        None,
        Arc::clone(&table),
        layout,
        PieceStore::new(dir.path()),
        events_tx,
    );
    tokio::spawn(session.run());

    match events_rx.recv().await.unwrap() {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::Closed);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    server.await.unwrap();

    // The half-finished piece must be claimable again.
    assert_eq!(table.state(0), Some(PieceState::Required));
}

#[tokio::test(start_paused = true)]
async fn session_times_out_when_peer_goes_silent_mid_request() {
    let info_hash = [4u8; 20];
    let layout = Layout::new(CHUNK_LENGTH as u64, CHUNK_LENGTH as u64, 1);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; HANDSHAKE_LEN];
        socket.read_exact(&mut buf).await.unwrap();

        let reply = Handshake::new(info_hash, *b"-FK0001-000000000000");
        socket.write_all(&reply.encode()).await.unwrap();

        let bitfield = Message::Bitfield(Bytes::from_static(&[0x80]));
        socket.write_all(&bitfield.encode()).await.unwrap();

        let mut interested = [0u8; 5];
        socket.read_exact(&mut interested).await.unwrap();

        socket.write_all(&Message::Unchoke.encode()).await.unwrap();

        // Accept the request, then never answer it. The socket stays open,
        // so only the chunk deadline can end the session.
        let mut request = [0u8; 17];
        socket.read_exact(&mut request).await.unwrap();
        let mut scratch = [0u8; 64];
        let _ = socket.read(&mut scratch).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PieceTable::new(1));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        info_hash,
        PeerId::generate(),
        None,
        Arc::clone(&table),
        layout,
        PieceStore::new(dir.path()),
        events_tx,
    );
    tokio::spawn(session.run());

    match events_rx.recv().await.unwrap() {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::Timeout);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    server.await.unwrap();

    // The timed-out piece must be claimable again.
    assert_eq!(table.state(0), Some(PieceState::Required));
}

#[tokio::test]
async fn session_closes_on_message_before_handshake() {
    let info_hash = [6u8; 20];
    let layout = Layout::new(CHUNK_LENGTH as u64, CHUNK_LENGTH as u64, 1);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; HANDSHAKE_LEN];
        socket.read_exact(&mut buf).await.unwrap();

        // Skip the handshake reply and jump straight to a wire message.
        socket.write_all(&Message::Unchoke.encode()).await.unwrap();

        let mut scratch = [0u8; 64];
        let _ = socket.read(&mut scratch).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PieceTable::new(1));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        info_hash,
        PeerId::generate(),
        None,
        table,
        layout,
        PieceStore::new(dir.path()),
        events_tx,
    );
    tokio::spawn(session.run());

    match events_rx.recv().await.unwrap() {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::ProtocolViolation);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn session_rejects_chunk_with_wrong_offset() {
    let info_hash = [8u8; 20];
    let layout = Layout::new(CHUNK_LENGTH as u64 * 2, CHUNK_LENGTH as u64 * 2, 1);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; HANDSHAKE_LEN];
        socket.read_exact(&mut buf).await.unwrap();

        let reply = Handshake::new(info_hash, *b"-FK0001-000000000000");
        socket.write_all(&reply.encode()).await.unwrap();

        let bitfield = Message::Bitfield(Bytes::from_static(&[0x80]));
        socket.write_all(&bitfield.encode()).await.unwrap();

        let mut interested = [0u8; 5];
        socket.read_exact(&mut interested).await.unwrap();

        socket.write_all(&Message::Unchoke.encode()).await.unwrap();

        // The session asked for offset 0; answer with the second chunk.
        let mut request = [0u8; 17];
        socket.read_exact(&mut request).await.unwrap();
        let wrong = Message::Piece {
            index: 0,
            begin: CHUNK_LENGTH,
            data: Bytes::from(vec![0x11; CHUNK_LENGTH as usize]),
        };
        socket.write_all(&wrong.encode()).await.unwrap();

        let mut scratch = [0u8; 64];
        let _ = socket.read(&mut scratch).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(PieceTable::new(1));
    let (events_tx, mut events_rx) = mpsc::channel(16);

    let session = PeerSession::new(
        addr,
        info_hash,
        PeerId::generate(),
        None,
        Arc::clone(&table),
        layout,
        PieceStore::new(dir.path()),
        events_tx,
    );
    tokio::spawn(session.run());

    match events_rx.recv().await.unwrap() {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::ProtocolViolation);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    server.await.unwrap();

    // The rejected piece must be claimable again.
    assert_eq!(table.state(0), Some(PieceState::Required));
}
