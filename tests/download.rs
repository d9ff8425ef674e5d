//! End-to-end downloads against in-process stub peers and a one-shot
//! stub HTTP tracker, exercising the whole pipeline: metainfo parse,
//! announce, handshake, bitfield, pipelined block requests, hash
//! verification and positional writes.

use boring::sha::Sha1;

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use remora::error::Error;
use remora::handshake::{Handshake, HANDSHAKE_LEN};
use remora::message::Message;
use remora::tracker;
use remora::Torrent;

const PIECE_LENGTH: usize = 16384;

/// Deterministic 40 KiB payload: three pieces, the last one short.
fn sample_content() -> Vec<u8> {
    (0..PIECE_LENGTH * 2 + PIECE_LENGTH / 2)
        .map(|i| (i % 251) as u8)
        .collect()
}

fn sha1(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finish()
}

/// Bencode a single-file metainfo by hand, keys in canonical order.
fn bencode_metainfo(announce: &str, name: &str, content: &[u8]) -> Vec<u8> {
    let pieces: Vec<u8> = content
        .chunks(PIECE_LENGTH)
        .flat_map(|piece| sha1(piece))
        .collect();

    let mut buf = Vec::new();
    buf.extend_from_slice(b"d");
    buf.extend_from_slice(format!("8:announce{}:{}", announce.len(), announce).as_bytes());
    buf.extend_from_slice(b"4:infod");
    buf.extend_from_slice(format!("6:lengthi{}e", content.len()).as_bytes());
    buf.extend_from_slice(format!("4:name{}:{}", name.len(), name).as_bytes());
    buf.extend_from_slice(format!("12:piece lengthi{}e", PIECE_LENGTH).as_bytes());
    buf.extend_from_slice(format!("6:pieces{}:", pieces.len()).as_bytes());
    buf.extend_from_slice(&pieces);
    buf.extend_from_slice(b"ee");

    buf
}

/// Serve one peer connection: echo the handshake, advertise every
/// piece, unchoke, then answer block requests from `content` until the
/// downloader hangs up.
fn spawn_stub_peer(
    listener: TcpListener,
    content: Vec<u8>,
    choke_first: bool,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();

        let mut buf = [0; HANDSHAKE_LEN];
        conn.read_exact(&mut buf).unwrap();
        let received = Handshake::parse(&buf).unwrap();

        let reply = Handshake::new(received.info_hash, *b"-ST0001-aaaabbbbcccc");
        conn.write_all(&reply.serialize()).unwrap();

        let n_pieces = content.len().div_ceil(PIECE_LENGTH);
        let bitfield = vec![0xFF; n_pieces.div_ceil(8)];
        conn.write_all(&Message::Bitfield(bitfield).serialize()).unwrap();

        if choke_first {
            conn.write_all(&Message::Choke.serialize()).unwrap();
        }
        conn.write_all(&Message::Unchoke.serialize()).unwrap();

        serve_blocks(&mut conn, &content);
    })
}

fn serve_blocks(conn: &mut TcpStream, content: &[u8]) {
    loop {
        let mut len_buf = [0; 4];
        if conn.read_exact(&mut len_buf).is_err() {
            return; // downloader is done
        }
        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 {
            continue;
        }

        let mut payload = vec![0; frame_len];
        if conn.read_exact(&mut payload).is_err() {
            return;
        }

        if let Ok(Message::Request {
            index,
            begin,
            length,
        }) = Message::parse(&payload)
        {
            let start = index as usize * PIECE_LENGTH + begin as usize;
            let block = content[start..start + length as usize].to_vec();
            let piece = Message::Piece {
                index,
                begin,
                block,
            };
            if conn.write_all(&piece.serialize()).is_err() {
                return;
            }
        }
    }
}

/// Answer exactly one HTTP GET with a 200 and the given bencoded body.
fn spawn_stub_tracker(listener: TcpListener, body: Vec<u8>) -> JoinHandle<()> {
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();

        let mut request = vec![0; 4096];
        let mut total = 0;
        loop {
            let n = conn.read(&mut request[total..]).unwrap();
            total += n;
            if n == 0 || request[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        conn.write_all(head.as_bytes()).unwrap();
        conn.write_all(&body).unwrap();
    })
}

fn compact_peer_list(ports: &[u16]) -> Vec<u8> {
    let mut records = Vec::new();
    for port in ports {
        records.extend_from_slice(&[127, 0, 0, 1]);
        records.extend_from_slice(&port.to_be_bytes());
    }
    records
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("remora-e2e-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn download_completes_against_stub_peers() {
    let content = sample_content();

    // two stub peers, the second one opens with a choke
    let peer_listeners: Vec<TcpListener> = (0..2)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let peer_ports: Vec<u16> = peer_listeners
        .iter()
        .map(|l| l.local_addr().unwrap().port())
        .collect();
    // not joined: with a single-core pool only one stub ever accepts
    for (i, listener) in peer_listeners.into_iter().enumerate() {
        let _ = spawn_stub_peer(listener, content.clone(), i == 1);
    }

    // one-shot tracker pointing at the stub peers
    let tracker_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let tracker_port = tracker_listener.local_addr().unwrap().port();
    let records = compact_peer_list(&peer_ports);
    let mut tracker_body = format!("d8:intervali900e5:peers{}:", records.len()).into_bytes();
    tracker_body.extend_from_slice(&records);
    tracker_body.push(b'e');
    let tracker_stub = spawn_stub_tracker(tracker_listener, tracker_body);

    // a real .torrent file on disk
    let dir = scratch_dir("complete");
    let announce = format!("http://127.0.0.1:{}/announce", tracker_port);
    let torrent_path = dir.join("sample.torrent");
    fs::write(&torrent_path, bencode_metainfo(&announce, "sample.bin", &content)).unwrap();

    let torrent = Torrent::open(&torrent_path).unwrap();
    assert_eq!(torrent.piece_count(), 3);
    assert_eq!(torrent.total_size(), content.len() as u64);

    let out_path = dir.join(torrent.name());
    torrent.download(&out_path).unwrap();

    let downloaded = fs::read(&out_path).unwrap();
    assert_eq!(downloaded.len(), content.len());
    assert_eq!(sha1(&downloaded), sha1(&content));
    assert_eq!(downloaded, content);

    tracker_stub.join().unwrap();
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn download_refuses_to_overwrite() {
    let content = sample_content();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let stub = spawn_stub_peer(listener, content.clone(), false);

    let dir = scratch_dir("overwrite");
    let torrent_bytes = bencode_metainfo("http://unused.local/announce", "sample.bin", &content);
    let torrent = Torrent::from_bytes(&torrent_bytes).unwrap();

    let out_path = dir.join("sample.bin");
    fs::write(&out_path, b"already here").unwrap();

    let peers = remora::peer::from_compact(&compact_peer_list(&[port])).unwrap();
    let err = torrent.download_from(peers, &out_path).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(fs::read(&out_path).unwrap(), b"already here");

    drop(stub); // never connected
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn announce_decodes_stub_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let records = compact_peer_list(&[6881, 6882]);
    let mut body = format!("d8:intervali1800e5:peers{}:", records.len()).into_bytes();
    body.extend_from_slice(&records);
    body.push(b'e');
    let stub = spawn_stub_tracker(listener, body);

    let url = format!("http://127.0.0.1:{}/announce", port);
    let peers = tracker::announce(&url, &[1; 20], b"-RM0010-abcdefghijkl", 6881, 1000).unwrap();

    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].to_string(), "127.0.0.1:6881");
    assert_eq!(peers[1].to_string(), "127.0.0.1:6882");

    stub.join().unwrap();
}

#[test]
fn announce_surfaces_failure_reason() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let body = b"d14:failure reason22:unregistered info hashe".to_vec();
    let stub = spawn_stub_tracker(listener, body);

    let url = format!("http://127.0.0.1:{}/announce", port);
    let err = tracker::announce(&url, &[1; 20], b"-RM0010-abcdefghijkl", 6881, 1000).unwrap_err();

    match err {
        Error::TrackerRejected(reason) => assert_eq!(reason, "unregistered info hash"),
        other => panic!("expected TrackerRejected, got {:?}", other),
    }

    stub.join().unwrap();
}
