//! # Tracker Client
//!
//! One-shot HTTP announce: build the GET URL with percent-encoded
//! query parameters, fetch it with a blocking client, decode the
//! bencoded reply into a compact peer list.
//!
//! The `info_hash` and `peer_id` parameters are the raw 20 bytes, not
//! hex; every query value is percent-encoded with the RFC 3986
//! unreserved set (`A-Z a-z 0-9 . - _ ~` pass through, everything else
//! becomes `%XX` uppercase hex).

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_bencode::de;
use serde_bytes::ByteBuf;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::peer::{self, Peer};

/// Everything that is not RFC 3986 unreserved gets escaped.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const ANNOUNCE_TIMEOUT_SECS: u64 = 15;

/// Bencoded announce reply.
///
/// `interval` is advisory and unused: the engine announces once per
/// download. A reply that carries `failure reason` usually carries
/// nothing else.
#[derive(Debug, Deserialize)]
struct BencodeTrackerResponse {
    #[serde(default)]
    interval: Option<u32>,
    #[serde(default)]
    peers: Option<ByteBuf>,
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
}

/// Build the announce URL for one download.
pub fn build_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> String {
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
        percent_encode(info_hash, QUERY),
        percent_encode(peer_id, QUERY),
        port,
        left
    );

    let separator = if announce.contains('?') { '&' } else { '?' };

    format!("{}{}{}", announce, separator, query)
}

/// Announce to the tracker and decode the peer list.
pub fn announce(
    announce_url: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> Result<Vec<Peer>> {
    let url = build_url(announce_url, info_hash, peer_id, port, left);
    info!("Announcing to tracker {}", announce_url);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(ANNOUNCE_TIMEOUT_SECS))
        .build()?;

    let response = client.get(&url).send()?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(Error::TrackerRejected(format!(
            "announce returned status {}",
            status
        )));
    }

    let body = response.bytes()?;
    let reply = de::from_bytes::<BencodeTrackerResponse>(&body)?;

    if let Some(reason) = reply.failure_reason {
        return Err(Error::TrackerRejected(reason));
    }
    if let Some(interval) = reply.interval {
        debug!("Tracker suggests a {}s announce interval", interval);
    }

    let peers = match reply.peers {
        Some(bytes) => peer::from_compact(&bytes)?,
        None => Vec::new(),
    };
    info!("Tracker returned {} peers", peers.len());

    Ok(peers)
}
