//! Announces to HTTP trackers, to get the peers of a torrent.
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

use bendy::{
    decoding::{self, FromBencode, Object, ResultExt},
    encoding::AsString,
};
use reqwest::Client;
use tracing::{debug, info};

use crate::{error::Error, peer::PeerId, torrent::InfoHash};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// An HTTP tracker of a torrent.
#[derive(Debug, Clone)]
pub struct Tracker {
    client: Client,
    announce: String,
}

/// Bencoded body of an announce response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Set when the tracker refused the announce, nothing else is.
    pub failure_reason: Option<String>,
    /// Seconds to wait between announces.
    pub interval: Option<u64>,
    /// Compact peer list, 6 bytes per peer.
    pub peers: Vec<u8>,
}

impl Tracker {
    pub fn new(announce: &str) -> Result<Self, Error> {
        if !announce.starts_with("http://") && !announce.starts_with("https://") {
            return Err(Error::TrackerUrl(announce.to_owned()));
        }

        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self { client, announce: announce.to_owned() })
    }

    /// URL of the announce request, with the binary fields percent-encoded.
    pub fn announce_url(
        &self,
        info_hash: &InfoHash,
        peer_id: &PeerId,
        port: u16,
        left: u64,
    ) -> String {
        // some trackers already have a query string on their announce url
        let sep = if self.announce.contains('?') { '&' } else { '?' };

        format!(
            "{}{sep}info_hash={}&peer_id={}&port={port}&uploaded=0&downloaded=0\
             &compact=1&left={left}",
            self.announce,
            urlencoding::encode_binary(&info_hash.0),
            urlencoding::encode_binary(&peer_id.0),
        )
    }

    /// Announce that we started downloading, `left` is the size of the
    /// torrent. Returns the peers that the tracker knows about.
    pub async fn announce(
        &self,
        info_hash: &InfoHash,
        peer_id: &PeerId,
        port: u16,
        left: u64,
    ) -> Result<Vec<SocketAddr>, Error> {
        let url = self.announce_url(info_hash, peer_id, port, left);
        debug!("announcing to {url}");

        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let peers = parse_announce(&bytes)?;
        info!("tracker returned {} peers", peers.len());

        Ok(peers)
    }
}

/// Peers of a bencoded announce response.
pub fn parse_announce(bytes: &[u8]) -> Result<Vec<SocketAddr>, Error> {
    let res = AnnounceResponse::from_bencode(bytes)?;

    if let Some(reason) = res.failure_reason {
        return Err(Error::TrackerFailure(reason));
    }

    if let Some(interval) = res.interval {
        debug!("announce interval of {interval} seconds");
    }

    parse_compact_peers(&res.peers)
}

/// Each peer is 4 bytes of IPv4 followed by 2 bytes of port, big endian.
pub fn parse_compact_peers(bytes: &[u8]) -> Result<Vec<SocketAddr>, Error> {
    if bytes.len() % 6 != 0 {
        return Err(Error::TrackerCompactPeerList);
    }

    let peers = bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::V4(SocketAddrV4::new(ip, port))
        })
        .collect();

    Ok(peers)
}

impl FromBencode for AnnounceResponse {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut res = AnnounceResponse::default();

        let mut dict_dec = object.try_into_dictionary()?;
        while let Some(pair) = dict_dec.next_pair()? {
            match pair {
                (b"failure reason", value) => {
                    res.failure_reason = String::decode_bencode_object(value)
                        .context("failure reason")
                        .map(Some)?;
                }
                (b"interval", value) => {
                    res.interval = u64::decode_bencode_object(value)
                        .context("interval")
                        .map(Some)?;
                }
                (b"peers", value) => {
                    res.peers = AsString::decode_bencode_object(value)
                        .context("peers")
                        .map(|bytes| bytes.0)?;
                }
                _ => {}
            }
        }

        Ok(res)
    }
}
