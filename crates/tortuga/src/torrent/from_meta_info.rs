use std::net::SocketAddr;

use super::Torrent;
use crate::{metainfo::MetaInfo, peer::PeerId};

impl Torrent {
    /// A torrent for the file described by `meta_info`, to be downloaded
    /// from `peers`.
    pub fn from_meta_info(
        meta_info: &MetaInfo,
        peers: Vec<SocketAddr>,
        peer_id: PeerId,
    ) -> Self {
        Self {
            name: meta_info.info.name.clone(),
            info_hash: meta_info.info_hash.clone(),
            piece_hashes: meta_info.info.piece_hashes(),
            piece_length: meta_info.info.piece_length as usize,
            total_length: meta_info.info.length as usize,
            peers,
            peer_id,
        }
    }
}
