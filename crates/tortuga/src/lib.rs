//! A library for downloading files over the BitTorrent protocol V1.
//!
//! This is the library behind the `tortuga` client. It speaks the peer wire
//! protocol with many peers at once, pipelines block requests inside each
//! piece, verifies every piece against its SHA-1 hash and assembles the
//! verified pieces into the final file buffer.
//!
//! # Example
//!
//! Parse a torrent, ask the tracker for peers and download the whole file
//! into memory.
//!
//! ```no_run
//! use tortuga::{
//!     config::Config, metainfo::MetaInfo, peer::PeerId, torrent::Torrent,
//!     tracker::Tracker,
//! };
//!
//! # async fn run() -> Result<(), tortuga::error::Error> {
//! let config = Config::load().await?;
//! let meta_info = MetaInfo::from_file("debian.iso.torrent").await?;
//! let peer_id = PeerId::generate();
//!
//! let tracker = Tracker::new(&meta_info.announce)?;
//! let peers = tracker
//!     .announce(&meta_info.info_hash, &peer_id, config.port, meta_info.info.length)
//!     .await?;
//!
//! let torrent = Torrent::from_meta_info(&meta_info, peers, peer_id);
//! let data = torrent.download(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod bitfield;
pub mod config;
pub mod error;
pub mod integrity;
pub mod metainfo;
pub mod peer;
pub mod tcp_wire;
pub mod torrent;
pub mod tracker;
pub mod utils;
