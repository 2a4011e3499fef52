//! End to end downloads from simulated seeders listening on localhost.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::codec::{Framed, FramedParts};
use tortuga::{
    bitfield::{Bitfield, PieceBitfield},
    config::Config,
    error::Error,
    integrity,
    peer::PeerId,
    tcp_wire::{Block, Handshake, HandshakeCodec, Message, MessageCodec},
    torrent::{InfoHash, Torrent},
};

const PIECE_LENGTH: usize = 4;

/// A peer that has some pieces of `data` and serves every request for them.
#[derive(Clone)]
struct Seeder {
    info_hash: InfoHash,
    data: Arc<Vec<u8>>,
    /// Raw payload of the bitfield message.
    bitfield: Vec<u8>,
    /// Piece that is sent with a flipped byte.
    corrupt: Option<u32>,
    /// Sent instead of the bitfield after the handshake.
    first_message: Option<Message>,
    /// Never answer `interested` with `unchoke`.
    never_unchoke: bool,
    /// Wait before answering the handshake.
    handshake_delay: Option<Duration>,
    /// Wait before answering the first request.
    first_reply_delay: Option<Duration>,
}

impl Seeder {
    fn new(data: &Arc<Vec<u8>>, bitfield: u8) -> Self {
        Self {
            info_hash: InfoHash([7; 20]),
            data: data.clone(),
            bitfield: vec![bitfield],
            corrupt: None,
            first_message: None,
            never_unchoke: false,
            handshake_delay: None,
            first_reply_delay: None,
        }
    }

    /// Listen on a random port and serve a single connection. The handle
    /// resolves to the indices of every `have` received.
    async fn spawn(self) -> (SocketAddr, JoinHandle<Vec<u32>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            self.serve(socket).await
        });

        (addr, handle)
    }

    async fn serve(self, socket: tokio::net::TcpStream) -> Vec<u32> {
        let mut haves = Vec::new();
        let mut socket = Framed::new(socket, HandshakeCodec);

        let Some(Ok(theirs)) = socket.next().await else {
            return haves;
        };
        assert_eq!(theirs.info_hash, self.info_hash);

        if let Some(delay) = self.handshake_delay {
            tokio::time::sleep(delay).await;
        }

        socket
            .send(Handshake::new(self.info_hash.clone(), PeerId([b's'; 20])))
            .await
            .unwrap();

        let old_parts = socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, MessageCodec);
        new_parts.read_buf = old_parts.read_buf;
        let mut socket = Framed::from_parts(new_parts);

        let first = self.first_message.clone().unwrap_or_else(|| {
            Message::Bitfield(Bitfield::from_payload(&self.bitfield))
        });
        if socket.send(first).await.is_err() {
            return haves;
        }

        let mut first_reply_delay = self.first_reply_delay;

        while let Some(Ok(msg)) = socket.next().await {
            match msg {
                Message::Interested if !self.never_unchoke => {
                    if socket.send(Message::Unchoke).await.is_err() {
                        break;
                    }
                }
                Message::Request(info) => {
                    if let Some(delay) = first_reply_delay.take() {
                        tokio::time::sleep(delay).await;
                    }

                    let begin = info.index as usize * PIECE_LENGTH + info.begin as usize;
                    let end = begin + info.len as usize;
                    let mut block = self.data[begin..end].to_vec();

                    if self.corrupt == Some(info.index) {
                        block[0] ^= 0xff;
                    }

                    let piece = Message::Piece(Block {
                        index: info.index,
                        begin: info.begin,
                        block: block.into(),
                    });
                    if socket.send(piece).await.is_err() {
                        break;
                    }
                }
                Message::Have(index) => haves.push(index),
                _ => {}
            }
        }

        haves.sort();
        haves
    }
}

fn data() -> Arc<Vec<u8>> {
    Arc::new((1..=16).collect())
}

fn torrent(data: &[u8], peers: Vec<SocketAddr>) -> Torrent {
    Torrent {
        name: "data.bin".into(),
        info_hash: InfoHash([7; 20]),
        piece_hashes: data.chunks(PIECE_LENGTH).map(integrity::sha1).collect(),
        piece_length: PIECE_LENGTH,
        total_length: data.len(),
        peers,
        peer_id: PeerId::generate(),
    }
}

fn config() -> Config {
    Config { handshake_timeout: 2, piece_timeout: 5, ..Default::default() }
}

/// An address that nobody listens on.
fn dead_peer() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn two_peers_with_half_of_the_pieces_each() {
    init_tracing();
    let data = data();

    let (a, a_haves) = Seeder::new(&data, 0b1100_0000).spawn().await;
    let (b, b_haves) = Seeder::new(&data, 0b0011_0000).spawn().await;

    let torrent = torrent(&data, vec![a, b]);
    let buf = torrent.download(&config()).await.unwrap();

    assert_eq!(buf, *data);
    assert_eq!(a_haves.await.unwrap(), vec![0, 1]);
    assert_eq!(b_haves.await.unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn corrupt_piece_is_downloaded_again_from_another_peer() {
    init_tracing();
    let data = data();

    let mut liar = Seeder::new(&data, 0b1111_0000);
    liar.corrupt = Some(2);

    let (a, a_haves) = liar.spawn().await;
    let (b, b_haves) = Seeder::new(&data, 0b0010_0000).spawn().await;

    let torrent = torrent(&data, vec![a, b]);
    let buf = torrent.download(&config()).await.unwrap();

    assert_eq!(buf, *data);
    assert!(!a_haves.await.unwrap().contains(&2));
    assert_eq!(b_haves.await.unwrap(), vec![2]);
}

#[tokio::test]
async fn peer_without_bitfield_is_dropped() {
    init_tracing();
    let data = data();

    let mut rude = Seeder::new(&data, 0b1111_0000);
    rude.first_message = Some(Message::have(0));

    let (a, a_haves) = rude.spawn().await;
    let (b, b_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;

    let torrent = torrent(&data, vec![a, b]);
    let buf = torrent.download(&config()).await.unwrap();

    assert_eq!(buf, *data);
    assert!(a_haves.await.unwrap().is_empty());
    assert_eq!(b_haves.await.unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn only_bad_peers() {
    init_tracing();
    let data = data();

    let mut liar = Seeder::new(&data, 0b1111_0000);
    liar.corrupt = Some(3);
    let (a, _a_haves) = liar.spawn().await;

    let torrent = torrent(&data, vec![a, dead_peer()]);
    let r = torrent.download(&config()).await;

    assert!(matches!(
        r,
        Err(Error::DownloadIncomplete { verified: 3, total: 4 })
    ));
}

#[tokio::test]
async fn verified_pieces_are_announced_once() {
    init_tracing();
    let data = data();

    let (a, a_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;
    let (b, b_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;

    let torrent = torrent(&data, vec![a, b]);
    let buf = torrent.download(&config()).await.unwrap();
    assert_eq!(buf, *data);

    let mut all = a_haves.await.unwrap();
    all.extend(b_haves.await.unwrap());
    all.sort();

    let mut pieces = Bitfield::from_piece(4);
    for index in &all {
        pieces.set_piece(*index as usize);
    }

    assert_eq!(all, vec![0, 1, 2, 3]);
    assert_eq!(pieces.count_ones(), 4);
}

#[tokio::test]
async fn piece_of_a_choking_peer_goes_to_another_peer() {
    init_tracing();
    let data = data();

    // only has the last piece, and never lets us download it
    let mut choking = Seeder::new(&data, 0b0001_0000);
    choking.never_unchoke = true;
    let (a, a_haves) = choking.spawn().await;

    // connects after the first peer already leased the last piece
    let mut slow = Seeder::new(&data, 0b1111_0000);
    slow.handshake_delay = Some(Duration::from_millis(300));
    let (b, b_haves) = slow.spawn().await;

    let config = Config { piece_timeout: 1, ..config() };
    let torrent = torrent(&data, vec![a, b]);
    let (buf, stats) = torrent.download_with_stats(&config).await.unwrap();

    assert_eq!(buf, *data);
    assert!(stats.attempt_timeouts >= 1);
    assert_eq!(stats.verifications, vec![1; 4]);
    assert!(a_haves.await.unwrap().is_empty());
    assert_eq!(b_haves.await.unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn late_reply_does_not_drop_the_peer() {
    init_tracing();
    let data = data();

    let mut late = Seeder::new(&data, 0b1111_0000);
    late.first_reply_delay = Some(Duration::from_millis(1500));
    let (a, a_haves) = late.spawn().await;

    let config = Config { piece_timeout: 1, ..config() };
    let torrent = torrent(&data, vec![a]);
    let (buf, stats) = torrent.download_with_stats(&config).await.unwrap();

    assert_eq!(buf, *data);
    assert_eq!(stats.attempt_timeouts, 1);
    assert_eq!(stats.integrity_failures, 0);
    assert_eq!(stats.verifications, vec![1; 4]);
    assert_eq!(a_haves.await.unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn every_piece_is_verified_once_with_a_slow_peer() {
    init_tracing();
    let data = data();

    let mut slow = Seeder::new(&data, 0b1111_0000);
    slow.first_reply_delay = Some(Duration::from_millis(1500));
    let (a, _a_haves) = slow.spawn().await;
    let (b, _b_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;

    let mut liar = Seeder::new(&data, 0b1111_0000);
    liar.corrupt = Some(1);
    let (c, _c_haves) = liar.spawn().await;

    let config = Config { piece_timeout: 1, ..config() };
    let torrent = torrent(&data, vec![a, b, c]);
    let (buf, stats) = torrent.download_with_stats(&config).await.unwrap();

    assert_eq!(buf, *data);
    assert_eq!(stats.verifications, vec![1; 4]);
}

#[tokio::test]
async fn waiting_peer_replaces_a_dead_one() {
    init_tracing();
    let data = data();

    let (good, good_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;

    let config = Config { max_peers: 1, ..config() };
    let torrent = torrent(&data, vec![dead_peer(), good]);
    let buf = torrent.download(&config).await.unwrap();

    assert_eq!(buf, *data);
    assert_eq!(good_haves.await.unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn peers_past_the_limit_are_not_contacted_early() {
    init_tracing();
    let data = data();

    let (a, a_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;
    let (b, b_haves) = Seeder::new(&data, 0b1111_0000).spawn().await;

    let config = Config { max_peers: 1, ..config() };
    let torrent = torrent(&data, vec![a, b]);
    let buf = torrent.download(&config).await.unwrap();

    assert_eq!(buf, *data);
    assert_eq!(a_haves.await.unwrap(), vec![0, 1, 2, 3]);
    // the download was over before the first peer went away
    b_haves.abort();
    assert!(b_haves.await.unwrap_err().is_cancelled());
}
