//! Scheduling of a download across many peers.
//!
//! Every piece of the torrent starts in a shared [`WorkQueue`]. One worker
//! task is spawned per peer, it leases pieces that its peer has, downloads
//! and verifies them, and sends them to the collector. The collector copies
//! every verified piece into the output buffer at its offset.
mod from_meta_info;
mod queue;
mod types;

pub use queue::*;
pub use types::*;

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bitfield::{Bitfield, PieceBitfield},
    config::Config,
    error::Error,
    integrity,
    peer::{PeerConnection, PeerId},
};

/// Everything needed to download a single-file torrent.
#[derive(Debug, Clone)]
pub struct Torrent {
    pub name: String,
    pub info_hash: InfoHash,
    pub piece_hashes: Vec<[u8; 20]>,
    pub piece_length: usize,
    pub total_length: usize,
    pub peers: Vec<SocketAddr>,
    /// Our own id, sent on every handshake.
    pub peer_id: PeerId,
}

impl Torrent {
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Byte range of the piece `index` inside the torrent data.
    pub fn piece_bounds(&self, index: usize) -> (usize, usize) {
        let begin = (index * self.piece_length).min(self.total_length);
        let end = (begin + self.piece_length).min(self.total_length);
        (begin, end)
    }

    pub fn piece_len(&self, index: usize) -> usize {
        let (begin, end) = self.piece_bounds(index);
        end - begin
    }

    /// Download every piece of the torrent from [`Torrent::peers`] and
    /// return the assembled data.
    ///
    /// # Errors
    ///
    /// [`Error::DownloadIncomplete`] when every worker is gone before all
    /// pieces were verified.
    pub async fn download(&self, config: &Config) -> Result<Vec<u8>, Error> {
        self.download_with_stats(config).await.map(|(buf, _)| buf)
    }

    /// Same as [`Torrent::download`], also returning what happened to the
    /// pieces along the way.
    pub async fn download_with_stats(
        &self,
        config: &Config,
    ) -> Result<(Vec<u8>, DownloadStats), Error> {
        let total = self.piece_count();
        let counters = Arc::new(Counters::new(total));

        if total == 0 {
            return Ok((Vec::new(), counters.snapshot()));
        }

        info!(
            "downloading {:?} ({total} pieces) from {} peers",
            self.name,
            self.peers.len()
        );

        let queue = WorkQueue::new((0..total).map(|index| PieceWork {
            index: index as u32,
            hash: self.piece_hashes[index],
            length: self.piece_len(index) as u32,
        }));

        let (results_tx, mut results_rx) =
            mpsc::channel::<PieceResult>(config.max_peers.max(1));
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();

        // peers past `max_peers` wait here for a worker to exit
        let mut backlog: VecDeque<SocketAddr> = self.peers.iter().copied().collect();

        let spawn_worker = |workers: &mut JoinSet<()>,
                            addr: SocketAddr,
                            results: mpsc::Sender<PieceResult>| {
            let worker = Worker {
                addr,
                info_hash: self.info_hash.clone(),
                local_peer_id: self.peer_id.clone(),
                config: config.clone(),
                piece_count: total,
                queue: queue.clone(),
                results,
                counters: counters.clone(),
            };
            let token = cancel.child_token();

            workers.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = worker.run() => {}
                }
            });
        };

        while workers.len() < config.max_peers.max(1) {
            let Some(addr) = backlog.pop_front() else {
                break;
            };
            spawn_worker(&mut workers, addr, results_tx.clone());
        }

        // once no peer is left to start, only the workers hold senders and
        // the channel closes when the last one is gone.
        let mut results_tx = (!backlog.is_empty()).then_some(results_tx);

        let mut buf = vec![0u8; self.total_length];
        let mut verified = Bitfield::from_piece(total);
        let mut done = 0;

        while done < total {
            let event = tokio::select! {
                biased;
                piece = results_rx.recv() => Event::Piece(piece),
                Some(_) = workers.join_next() => Event::WorkerExited,
            };

            let piece = match event {
                Event::Piece(Some(piece)) => piece,
                Event::Piece(None) => break,
                Event::WorkerExited => {
                    if let (Some(tx), Some(addr)) = (&results_tx, backlog.pop_front())
                    {
                        debug!("starting a worker for {addr}");
                        spawn_worker(&mut workers, addr, tx.clone());
                    }
                    if backlog.is_empty() {
                        results_tx = None;
                    }
                    continue;
                }
            };

            let index = piece.index as usize;
            if verified.has_piece(index) {
                continue;
            }

            let (begin, end) = self.piece_bounds(index);
            if piece.data.len() != end - begin {
                warn!("discarding piece #{index} with a wrong length");
                continue;
            }

            buf[begin..end].copy_from_slice(&piece.data);
            verified.set_piece(index);
            done += 1;

            let percent = done as f64 / total as f64 * 100.0;
            info!(
                "({percent:.2}%) downloaded piece #{index} from {} peers",
                counters.active.load(Ordering::Relaxed)
            );
        }

        cancel.cancel();
        while workers.join_next().await.is_some() {}

        if done < total {
            return Err(Error::DownloadIncomplete { verified: done, total });
        }

        let stats = counters.snapshot();
        info!(
            "downloaded {:?}, {} pieces failed the hash check and {} timed out",
            self.name, stats.integrity_failures, stats.attempt_timeouts
        );

        Ok((buf, stats))
    }
}

enum Event {
    Piece(Option<PieceResult>),
    WorkerExited,
}

/// How many times a worker retries a piece that timed out before leaving it
/// to other peers.
const MAX_ATTEMPT_TIMEOUTS: u8 = 2;

/// Shared between the workers and the collector of a download.
#[derive(Debug)]
struct Counters {
    /// Workers holding a connection.
    active: AtomicUsize,
    /// Verifications with a matching hash, per piece.
    verified: Vec<AtomicU32>,
    integrity_failures: AtomicUsize,
    attempt_timeouts: AtomicUsize,
}

impl Counters {
    fn new(pieces: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            verified: (0..pieces).map(|_| AtomicU32::new(0)).collect(),
            integrity_failures: AtomicUsize::new(0),
            attempt_timeouts: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> DownloadStats {
        DownloadStats {
            verifications: self
                .verified
                .iter()
                .map(|v| v.load(Ordering::Relaxed))
                .collect(),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            attempt_timeouts: self.attempt_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Downloads pieces from a single peer.
struct Worker {
    addr: SocketAddr,
    info_hash: InfoHash,
    local_peer_id: PeerId,
    config: Config,
    piece_count: usize,
    queue: Arc<WorkQueue>,
    results: mpsc::Sender<PieceResult>,
    counters: Arc<Counters>,
}

/// Counts a worker as active while it holds a connection.
struct ActiveGuard(Arc<Counters>);

impl ActiveGuard {
    fn new(counters: &Arc<Counters>) -> Self {
        counters.active.fetch_add(1, Ordering::Relaxed);
        Self(counters.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Worker {
    #[tracing::instrument(name = "peer", skip_all, fields(addr = %self.addr))]
    async fn run(self) {
        let mut conn = match PeerConnection::connect(
            self.addr,
            &self.info_hash,
            &self.local_peer_id,
            &self.config,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                warn!("could not connect: {e}");
                return;
            }
        };

        let _active = ActiveGuard::new(&self.counters);
        info!("completed handshake with {:?}", conn.peer_id);

        match self.download_from(&mut conn).await {
            Ok(()) => debug!("no more pieces to download from this peer"),
            Err(e) => warn!("dropping peer: {e}"),
        }
    }

    async fn download_from(&self, conn: &mut PeerConnection) -> Result<(), Error> {
        conn.send_unchoke().await?;
        conn.send_interested().await?;

        // pieces that failed the hash check, or timed out too many times,
        // when they came from this peer. They are left for other peers.
        let mut rejected = Bitfield::from_piece(self.piece_count);
        let mut timeouts = vec![0u8; self.piece_count];

        loop {
            let next = self
                .queue
                .next_matching(|i| {
                    let i = i as usize;
                    conn.has_piece(i) && !rejected.has_piece(i)
                })
                .await;

            let Some(lease) = next else {
                let _ = conn.send_not_interested().await;
                return Ok(());
            };

            let work = lease.work().clone();
            let index = work.index;

            let data = match conn.download_piece(&work, &self.config).await {
                Ok(data) => data,
                Err(Error::AttemptTimeout) => {
                    warn!("piece #{index} failed: {}", Error::AttemptTimeout);
                    self.counters.attempt_timeouts.fetch_add(1, Ordering::Relaxed);

                    if let Some(n) = timeouts.get_mut(index as usize) {
                        *n += 1;
                        if *n >= MAX_ATTEMPT_TIMEOUTS {
                            rejected.set_piece(index as usize);
                        }
                    }

                    // requeue, and let a waiting worker take the piece
                    // before this one looks at the queue again.
                    drop(lease);
                    tokio::task::yield_now().await;
                    continue;
                }
                // the lease is dropped and the piece goes back to the queue
                Err(e) => return Err(e),
            };

            if !integrity::verify(&work.hash, &data) {
                warn!("piece #{index} failed: {}", Error::IntegrityMismatch);
                self.counters.integrity_failures.fetch_add(1, Ordering::Relaxed);
                rejected.set_piece(index as usize);
                continue;
            }

            if let Some(n) = self.counters.verified.get(index as usize) {
                n.fetch_add(1, Ordering::Relaxed);
            }

            // the have goes out before the collector sees the piece, workers
            // are cancelled as soon as the last piece arrives.
            let have = conn.send_have(index).await;

            if self.results.send(PieceResult { index, data }).await.is_err() {
                // the collector is gone
                return Ok(());
            }
            lease.complete();

            have?;
        }
    }
}
