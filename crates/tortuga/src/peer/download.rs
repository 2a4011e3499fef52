use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::timeout,
};
use tracing::debug;

use super::PeerConnection;
use crate::{
    bitfield::PieceBitfield,
    config::Config,
    error::Error,
    tcp_wire::{BlockInfo, Message},
    torrent::PieceWork,
};

/// State of one attempt at downloading a piece from one peer.
#[derive(Debug)]
pub struct PieceProgress {
    pub index: u32,
    /// Exactly as long as the piece.
    pub buf: Vec<u8>,
    /// Bytes of the piece received so far.
    pub downloaded: usize,
    /// Bytes of the piece that were requested so far.
    pub requested: usize,
    /// Requests sent and not yet answered.
    pub pending: Vec<BlockInfo>,
}

impl PieceProgress {
    pub fn new(work: &PieceWork) -> Self {
        Self {
            index: work.index,
            buf: vec![0; work.length as usize],
            downloaded: 0,
            requested: 0,
            pending: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded == self.buf.len()
    }
}

impl<S> PeerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Download the piece of `work` from this peer, pipelining up to
    /// `max_requests` block requests.
    ///
    /// The data is only returned when every byte was received, it still has
    /// to be verified by the caller. The whole attempt is bounded by the
    /// piece timeout of `config`. Blocks of a piece that timed out earlier
    /// on this connection are skipped when they arrive late, while another
    /// piece is being downloaded.
    pub async fn download_piece(
        &mut self,
        work: &PieceWork,
        config: &Config,
    ) -> Result<Vec<u8>, Error> {
        match timeout(config.piece_timeout(), self.attempt_piece(work, config))
            .await
        {
            Ok(r) => r,
            Err(_) => {
                if !self.abandoned.contains(&work.index) {
                    self.abandoned.push(work.index);
                }
                Err(Error::AttemptTimeout)
            }
        }
    }

    async fn attempt_piece(
        &mut self,
        work: &PieceWork,
        config: &Config,
    ) -> Result<Vec<u8>, Error> {
        let mut progress = PieceProgress::new(work);
        let length = progress.buf.len();
        let block_len = config.block_len.max(1) as usize;
        let max_requests = config.max_requests.max(1);

        while !progress.is_complete() {
            // requests may only be sent while the peer is not choking us
            if !self.choked {
                while progress.pending.len() < max_requests
                    && progress.requested < length
                {
                    let len = block_len.min(length - progress.requested);
                    let begin = progress.requested as u32;

                    self.send_request(work.index, begin, len as u32).await?;

                    progress.pending.push(BlockInfo {
                        index: work.index,
                        begin,
                        len: len as u32,
                    });
                    progress.requested += len;
                }
            }

            let msg = self.receive().await?;
            self.read_message(&mut progress, msg)?;
        }

        debug!("piece {} complete", work.index);

        Ok(progress.buf)
    }

    fn read_message(
        &mut self,
        progress: &mut PieceProgress,
        msg: Message,
    ) -> Result<(), Error> {
        match msg {
            Message::Unchoke => {
                debug!("{:?} unchoked us", self.peer_id);
                self.choked = false;
            }
            Message::Choke => {
                debug!("{:?} choked us", self.peer_id);
                self.choked = true;
            }
            Message::Have(index) => {
                self.bitfield.set_piece(index as usize);
            }
            Message::Bitfield(bitfield) => {
                self.bitfield = bitfield;
            }
            Message::Piece(block) => {
                if block.index != progress.index
                    && self.abandoned.contains(&block.index)
                {
                    debug!("late block of piece {}", block.index);
                    return Ok(());
                }

                block.range(progress.index, progress.buf.len())?;

                // a block is accepted once per outstanding request
                let Some(pos) = progress.pending.iter().position(|r| {
                    r.begin == block.begin && r.len as usize == block.block.len()
                }) else {
                    debug!(
                        "unrequested block {} of piece {}",
                        block.begin, block.index
                    );
                    return Ok(());
                };
                progress.pending.swap_remove(pos);

                let n = block.write_into(progress.index, &mut progress.buf)?;
                progress.downloaded += n;
            }
            // keep-alives and messages we don't act on while downloading
            _ => {}
        }
        Ok(())
    }
}
