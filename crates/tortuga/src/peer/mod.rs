//! A connection with a remote peer.
mod download;
mod types;

pub use download::*;
pub use types::*;

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tokio_util::codec::{Framed, FramedParts};
use tracing::debug;

use crate::{
    bitfield::{Bitfield, PieceBitfield},
    config::Config,
    error::Error,
    tcp_wire::{Handshake, HandshakeCodec, Message, MessageCodec},
    torrent::InfoHash,
};

/// An established session with a peer, after the handshake and the initial
/// bitfield were exchanged.
///
/// The choke flag and the bitfield are only ever mutated by the task that
/// owns the connection, [`PeerConnection::receive`] itself doesn't touch
/// them.
pub struct PeerConnection<S = TcpStream> {
    /// Id that the peer sent on its handshake.
    pub peer_id: PeerId,
    /// If the peer is choking us. Every peer starts choking.
    pub choked: bool,
    /// Pieces that the peer has.
    pub bitfield: Bitfield,
    /// Pieces whose download timed out on this connection. Blocks of these
    /// may still arrive while other pieces are downloaded and are ignored.
    abandoned: Vec<u32>,
    stream: Framed<S, MessageCodec>,
}

impl PeerConnection<TcpStream> {
    /// Connect to the peer at `addr` and complete the handshake.
    ///
    /// On any error the socket is dropped and no connection is returned.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: &InfoHash,
        local_peer_id: &PeerId,
        config: &Config,
    ) -> Result<Self, Error> {
        let socket = timeout(config.connect_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectTimeout)??;

        debug!("{addr} connected");

        Self::handshake(socket, info_hash, local_peer_id, config).await
    }
}

impl<S> PeerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send our handshake over `socket`, validate the peer's one and wait for
    /// its bitfield, which must be the first message after the handshake.
    pub async fn handshake(
        socket: S,
        info_hash: &InfoHash,
        local_peer_id: &PeerId,
        config: &Config,
    ) -> Result<Self, Error> {
        let mut socket = Framed::new(socket, HandshakeCodec);
        let our_handshake = Handshake::new(info_hash.clone(), local_peer_id.clone());

        let their_handshake = timeout(
            config.handshake_timeout(),
            exchange_handshakes(&mut socket, our_handshake),
        )
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

        if their_handshake.info_hash != *info_hash {
            return Err(Error::InfoHashMismatch);
        }

        debug!("handshake ok with {:?}", their_handshake.peer_id);

        // switch codecs, bytes that the peer sent right after the handshake
        // are still in the read buffer.
        let old_parts = socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, MessageCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let mut stream = Framed::from_parts(new_parts);

        let first = timeout(config.handshake_timeout(), stream.next())
            .await
            .map_err(|_| Error::HandshakeTimeout)?;

        let bitfield = match first {
            Some(Ok(Message::Bitfield(bitfield))) => bitfield,
            Some(Ok(_)) => return Err(Error::BitfieldExpected),
            Some(Err(e)) => return Err(e),
            None => return Err(Error::PeerClosedSocket),
        };

        debug!("bitfield with {} pieces", bitfield.count_ones());

        Ok(Self {
            peer_id: their_handshake.peer_id,
            choked: true,
            bitfield,
            abandoned: Vec::new(),
            stream,
        })
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has_piece(index)
    }

    pub async fn send(&mut self, msg: Message) -> Result<(), Error> {
        self.stream.send(msg).await
    }

    pub async fn send_interested(&mut self) -> Result<(), Error> {
        self.send(Message::Interested).await
    }

    pub async fn send_not_interested(&mut self) -> Result<(), Error> {
        self.send(Message::NotInterested).await
    }

    pub async fn send_unchoke(&mut self) -> Result<(), Error> {
        self.send(Message::Unchoke).await
    }

    pub async fn send_have(&mut self, index: u32) -> Result<(), Error> {
        self.send(Message::have(index)).await
    }

    pub async fn send_request(
        &mut self,
        index: u32,
        begin: u32,
        len: u32,
    ) -> Result<(), Error> {
        self.send(Message::request(index, begin, len)).await
    }

    /// Wait for the next message of the peer.
    ///
    /// The end of the stream is [`Error::PeerClosedSocket`], or
    /// [`Error::TruncatedInput`] if it ended in the middle of a message.
    pub async fn receive(&mut self) -> Result<Message, Error> {
        match self.stream.next().await {
            Some(msg) => msg,
            None => Err(Error::PeerClosedSocket),
        }
    }
}

async fn exchange_handshakes<S>(
    socket: &mut Framed<S, HandshakeCodec>,
    our_handshake: Handshake,
) -> Result<Handshake, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    socket.send(our_handshake).await?;

    match socket.next().await {
        Some(handshake) => handshake,
        None => Err(Error::PeerClosedSocket),
    }
}
