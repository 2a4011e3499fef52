//! Codec for encoding and decoding handshakes.
//!
//! This has to be a separate codec as the handshake has a different
//! structure than the rest of the messages. Moreover, handshakes may only
//! be sent once at the beginning of a connection, preceding all other
//! messages. Thus, after receiving and sending a handshake the codec
//! should be switched to [`super::MessageCodec`], but care should be taken
//! not to discard the underlying receive and send buffers.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::Error, peer::PeerId, torrent::InfoHash};

use super::PSTR;

/// reserved (8) + info_hash (20) + peer_id (20)
const HANDSHAKE_TAIL_LEN: usize = 8 + 20 + 20;

#[derive(Debug)]
pub struct HandshakeCodec;

/// pstrlen = 19
/// pstr = "BitTorrent protocol"
/// This is the very first message exchanged. If the info hash of the peer
/// differs from ours, the connection is severed. The reserved field is 8
/// zero bytes, we don't negotiate any extension. The peer id is usually the
/// client name and version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub pstr: Bytes,
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self::with_protocol(Bytes::from_static(&PSTR), info_hash, peer_id)
    }

    pub fn with_protocol(
        pstr: impl Into<Bytes>,
        info_hash: InfoHash,
        peer_id: PeerId,
    ) -> Self {
        Self { pstr: pstr.into(), info_hash, peer_id }
    }

    /// Size of this handshake on the wire, 68 bytes for the standard
    /// protocol string.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        1 + self.pstr.len() + HANDSHAKE_TAIL_LEN
    }

    pub fn serialize(&self) -> Result<BytesMut, Error> {
        let mut buf = BytesMut::with_capacity(self.len());
        HandshakeCodec.encode(self.clone(), &mut buf)?;
        Ok(buf)
    }
}

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(
        &mut self,
        handshake: Handshake,
        buf: &mut BytesMut,
    ) -> Result<(), Error> {
        let Handshake { pstr, info_hash, peer_id } = handshake;

        let pstr_len: u8 =
            pstr.len().try_into().map_err(|_| Error::HandshakeInvalid)?;

        if pstr_len == 0 {
            return Err(Error::HandshakeInvalid);
        }

        buf.reserve(1 + pstr.len() + HANDSHAKE_TAIL_LEN);

        // protocol length prefix
        buf.put_u8(pstr_len);

        // payload
        buf.extend_from_slice(&pstr);
        buf.put_bytes(0, 8);
        buf.extend_from_slice(&info_hash.0);
        buf.extend_from_slice(&peer_id.0);

        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Handshake>, Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        // peek at the length prefix, the buffer cursor is only advanced once
        // the whole handshake is in the buffer.
        let pstr_len = buf[0] as usize;

        if pstr_len == 0 {
            return Err(Error::HandshakeInvalid);
        }

        let total_len = 1 + pstr_len + HANDSHAKE_TAIL_LEN;

        if buf.len() < total_len {
            buf.reserve(total_len - buf.len());
            return Ok(None);
        }

        buf.advance(1);

        // protocol string
        let pstr = buf.split_to(pstr_len).freeze();
        // reserved field, we don't support any extension
        buf.advance(8);
        // info hash
        let mut info_hash = [0; 20];
        buf.copy_to_slice(&mut info_hash);
        // peer id
        let mut peer_id = [0; 20];
        buf.copy_to_slice(&mut peer_id);

        Ok(Some(Handshake {
            pstr,
            info_hash: InfoHash(info_hash),
            peer_id: PeerId(peer_id),
        }))
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Handshake>, Error> {
        match self.decode(buf)? {
            Some(handshake) => Ok(Some(handshake)),
            None if buf.is_empty() => Ok(None),
            None => Err(Error::TruncatedInput),
        }
    }
}
