use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::{Block, BlockInfo};
use crate::{
    bitfield::{Bitfield, PieceBitfield},
    error::Error,
};

/// Largest message a peer is allowed to announce. A block is 16 KiB and a
/// bitfield of 2 MiB covers 16 million pieces, anything bigger is an attack
/// on our memory.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Messages exchanged after a successful handshake.
/// These are from the vanilla protocol, with no extensions.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A length prefix of zero, used to keep idle connections open.
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Bitfield),
    Request(BlockInfo),
    Piece(Block),
    Cancel(BlockInfo),
    /// A message with an id that is not part of the core protocol, kept
    /// whole so that it can be skipped by the receiver.
    Unknown(u8, Bytes),
}

/// The IDs of the [`Message`]s.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            v => return Err(v),
        })
    }
}

impl Message {
    /// `request` for `len` bytes at `begin` of piece `index`.
    pub fn request(index: u32, begin: u32, len: u32) -> Self {
        Self::Request(BlockInfo { index, begin, len })
    }

    /// `have` announcing that we have piece `index`.
    pub fn have(index: u32) -> Self {
        Self::Have(index)
    }

    /// The id byte of this message, `None` for a keep-alive.
    pub fn id(&self) -> Option<u8> {
        let id = match self {
            Message::KeepAlive => return None,
            Message::Choke => MessageId::Choke,
            Message::Unchoke => MessageId::Unchoke,
            Message::Interested => MessageId::Interested,
            Message::NotInterested => MessageId::NotInterested,
            Message::Have(_) => MessageId::Have,
            Message::Bitfield(_) => MessageId::Bitfield,
            Message::Request(_) => MessageId::Request,
            Message::Piece(_) => MessageId::Piece,
            Message::Cancel(_) => MessageId::Cancel,
            Message::Unknown(id, _) => return Some(*id),
        };
        Some(id as u8)
    }
}

#[derive(Debug, Clone)]
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, buf: &mut BytesMut) -> Result<(), Error> {
        match item {
            // <len=0000>
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            // <len=0001><id>
            Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {
                buf.put_u32(1);
                buf.put_u8(item.id().unwrap_or_default());
            }
            // <len=0005><id=4><piece index>
            Message::Have(index) => {
                buf.put_u32(1 + 4);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(index);
            }
            // <len=0001+X><id=5><bitfield>
            Message::Bitfield(bitfield) => {
                let bytes = bitfield.as_raw_slice();
                buf.put_u32(1 + bytes.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.extend_from_slice(bytes);
            }
            // <len=0013><id=6><index><begin><length>
            Message::Request(info) | Message::Cancel(info) => {
                buf.put_u32(1 + 4 + 4 + 4);
                buf.put_u8(item.id().unwrap_or_default());
                buf.put_u32(info.index);
                buf.put_u32(info.begin);
                buf.put_u32(info.len);
            }
            // <len=0009+X><id=7><index><begin><block>
            Message::Piece(Block { index, begin, block }) => {
                buf.put_u32(1 + 4 + 4 + block.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(index);
                buf.put_u32(begin);
                buf.extend_from_slice(&block);
            }
            Message::Unknown(id, payload) => {
                buf.put_u32(1 + payload.len() as u32);
                buf.put_u8(id);
                buf.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, Error> {
        // the message length header must be present at the minimum, otherwise
        // we can't determine the message type
        if buf.len() < 4 {
            return Ok(None);
        }

        // peek at length prefix without consuming
        let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if size == 0 {
            buf.advance(4);
            return Ok(Some(Message::KeepAlive));
        }

        if size > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(size));
        }

        // incomplete message, wait for the rest of it without advancing the
        // cursor.
        if buf.len() < 4 + size {
            buf.reserve(4 + size - buf.len());
            return Ok(None);
        }

        buf.advance(4);

        // the frame is taken out of the buffer as a whole, a bad payload
        // never leaves the stream misaligned.
        let mut payload = buf.split_to(size);
        let id = payload.get_u8();

        let Ok(id) = MessageId::try_from(id) else {
            warn!("unknown message_id {id}");
            return Ok(Some(Message::Unknown(id, payload.freeze())));
        };

        let msg = match id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                if payload.len() != 4 {
                    return Err(Error::MalformedPayload("have"));
                }
                Message::Have(payload.get_u32())
            }
            MessageId::Bitfield => {
                Message::Bitfield(Bitfield::from_payload(&payload))
            }
            MessageId::Request | MessageId::Cancel => {
                if payload.len() != 12 {
                    return Err(Error::MalformedPayload(if id == MessageId::Request {
                        "request"
                    } else {
                        "cancel"
                    }));
                }
                let info = BlockInfo {
                    index: payload.get_u32(),
                    begin: payload.get_u32(),
                    len: payload.get_u32(),
                };
                if id == MessageId::Request {
                    Message::Request(info)
                } else {
                    Message::Cancel(info)
                }
            }
            MessageId::Piece => {
                if payload.len() < 8 {
                    return Err(Error::MalformedPayload("piece"));
                }
                let index = payload.get_u32();
                let begin = payload.get_u32();
                Message::Piece(Block { index, begin, block: payload.freeze() })
            }
        };

        Ok(Some(msg))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, Error> {
        match self.decode(buf)? {
            Some(msg) => Ok(Some(msg)),
            None if buf.is_empty() => Ok(None),
            None => Err(Error::TruncatedInput),
        }
    }
}
