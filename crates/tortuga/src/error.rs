use std::io;

use thiserror::Error;

impl From<bendy::decoding::Error> for Error {
    fn from(_value: bendy::decoding::Error) -> Self {
        Self::BencodeError
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    #[error("The peer did not accept the connection in time")]
    ConnectTimeout,

    #[error("The peer took to long to complete the handshake")]
    HandshakeTimeout,

    #[error("The handshake received is not valid")]
    HandshakeInvalid,

    #[error("The info_hash of the peer handshake does not match ours")]
    InfoHashMismatch,

    #[error("The peer didn't send a bitfield as the first message")]
    BitfieldExpected,

    #[error("The peer closed the socket")]
    PeerClosedSocket,

    #[error("The stream ended in the middle of a message")]
    TruncatedInput,

    #[error("The payload of a `{0}` message has the wrong length")]
    MalformedPayload(&'static str),

    #[error("The peer announced a message of {0} bytes, which is too large")]
    MessageTooLarge(usize),

    #[error("Expected a block of piece {expected} but got one of piece {got}")]
    UnexpectedPieceIndex { expected: u32, got: u32 },

    #[error("Block offset {begin} is outside of a piece of {len} bytes")]
    OffsetOutOfRange { begin: usize, len: usize },

    #[error(
        "Block of {data_len} bytes at offset {begin} overflows a piece of \
         {len} bytes"
    )]
    DataOverflowsBuffer { begin: usize, data_len: usize, len: usize },

    #[error("The piece downloaded does not have a valid hash")]
    IntegrityMismatch,

    #[error("The piece took to long to download")]
    AttemptTimeout,

    #[error(
        "All peers are gone, only {verified} of {total} pieces were \
         downloaded"
    )]
    DownloadIncomplete { verified: usize, total: usize },

    #[error("Failed to decode the bencode buffer")]
    BencodeError,

    #[error("The torrent file is not valid: {0}")]
    InvalidMetainfo(&'static str),

    #[error("Torrents with multiple files are not supported")]
    MultiFileUnsupported,

    #[error("The tracker url `{0}` is not a HTTP url")]
    TrackerUrl(String),

    #[error("The tracker refused the announce: {0}")]
    TrackerFailure(String),

    #[error("The peer list returned by the announce request is not valid")]
    TrackerCompactPeerList,

    #[error("HTTP error while talking to the tracker: {0}")]
    Http(#[from] reqwest::Error),

    #[error(
        "Error while trying to read the configuration file, please make sure \
         it has the correct format: {0}"
    )]
    ConfigDeserializeError(#[from] toml::de::Error),
}
