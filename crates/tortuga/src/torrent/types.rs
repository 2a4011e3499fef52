use std::{fmt::Display, ops::Deref};

/// SHA-1 of the bencoded info dictionary, identifies a torrent.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct InfoHash(pub [u8; 20]);

impl Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.to_string();
        f.write_str(&s[..10])
    }
}

impl Deref for InfoHash {
    type Target = [u8; 20];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; 20]> for InfoHash {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

impl From<InfoHash> for [u8; 20] {
    fn from(value: InfoHash) -> Self {
        value.0
    }
}

/// A piece that still has to be downloaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceWork {
    pub index: u32,
    /// SHA-1 that the piece must have.
    pub hash: [u8; 20],
    /// Length of this piece, the last piece of a torrent is usually shorter.
    pub length: u32,
}

/// A downloaded piece that passed the hash check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

/// What happened to the pieces of a finished download.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// How many times each piece passed the hash check.
    pub verifications: Vec<u32>,
    /// Pieces that were downloaded but failed the hash check.
    pub integrity_failures: usize,
    /// Attempts that did not finish within the piece timeout.
    pub attempt_timeouts: usize,
}
