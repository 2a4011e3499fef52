//! Parsing of `.torrent` files.
use std::path::Path;

use bendy::{
    decoding::{self, FromBencode, Object, ResultExt},
    encoding::AsString,
};

use crate::{error::Error, integrity, torrent::InfoHash};

#[derive(Debug, PartialEq, Clone)]
pub struct MetaInfo {
    /// URL of the HTTP tracker.
    pub announce: String,
    /// SHA-1 of the bencoded info dictionary, exactly as it is in the file.
    pub info_hash: InfoHash,
    pub info: Info,
}

/// File related information (Single-file format)
/// https://fileformats.fandom.com/wiki/Torrent_file
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Info {
    /// name of the file
    pub name: String,
    /// piece length - number of bytes in a piece
    pub piece_length: u32,
    /// A (byte) string consisting of the concatenation of all 20-byte SHA1
    /// hash values, one per piece.
    pub pieces: Vec<u8>,
    /// length - bytes of the entire file
    pub length: u64,
    /// Only present on multi file torrents, which can't be downloaded.
    pub files: Option<Vec<File>>,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct File {
    pub length: u64,
    pub path: Vec<String>,
}

impl MetaInfo {
    /// Read and parse the torrent file at `path`.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(&bytes)
    }

    /// Parse and validate a bencoded torrent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let meta_info = Self::from_bencode(bytes)?;
        meta_info.info.validate()?;
        Ok(meta_info)
    }
}

impl Info {
    /// The hash of every piece, in order.
    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect()
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len() / 20
    }

    fn validate(&self) -> Result<(), Error> {
        if self.files.is_some() {
            return Err(Error::MultiFileUnsupported);
        }

        if self.piece_length == 0 {
            return Err(Error::InvalidMetainfo("piece length is zero"));
        }

        if self.pieces.is_empty() || self.pieces.len() % 20 != 0 {
            return Err(Error::InvalidMetainfo(
                "pieces is not a non-empty multiple of 20 bytes",
            ));
        }

        let expected = self.length.div_ceil(self.piece_length as u64);

        if self.piece_count() as u64 != expected {
            return Err(Error::InvalidMetainfo(
                "the number of pieces doesn't match the file length",
            ));
        }

        Ok(())
    }
}

impl FromBencode for MetaInfo {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut announce = None;
        let mut info = None;
        let mut info_hash = None;

        let mut dict_dec = object.try_into_dictionary()?;
        while let Some(pair) = dict_dec.next_pair()? {
            match pair {
                (b"announce", value) => {
                    announce = String::decode_bencode_object(value)
                        .context("announce")
                        .map(Some)?;
                }
                (b"info", value) => {
                    // the hash must be computed over the original bytes,
                    // re-encoding could reorder or drop keys.
                    let raw = value.try_into_dictionary()?.into_raw()?;
                    info_hash = Some(InfoHash(integrity::sha1(raw)));
                    info = Info::from_bencode(raw).context("info").map(Some)?;
                }
                _ => {}
            }
        }

        let announce =
            announce.ok_or_else(|| decoding::Error::missing_field("announce"))?;
        let info = info.ok_or_else(|| decoding::Error::missing_field("info"))?;
        let info_hash =
            info_hash.ok_or_else(|| decoding::Error::missing_field("info"))?;

        Ok(MetaInfo { announce, info_hash, info })
    }
}

impl FromBencode for Info {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut files = None;
        let mut length = None;
        let mut name = None;
        let mut piece_length = None;
        let mut pieces = None;

        let mut dict_dec = object.try_into_dictionary()?;
        while let Some(pair) = dict_dec.next_pair()? {
            match pair {
                (b"files", value) => {
                    files = Vec::<File>::decode_bencode_object(value)
                        .context("files")
                        .map(Some)?;
                }
                (b"length", value) => {
                    length = u64::decode_bencode_object(value)
                        .context("length")
                        .map(Some)?;
                }
                (b"name", value) => {
                    name = String::decode_bencode_object(value)
                        .context("name")
                        .map(Some)?;
                }
                (b"piece length", value) => {
                    piece_length = u32::decode_bencode_object(value)
                        .context("piece length")
                        .map(Some)?;
                }
                (b"pieces", value) => {
                    pieces = AsString::decode_bencode_object(value)
                        .context("pieces")
                        .map(|bytes| Some(bytes.0))?;
                }
                _ => {}
            }
        }

        let name = name.ok_or_else(|| decoding::Error::missing_field("name"))?;
        let piece_length = piece_length
            .ok_or_else(|| decoding::Error::missing_field("piece length"))?;
        let pieces =
            pieces.ok_or_else(|| decoding::Error::missing_field("pieces"))?;

        // multi file torrents have `files` instead of `length`
        let length = match (length, &files) {
            (Some(length), _) => length,
            (None, Some(_)) => 0,
            (None, None) => return Err(decoding::Error::missing_field("length")),
        };

        Ok(Info { name, piece_length, pieces, length, files })
    }
}

impl FromBencode for File {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut dict_dec = object.try_into_dictionary()?;
        let mut length = 0;
        let mut path: Vec<String> = vec![];

        while let Some(pair) = dict_dec.next_pair()? {
            match pair {
                (b"length", value) => {
                    length = u64::decode_bencode_object(value).context("length")?;
                }
                (b"path", value) => {
                    path = Vec::<String>::decode_bencode_object(value)
                        .context("path")?;
                }
                _ => {}
            }
        }

        Ok(Self { length, path })
    }
}
