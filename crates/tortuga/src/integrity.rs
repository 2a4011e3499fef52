//! Verification of downloaded pieces.

/// SHA-1 of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hash = sha1_smol::Sha1::new();
    hash.update(data);
    hash.digest().bytes()
}

/// Whether `data` is the piece described by `expected`, the 20 bytes of its
/// SHA-1 taken from the info dictionary.
pub fn verify(expected: &[u8; 20], data: &[u8]) -> bool {
    sha1(data) == *expected
}
