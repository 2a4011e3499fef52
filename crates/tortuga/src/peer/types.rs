use std::fmt::Display;

use rand::{distributions::Alphanumeric, Rng};

/// Client prefix of our peer ids, Azureus style.
const CLIENT_PREFIX: &[u8; 8] = b"-TG0001-";

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// A new id for this client, the client prefix followed by 12 random
    /// alphanumeric characters. Generated once at start-up and used for
    /// every connection and announce of the session.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        id[..8].copy_from_slice(CLIENT_PREFIX);

        let mut rng = rand::thread_rng();
        for b in &mut id[8..] {
            *b = rng.sample(Alphanumeric);
        }

        Self(id)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.to_string();
        f.write_str(&s)
    }
}

impl From<[u8; 20]> for PeerId {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

impl From<PeerId> for [u8; 20] {
    fn from(value: PeerId) -> Self {
        value.0
    }
}
