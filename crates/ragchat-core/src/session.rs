//! Per-conversation session identity.
//!
//! The backend uses the session token to keep per-conversation memory.
//! The client treats it as opaque: one token is minted when a
//! conversation instance starts and reused for every chat request until
//! that instance is dropped. Nothing is persisted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Prefix of every generated token.
pub const TOKEN_PREFIX: &str = "session-";

/// Number of random base-36 characters after the prefix (~62 bits).
pub const TOKEN_SUFFIX_LEN: usize = 12;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque session token held for the lifetime of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    token: String,
}

impl SessionIdentity {
    /// Mint a token from the thread-local RNG.
    pub fn new() -> Self {
        Self::from_rng(&mut rand::rng())
    }

    /// Mint a token from a caller-supplied RNG.
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let suffix: String = (0..TOKEN_SUFFIX_LEN)
            .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
            .collect();
        Self {
            token: format!("{}{}", TOKEN_PREFIX, suffix),
        }
    }

    /// Deterministic token for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
