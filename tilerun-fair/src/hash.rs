//! SHA-256 helpers shared by every derivation in the protocol.
//!
//! Every derived value packs [`VERSION_TAG`] into its preimage so a future
//! change to layout rules or tier tables cannot reproduce an old derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Domain separator appended to every derivation preimage.
pub const VERSION_TAG: &[u8] = b"TILERUN-MAP-V1";

pub const HASH_SIZE: usize = 32;

pub type Hash32 = [u8; HASH_SIZE];

pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Root of all map derivations for one game.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinalSeed(Hash32);

impl FinalSeed {
    /// `H(vrf_output ‖ salt ‖ game_id ‖ VERSION_TAG)`
    pub fn derive(vrf_output: &Hash32, salt: &Hash32, game_id: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(vrf_output);
        hasher.update(salt);
        hasher.update(game_id.to_be_bytes());
        hasher.update(VERSION_TAG);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    /// Start a domain-separated derivation under `tag`.
    pub fn domain(&self, game_id: u64, tag: &str) -> Derivation {
        Derivation::new(self, game_id, tag)
    }
}

// Seeds are secret while a game is live; keep them out of debug output.
impl fmt::Debug for FinalSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FinalSeed(..)")
    }
}

/// Builder for `H(seed ‖ game_id ‖ len(tag) ‖ tag ‖ idx… ‖ VERSION_TAG)`.
pub struct Derivation {
    hasher: Sha256,
}

impl Derivation {
    fn new(seed: &FinalSeed, game_id: u64, tag: &str) -> Self {
        debug_assert!(tag.len() <= u8::MAX as usize, "domain tag too long");
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(game_id.to_be_bytes());
        hasher.update([tag.len() as u8]);
        hasher.update(tag.as_bytes());
        Self { hasher }
    }

    pub fn index(mut self, value: u64) -> Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn finish(mut self) -> Hash32 {
        self.hasher.update(VERSION_TAG);
        self.hasher.finalize().into()
    }

    /// Finish and reduce the digest modulo `n`.
    pub fn reduce(self, n: u64) -> u64 {
        reduce_mod(&self.finish(), n)
    }
}

/// Reduce a digest, read as a big-endian 256-bit integer, modulo `n`.
///
/// Panics when `n == 0`; callers always pass a non-empty range.
pub fn reduce_mod(digest: &Hash32, n: u64) -> u64 {
    assert!(n > 0, "modulus must be non-zero");
    let n = n as u128;
    let rem = digest
        .iter()
        .fold(0u128, |acc, &byte| ((acc << 8) | byte as u128) % n);
    rem as u64
}
