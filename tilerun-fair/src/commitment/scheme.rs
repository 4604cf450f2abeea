use crate::hash::{sha256, Hash32};

/// Trait for commitment schemes
pub trait CommitmentScheme {
    type Secret;
    type Commitment;

    fn commit(secret: &Self::Secret) -> Self::Commitment;
    fn verify(commitment: &Self::Commitment, secret: &Self::Secret) -> bool;
}

/// `commitment = SHA-256(salt)`, with no extra nonce so that anyone holding
/// the revealed salt can recompute it.
pub struct Sha256Scheme;

impl CommitmentScheme for Sha256Scheme {
    type Secret = Hash32;
    type Commitment = Hash32;

    fn commit(secret: &Hash32) -> Hash32 {
        sha256(secret)
    }

    fn verify(commitment: &Hash32, secret: &Hash32) -> bool {
        sha256(secret) == *commitment
    }
}
