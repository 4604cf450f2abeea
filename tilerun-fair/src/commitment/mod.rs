pub mod scheme;

pub use scheme::{CommitmentScheme, Sha256Scheme};

use crate::hash::Hash32;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The operator's secret contribution to the final seed.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSalt(#[serde(with = "hex::serde")] Hash32);

impl OperatorSalt {
    /// Fresh random salt
    pub fn generate() -> Self {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: Hash32) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn commit(&self) -> SaltCommitment {
        SaltCommitment(Sha256Scheme::commit(&self.0))
    }
}

impl fmt::Debug for OperatorSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperatorSalt(..)")
    }
}

/// Published hash of an [`OperatorSalt`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaltCommitment(#[serde(with = "hex::serde")] Hash32);

impl SaltCommitment {
    pub fn from_bytes(bytes: Hash32) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn verify(&self, salt: &OperatorSalt) -> bool {
        Sha256Scheme::verify(&self.0, salt.as_bytes())
    }
}

impl fmt::Debug for SaltCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SaltCommitment({})", self.to_hex())
    }
}

impl fmt::Display for SaltCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 32-byte output delivered by the randomness oracle.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfOutput(#[serde(with = "hex::serde")] Hash32);

impl VrfOutput {
    pub fn from_bytes(bytes: Hash32) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for VrfOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VrfOutput(..)")
    }
}
