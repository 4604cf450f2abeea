use crate::error::{Result, TilerunError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tilerun_fair::DEFAULT_MAX_NONCE_ATTEMPTS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// House cut on winning payouts, in basis points.
    pub house_fee_bps: u64,
    /// How long an unused salt commitment stays pending.
    pub commitment_ttl: Duration,
    /// How long a game may wait for randomness before it can be refunded.
    pub randomness_timeout: Duration,
    pub max_nonce_attempts: u32,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            house_fee_bps: 500, // 5%
            commitment_ttl: Duration::from_secs(600),
            randomness_timeout: Duration::from_secs(300),
            max_nonce_attempts: DEFAULT_MAX_NONCE_ATTEMPTS,
        }
    }
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.house_fee_bps >= 10_000 {
            return Err(TilerunError::config("House fee must be below 10000 bps"));
        }

        if self.commitment_ttl.is_zero() {
            return Err(TilerunError::config("Commitment TTL cannot be zero"));
        }

        if self.randomness_timeout.is_zero() {
            return Err(TilerunError::config("Randomness timeout cannot be zero"));
        }

        self.commitment_ttl_chrono()?;
        self.randomness_timeout_chrono()?;

        if self.max_nonce_attempts == 0 {
            return Err(TilerunError::config(
                "Max nonce attempts must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn commitment_ttl_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.commitment_ttl)
            .map_err(|e| TilerunError::config(format!("Commitment TTL out of range: {}", e)))
    }

    pub fn randomness_timeout_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.randomness_timeout)
            .map_err(|e| TilerunError::config(format!("Randomness timeout out of range: {}", e)))
    }
}
