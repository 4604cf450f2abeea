//! Settlement: the layer that pays out only after re-deriving the map itself.
//!
//! The settlement layer learns each game's salt commitment and terms when the
//! bet is placed, and its randomness when the callback lands. At settlement it
//! trusts only the revealed salt and the claim log from the operator; the rest
//! of the verified tuple comes from what it recorded earlier.

use crate::error::{Result, TilerunError};
use crate::types::GameId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tilerun_fair::{
    GameParameters, OutcomeSubmission, ProtocolTimeline, SaltCommitment, Verifier, VerifyError,
    VrfOutput,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Outcome verified; `payout` is zero for a lost game.
    Accepted { payout: u64 },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub game_id: GameId,
    pub status: SettlementStatus,
    pub settled_at: DateTime<Utc>,
}

impl SettlementReceipt {
    fn rejected(game_id: GameId, reason: impl Into<String>) -> Self {
        Self {
            game_id,
            status: SettlementStatus::Rejected {
                reason: reason.into(),
            },
            settled_at: Utc::now(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.status, SettlementStatus::Accepted { .. })
    }

    pub fn payout(&self) -> u64 {
        match self.status {
            SettlementStatus::Accepted { payout } => payout,
            SettlementStatus::Rejected { .. } => 0,
        }
    }
}

#[async_trait]
pub trait SettlementLayer: Send + Sync {
    /// Record a new game's salt commitment and terms. Called when the bet is
    /// placed, before randomness is requested.
    async fn register_game(
        &self,
        game_id: GameId,
        commitment: SaltCommitment,
        params: GameParameters,
        committed_at: u64,
    ) -> Result<()>;

    /// Record the randomness delivered for a registered game.
    async fn record_randomness(
        &self,
        game_id: GameId,
        vrf_output: VrfOutput,
        requested_at: u64,
    ) -> Result<()>;

    /// Verify and settle a completed game. Once a game is accepted, later
    /// submissions return the same receipt.
    async fn submit_outcome(&self, submission: &OutcomeSubmission) -> Result<SettlementReceipt>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRandomness {
    pub vrf_output: VrfOutput,
    pub requested_at: u64,
}

/// What the ledger knows about one game before any outcome is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub game_id: GameId,
    pub commitment: SaltCommitment,
    pub params: GameParameters,
    pub committed_at: u64,
    pub randomness: Option<RecordedRandomness>,
    pub receipt: Option<SettlementReceipt>,
}

impl LedgerEntry {
    /// Pin a submission to the recorded commitment, terms and randomness.
    /// Only the salt and the claim log are taken from the submitter.
    fn bind(
        &self,
        submission: &OutcomeSubmission,
    ) -> std::result::Result<OutcomeSubmission, VerifyError> {
        let randomness = self.randomness.ok_or_else(|| {
            VerifyError::protocol(format!("no randomness recorded for game {}", self.game_id))
        })?;

        if !self.commitment.verify(&submission.revealed_salt) {
            return Err(VerifyError::SaltMismatch);
        }
        if submission.commitment != self.commitment {
            return Err(VerifyError::protocol(format!(
                "commitment {} differs from the registered {}",
                submission.commitment, self.commitment
            )));
        }
        if submission.params != self.params {
            return Err(VerifyError::protocol(
                "game parameters differ from the registered terms",
            ));
        }
        if submission.vrf_output != randomness.vrf_output {
            return Err(VerifyError::protocol(
                "vrf output differs from the delivered randomness",
            ));
        }

        let timeline = ProtocolTimeline {
            committed_at: self.committed_at,
            randomness_requested_at: randomness.requested_at,
        };
        if submission.timeline != timeline {
            return Err(VerifyError::protocol(
                "timeline differs from the recorded sequence",
            ));
        }

        Ok(OutcomeSubmission {
            game_id: submission.game_id,
            params: self.params,
            commitment: self.commitment,
            revealed_salt: submission.revealed_salt,
            vrf_output: randomness.vrf_output,
            timeline,
            claim_log: submission.claim_log.clone(),
        })
    }
}

/// Serializable ledger contents, for settlement layers that outlive one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub games: Vec<LedgerEntry>,
    pub total_paid: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    games: HashMap<GameId, LedgerEntry>,
    total_paid: u64,
}

/// In-process settlement that runs the full verifier before crediting anything.
#[derive(Debug)]
pub struct VerifyingLedger {
    verifier: Verifier,
    state: Mutex<LedgerState>,
}

impl VerifyingLedger {
    pub fn new(max_nonce_attempts: u32) -> Self {
        Self {
            verifier: Verifier::new(max_nonce_attempts),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn from_snapshot(max_nonce_attempts: u32, snapshot: LedgerSnapshot) -> Self {
        let games = snapshot
            .games
            .into_iter()
            .map(|entry| (entry.game_id, entry))
            .collect();
        Self {
            verifier: Verifier::new(max_nonce_attempts),
            state: Mutex::new(LedgerState {
                games,
                total_paid: snapshot.total_paid,
            }),
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        let mut games: Vec<_> = state.games.values().cloned().collect();
        games.sort_by_key(|entry| entry.game_id);
        LedgerSnapshot {
            games,
            total_paid: state.total_paid,
        }
    }

    pub fn receipt(&self, game_id: GameId) -> Option<SettlementReceipt> {
        self.state
            .lock()
            .games
            .get(&game_id)
            .and_then(|entry| entry.receipt.clone())
    }

    pub fn total_paid(&self) -> u64 {
        self.state.lock().total_paid
    }
}

impl Default for VerifyingLedger {
    fn default() -> Self {
        Self {
            verifier: Verifier::default(),
            state: Mutex::new(LedgerState::default()),
        }
    }
}

#[async_trait]
impl SettlementLayer for VerifyingLedger {
    async fn register_game(
        &self,
        game_id: GameId,
        commitment: SaltCommitment,
        params: GameParameters,
        committed_at: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(existing) = state.games.get(&game_id) {
            if existing.commitment == commitment
                && existing.params == params
                && existing.committed_at == committed_at
            {
                return Ok(());
            }
            return Err(VerifyError::protocol(format!(
                "game {} is already registered with other terms",
                game_id
            ))
            .into());
        }

        state.games.insert(
            game_id,
            LedgerEntry {
                game_id,
                commitment,
                params,
                committed_at,
                randomness: None,
                receipt: None,
            },
        );
        tracing::debug!("Registered game {} with commitment {}", game_id, commitment);
        Ok(())
    }

    async fn record_randomness(
        &self,
        game_id: GameId,
        vrf_output: VrfOutput,
        requested_at: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .games
            .get_mut(&game_id)
            .ok_or(TilerunError::GameNotFound(game_id))?;

        let recorded = RecordedRandomness {
            vrf_output,
            requested_at,
        };
        match entry.randomness {
            Some(existing) if existing == recorded => Ok(()),
            Some(_) => Err(VerifyError::protocol(format!(
                "game {} already has different randomness",
                game_id
            ))
            .into()),
            None => {
                entry.randomness = Some(recorded);
                Ok(())
            }
        }
    }

    async fn submit_outcome(&self, submission: &OutcomeSubmission) -> Result<SettlementReceipt> {
        let game_id = GameId(submission.game_id);
        let mut state = self.state.lock();
        let LedgerState { games, total_paid } = &mut *state;

        let entry = match games.get_mut(&game_id) {
            Some(entry) => entry,
            None => {
                tracing::error!("Rejected outcome for unregistered game {}", game_id);
                return Ok(SettlementReceipt::rejected(
                    game_id,
                    format!("game {} was never registered", game_id),
                ));
            }
        };

        if let Some(existing) = &entry.receipt {
            tracing::debug!("Game {} already settled, returning existing receipt", game_id);
            return Ok(existing.clone());
        }

        // Rejections are not recorded; only an accepted outcome closes the game.
        let verified = match entry
            .bind(submission)
            .and_then(|bound| self.verifier.verify(&bound))
        {
            Ok(verified) => verified,
            Err(e) => {
                tracing::error!("Rejected outcome for game {}: {}", game_id, e);
                return Ok(SettlementReceipt::rejected(game_id, e.to_string()));
            }
        };

        *total_paid = total_paid.saturating_add(verified.payout);
        tracing::info!(
            "Settled game {}: {:?}, payout {}",
            game_id,
            verified.outcome,
            verified.payout
        );

        let receipt = SettlementReceipt {
            game_id,
            status: SettlementStatus::Accepted {
                payout: verified.payout,
            },
            settled_at: Utc::now(),
        };
        entry.receipt = Some(receipt.clone());
        Ok(receipt)
    }
}
