use crate::settlement::SettlementReceipt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tilerun_fair::{
    ClaimLog, GameParameters, GamePhase, GameState, OperatorSalt, Outcome, ProtocolTimeline,
    SaltCommitment, TileClaim, TileIndex, VrfOutput,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the player placing bets (wallet address, account id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operator-side record of one game. Holds secrets; never hand it to a player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: GameId,
    pub player: PlayerId,
    pub params: GameParameters,
    pub commitment: SaltCommitment,
    pub salt: OperatorSalt,
    pub committed_at: u64,
    pub request_id: Option<Uuid>,
    pub randomness_requested_at: Option<u64>,
    pub vrf_output: Option<VrfOutput>,
    pub state: GameState,
    pub map_nonce: Option<u32>,
    pub claim_log: Option<ClaimLog>,
    pub settlement: Option<SettlementReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn phase(&self) -> GamePhase {
        self.state.phase()
    }

    pub fn timeline(&self) -> Option<ProtocolTimeline> {
        self.randomness_requested_at
            .map(|randomness_requested_at| ProtocolTimeline {
                committed_at: self.committed_at,
                randomness_requested_at,
            })
    }
}

/// What the player channel may see. Seeds stay hidden until the game completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub player: PlayerId,
    pub params: GameParameters,
    pub commitment: SaltCommitment,
    pub phase: GamePhase,
    pub token: Option<TileIndex>,
    pub legal_moves: Vec<TileIndex>,
    pub revealed: Vec<TileClaim>,
    pub collected_reward: u64,
    pub outcome: Outcome,
    pub payout: u64,
    pub revealed_salt: Option<OperatorSalt>,
    pub vrf_output: Option<VrfOutput>,
    pub map_nonce: Option<u32>,
    pub settlement: Option<SettlementReceipt>,
    pub created_at: DateTime<Utc>,
}

impl From<&GameRecord> for GameView {
    fn from(record: &GameRecord) -> Self {
        let completed = record.phase() == GamePhase::Completed;
        Self {
            game_id: record.game_id,
            player: record.player.clone(),
            params: record.params,
            commitment: record.commitment,
            phase: record.phase(),
            token: record.state.token(),
            legal_moves: record.state.legal_moves(),
            revealed: record.state.revealed().to_vec(),
            collected_reward: record.state.collected_reward(),
            outcome: record.state.outcome(),
            payout: record.state.payout(),
            revealed_salt: completed.then_some(record.salt),
            vrf_output: if completed { record.vrf_output } else { None },
            map_nonce: if completed { record.map_nonce } else { None },
            settlement: record.settlement.clone(),
            created_at: record.created_at,
        }
    }
}
