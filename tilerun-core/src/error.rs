use crate::types::{GameId, PlayerId};
use thiserror::Error;
use tilerun_fair::{MapError, MoveError, VerifyError};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TilerunError>;

#[derive(Error, Debug)]
pub enum TilerunError {
    #[error("Map generation failed: {0}")]
    Map(#[from] MapError),

    #[error("Illegal move: {0}")]
    IllegalMove(#[from] MoveError),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Player {0} already has a pending salt commitment")]
    CommitmentPending(PlayerId),

    #[error("Player {0} has no pending salt commitment")]
    CommitmentMissing(PlayerId),

    #[error("Player {player} already has game {game_id} in flight")]
    ActiveGameExists { player: PlayerId, game_id: GameId },

    #[error("Game not found: {0}")]
    GameNotFound(GameId),

    #[error("Unknown randomness request: {0}")]
    UnknownRequest(Uuid),

    #[error("Invalid game phase: {0}")]
    InvalidPhase(String),

    #[error("Player {player} does not own game {game_id}")]
    NotGameOwner { player: PlayerId, game_id: GameId },

    #[error("Settlement rejected game {game_id}: {reason}")]
    SettlementRejected { game_id: GameId, reason: String },

    #[error("Randomness source error: {0}")]
    Randomness(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TilerunError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_phase(msg: impl Into<String>) -> Self {
        Self::InvalidPhase(msg.into())
    }

    pub fn randomness(msg: impl Into<String>) -> Self {
        Self::Randomness(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
