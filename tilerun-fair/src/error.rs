use crate::game::ClaimedTile;
use crate::grid::TileIndex;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifyError>;

/// Failures while deriving a map from a final seed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("Invalid game parameters: {0}")]
    InvalidParameters(String),

    #[error("No connected trap layout found after {attempts} attempts")]
    NonceSearchExhausted { attempts: u32 },

    #[error("Reward amount overflows for bet {bet}")]
    RewardOverflow { bet: u64 },
}

impl MapError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

/// A move request the state machine refused. The game state is untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("Game is not accepting moves")]
    WrongPhase,

    #[error("Tile {0} is outside the grid")]
    OutOfBounds(TileIndex),

    #[error("Tile {target} is not adjacent to the token at {from}")]
    NotAdjacent { from: TileIndex, target: TileIndex },

    #[error("Tile {0} has already been revealed")]
    AlreadyRevealed(TileIndex),

    #[error("Tile {target} is behind the token at {from}")]
    BackwardMove { from: TileIndex, target: TileIndex },
}

/// Reasons the verifier refuses a completed game. Any of these voids the payout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Revealed salt does not match the published commitment")]
    SaltMismatch,

    #[error("Claimed start tile {claimed} does not match derived start {derived}")]
    StartMismatch { claimed: TileIndex, derived: TileIndex },

    #[error("Claimed finish tile {claimed} does not match derived finish {derived}")]
    FinishMismatch { claimed: TileIndex, derived: TileIndex },

    #[error("Trap layout at nonce {nonce} blocks every path from start to finish")]
    ConnectivityViolated { nonce: u32 },

    #[error("Map nonce {claimed} is not the first connected layout ({canonical})")]
    NonceMismatch { claimed: u32, canonical: u32 },

    #[error("Trap claim for tile {tile} disagrees with the derived map")]
    TrapMismatch { tile: TileIndex },

    #[error("Reward claim for tile {tile} disagrees with the derived map")]
    RewardMismatch { tile: TileIndex },

    #[error("Tile {tile} was claimed as {claimed:?} but derives as {derived:?}")]
    TileMismatch {
        tile: TileIndex,
        claimed: ClaimedTile,
        derived: ClaimedTile,
    },

    #[error("Claim #{index} is not a legal move: {source}")]
    IllegalClaim {
        index: usize,
        #[source]
        source: MoveError,
    },

    #[error("Claimed outcome or payout disagrees with the replayed game")]
    OutcomeMismatch,

    #[error("Claim log does not end in a terminal reveal")]
    IncompleteGame,

    #[error("Map derivation failed: {0}")]
    Map(#[from] MapError),
}

impl VerifyError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}
