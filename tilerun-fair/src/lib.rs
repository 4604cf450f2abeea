//! Provably-fair map protocol for Tilerun.
//!
//! A player moves a token from the bottom row of a square grid to the top,
//! uncovering safe tiles, rewards and traps. The map is derived from
//! `H(vrf_output ‖ operator_salt ‖ game_id ‖ version)`, where the operator's
//! salt is committed before the randomness is requested and revealed only
//! after the game ends.
//!
//! This crate is pure: no I/O, no clocks, no shared state. The operator
//! service, the settlement layer and standalone checkers all link it so the
//! derivation exists exactly once.

pub mod commitment;
pub mod connectivity;
pub mod error;
pub mod game;
pub mod grid;
pub mod hash;
pub mod map;
pub mod params;
pub mod verifier;

pub use commitment::{CommitmentScheme, OperatorSalt, SaltCommitment, Sha256Scheme, VrfOutput};
pub use connectivity::is_connected;
pub use error::{MapError, MoveError, Result, VerifyError};
pub use game::{ClaimLog, ClaimedTile, GamePhase, GameState, MoveResult, Outcome, TileClaim};
pub use grid::{Grid, TileIndex};
pub use hash::{FinalSeed, VERSION_TAG};
pub use map::{GameMap, MapGenerator, TileKind, TileReward, DEFAULT_MAX_NONCE_ATTEMPTS};
pub use params::{GameParameters, RewardTier};
pub use verifier::{OutcomeSubmission, ProtocolTimeline, VerifiedOutcome, Verifier};
