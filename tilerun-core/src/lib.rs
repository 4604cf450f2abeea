//! Tilerun operator core.
//!
//! Runs the commit-reveal flow around [`tilerun_fair`]: publishes salt
//! commitments, requests randomness, serves moves against the hidden map,
//! persists every game to SQLite and hands finished games to a settlement
//! layer that re-derives them independently.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod types;
pub mod vrf;

pub use config::OperatorConfig;
pub use coordinator::{CommitmentStatus, Coordinator, PendingCommitment};
pub use error::{Result, TilerunError};
pub use service::GameService;
pub use settlement::{
    LedgerEntry, LedgerSnapshot, SettlementLayer, SettlementReceipt, SettlementStatus,
    VerifyingLedger,
};
pub use storage::{GameStore, Storage};
pub use types::{GameId, GameRecord, GameView, PlayerId};
pub use vrf::{Fulfilment, LocalRandomness, RandomnessSource};
