//! Commit-reveal bookkeeping for operator salts.
//!
//! `Uncommitted -> Committed -> Consumed -> Revealed`, keyed by player until a
//! bet binds the commitment to a game id. Expiry is swept explicitly by the
//! caller; nothing here runs on a timer.

use crate::error::{Result, TilerunError};
use crate::types::{GameId, PlayerId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tilerun_fair::{GamePhase, OperatorSalt, SaltCommitment};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PendingCommitment {
    pub player: PlayerId,
    pub salt: OperatorSalt,
    pub commitment: SaltCommitment,
    /// Logical sequence number at which the commitment was published.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentStatus {
    Consumed,
    Revealed,
}

#[derive(Debug, Clone)]
struct BoundCommitment {
    player: PlayerId,
    salt: OperatorSalt,
    status: CommitmentStatus,
}

#[derive(Debug)]
pub struct Coordinator {
    pending: HashMap<PlayerId, PendingCommitment>,
    bound: HashMap<GameId, BoundCommitment>,
    active_games: HashMap<PlayerId, GameId>,
    requests: HashMap<Uuid, GameId>,
    sequence: u64,
    commitment_ttl: Duration,
}

impl Coordinator {
    pub fn new(commitment_ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            bound: HashMap::new(),
            active_games: HashMap::new(),
            requests: HashMap::new(),
            sequence: 0,
            commitment_ttl,
        }
    }

    /// Advance the logical clock used to order commitments and randomness requests.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Generate a salt for `player` and publish its hash.
    pub fn commit(&mut self, player: &PlayerId, now: DateTime<Utc>) -> Result<SaltCommitment> {
        if self.pending.contains_key(player) {
            return Err(TilerunError::CommitmentPending(player.clone()));
        }
        if let Some(&game_id) = self.active_games.get(player) {
            return Err(TilerunError::ActiveGameExists {
                player: player.clone(),
                game_id,
            });
        }

        let salt = OperatorSalt::generate();
        let commitment = salt.commit();
        let sequence = self.next_sequence();
        self.pending.insert(
            player.clone(),
            PendingCommitment {
                player: player.clone(),
                salt,
                commitment,
                sequence,
                created_at: now,
                expires_at: now + self.commitment_ttl,
            },
        );

        tracing::info!("Published salt commitment {} for player {}", commitment, player);
        Ok(commitment)
    }

    pub fn pending(&self, player: &PlayerId) -> Option<&PendingCommitment> {
        self.pending.get(player)
    }

    /// Bind the player's pending commitment to a new game and clear it from the pending set.
    pub fn consume(
        &mut self,
        player: &PlayerId,
        game_id: GameId,
        now: DateTime<Utc>,
    ) -> Result<PendingCommitment> {
        if let Some(&active) = self.active_games.get(player) {
            return Err(TilerunError::ActiveGameExists {
                player: player.clone(),
                game_id: active,
            });
        }

        let pending = self
            .pending
            .remove(player)
            .ok_or_else(|| TilerunError::CommitmentMissing(player.clone()))?;

        if pending.expires_at <= now {
            tracing::warn!("Commitment for player {} expired before use", player);
            return Err(TilerunError::CommitmentMissing(player.clone()));
        }

        self.active_games.insert(player.clone(), game_id);
        self.bound.insert(
            game_id,
            BoundCommitment {
                player: player.clone(),
                salt: pending.salt,
                status: CommitmentStatus::Consumed,
            },
        );

        tracing::info!("Commitment {} bound to game {}", pending.commitment, game_id);
        Ok(pending)
    }

    /// Re-register a game that was in flight before a restart.
    pub fn restore(
        &mut self,
        player: &PlayerId,
        game_id: GameId,
        salt: OperatorSalt,
        pending_request: Option<Uuid>,
    ) {
        self.active_games.insert(player.clone(), game_id);
        self.bound.insert(
            game_id,
            BoundCommitment {
                player: player.clone(),
                salt,
                status: CommitmentStatus::Consumed,
            },
        );
        if let Some(request_id) = pending_request {
            self.requests.insert(request_id, game_id);
        }
    }

    /// Remember which game a randomness request belongs to; returns the request's sequence.
    pub fn record_request(&mut self, request_id: Uuid, game_id: GameId) -> u64 {
        self.requests.insert(request_id, game_id);
        self.next_sequence()
    }

    /// Map a callback to its game. Each request resolves at most once.
    pub fn resolve_request(&mut self, request_id: Uuid) -> Result<GameId> {
        self.requests
            .remove(&request_id)
            .ok_or(TilerunError::UnknownRequest(request_id))
    }

    /// Drop everything held for a finished game. The salt stays in storage.
    pub fn forget(&mut self, game_id: GameId) {
        self.bound.remove(&game_id);
        self.requests.retain(|_, id| *id != game_id);
    }

    /// The game reached a terminal phase; the player may bet again.
    pub fn release(&mut self, player: &PlayerId, game_id: GameId) {
        if self.active_games.get(player) == Some(&game_id) {
            self.active_games.remove(player);
        }
    }

    pub fn active_game(&self, player: &PlayerId) -> Option<GameId> {
        self.active_games.get(player).copied()
    }

    /// Disclose the raw salt. Only allowed once the game has completed.
    pub fn reveal(&mut self, game_id: GameId, phase: GamePhase) -> Result<OperatorSalt> {
        if phase != GamePhase::Completed {
            return Err(TilerunError::invalid_phase(format!(
                "salt for game {} cannot be revealed while {}",
                game_id,
                phase.as_str()
            )));
        }

        let bound = self
            .bound
            .get_mut(&game_id)
            .ok_or(TilerunError::GameNotFound(game_id))?;
        if bound.status != CommitmentStatus::Revealed {
            bound.status = CommitmentStatus::Revealed;
            tracing::info!("Revealed salt for game {} (player {})", game_id, bound.player);
        }
        Ok(bound.salt)
    }

    pub fn status(&self, game_id: GameId) -> Option<CommitmentStatus> {
        self.bound.get(&game_id).map(|bound| bound.status)
    }

    /// Drop pending commitments whose TTL has elapsed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<PlayerId> {
        let expired: Vec<PlayerId> = self
            .pending
            .values()
            .filter(|pending| pending.expires_at <= now)
            .map(|pending| pending.player.clone())
            .collect();

        for player in &expired {
            self.pending.remove(player);
            tracing::warn!("Expired unused salt commitment for player {}", player);
        }

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Coordinator {
        Coordinator::new(Duration::minutes(10))
    }

    #[test]
    fn test_one_pending_commitment_per_player() {
        let mut coordinator = coordinator();
        let alice = PlayerId::new("alice");
        let now = Utc::now();

        coordinator.commit(&alice, now).unwrap();
        assert!(matches!(
            coordinator.commit(&alice, now),
            Err(TilerunError::CommitmentPending(_))
        ));

        // Other players are unaffected.
        coordinator.commit(&PlayerId::new("bob"), now).unwrap();
    }

    #[test]
    fn test_consume_binds_and_clears() {
        let mut coordinator = coordinator();
        let alice = PlayerId::new("alice");
        let now = Utc::now();

        let commitment = coordinator.commit(&alice, now).unwrap();
        let pending = coordinator.consume(&alice, GameId(1), now).unwrap();
        assert_eq!(pending.commitment, commitment);
        assert!(pending.commitment.verify(&pending.salt));
        assert!(coordinator.pending(&alice).is_none());
        assert_eq!(coordinator.status(GameId(1)), Some(CommitmentStatus::Consumed));

        // Cannot reuse the commitment, nor commit again while the game runs.
        assert!(matches!(
            coordinator.consume(&alice, GameId(2), now),
            Err(TilerunError::ActiveGameExists { .. })
        ));
        assert!(matches!(
            coordinator.commit(&alice, now),
            Err(TilerunError::ActiveGameExists { .. })
        ));

        coordinator.release(&alice, GameId(1));
        coordinator.commit(&alice, now).unwrap();
    }

    #[test]
    fn test_bet_without_commitment_is_rejected() {
        let mut coordinator = coordinator();
        assert!(matches!(
            coordinator.consume(&PlayerId::new("carol"), GameId(1), Utc::now()),
            Err(TilerunError::CommitmentMissing(_))
        ));
    }

    #[test]
    fn test_reveal_requires_completion() {
        let mut coordinator = coordinator();
        let alice = PlayerId::new("alice");
        let now = Utc::now();
        coordinator.commit(&alice, now).unwrap();
        let pending = coordinator.consume(&alice, GameId(7), now).unwrap();

        assert!(coordinator.reveal(GameId(7), GamePhase::Active).is_err());
        let salt = coordinator.reveal(GameId(7), GamePhase::Completed).unwrap();
        assert_eq!(salt, pending.salt);
        assert_eq!(coordinator.status(GameId(7)), Some(CommitmentStatus::Revealed));
    }

    #[test]
    fn test_sequence_orders_commit_before_request() {
        let mut coordinator = coordinator();
        let alice = PlayerId::new("alice");
        let now = Utc::now();
        coordinator.commit(&alice, now).unwrap();
        let pending = coordinator.consume(&alice, GameId(1), now).unwrap();

        let request = Uuid::new_v4();
        let requested_at = coordinator.record_request(request, GameId(1));
        assert!(pending.sequence < requested_at);

        assert_eq!(coordinator.resolve_request(request).unwrap(), GameId(1));
        assert!(matches!(
            coordinator.resolve_request(request),
            Err(TilerunError::UnknownRequest(_))
        ));
    }

    #[test]
    fn test_forget_drops_bound_state() {
        let mut coordinator = coordinator();
        let alice = PlayerId::new("alice");
        let now = Utc::now();
        coordinator.commit(&alice, now).unwrap();
        coordinator.consume(&alice, GameId(4), now).unwrap();
        let request = Uuid::new_v4();
        coordinator.record_request(request, GameId(4));

        coordinator.release(&alice, GameId(4));
        coordinator.forget(GameId(4));
        assert_eq!(coordinator.status(GameId(4)), None);
        assert!(coordinator.resolve_request(request).is_err());
        assert!(matches!(
            coordinator.reveal(GameId(4), GamePhase::Completed),
            Err(TilerunError::GameNotFound(_))
        ));
    }

    #[test]
    fn test_sweep_expired() {
        let mut coordinator = coordinator();
        let now = Utc::now();
        coordinator.commit(&PlayerId::new("alice"), now).unwrap();
        coordinator
            .commit(&PlayerId::new("bob"), now + Duration::minutes(5))
            .unwrap();

        let expired = coordinator.sweep_expired(now + Duration::minutes(12));
        assert_eq!(expired, vec![PlayerId::new("alice")]);
        assert!(coordinator.pending(&PlayerId::new("bob")).is_some());

        // An expired commitment cannot back a bet even if not yet swept.
        assert!(coordinator
            .consume(&PlayerId::new("bob"), GameId(3), now + Duration::minutes(20))
            .is_err());
    }
}
