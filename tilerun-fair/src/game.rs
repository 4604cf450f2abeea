//! Per-game state machine: `AwaitingRandomness -> Active -> Completed`.
//!
//! The same machine drives live play on the operator side and the replay
//! inside the verifier, so both apply identical movement rules.

use crate::error::MoveError;
use crate::grid::{Grid, TileIndex};
use crate::map::{GameMap, TileKind};
use crate::params::GameParameters;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    AwaitingRandomness,
    Active,
    Completed,
    /// Randomness never arrived; the bet was returned and no map exists.
    Refunded,
}

impl GamePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GamePhase::Completed | GamePhase::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::AwaitingRandomness => "awaiting_randomness",
            GamePhase::Active => "active",
            GamePhase::Completed => "completed",
            GamePhase::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Unset,
    Won,
    Lost,
}

/// What the operator asserted a revealed tile was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimedTile {
    Start,
    Safe,
    Reward { amount: u64 },
    Trap,
    Finish,
}

impl ClaimedTile {
    fn from_kind(kind: TileKind) -> Self {
        match kind {
            TileKind::Start => ClaimedTile::Start,
            TileKind::Safe => ClaimedTile::Safe,
            TileKind::Reward(reward) => ClaimedTile::Reward {
                amount: reward.amount,
            },
            TileKind::Trap => ClaimedTile::Trap,
            TileKind::Finish => ClaimedTile::Finish,
        }
    }

    pub fn reward(&self) -> u64 {
        match self {
            ClaimedTile::Reward { amount } => *amount,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileClaim {
    pub tile: TileIndex,
    pub claim: ClaimedTile,
}

/// Response relayed back to the player for one reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub tile: TileIndex,
    pub claim: ClaimedTile,
    pub collected_reward: u64,
    pub terminal: bool,
    /// The move left the token without any legal continuation.
    pub stranded: bool,
}

/// Everything the verifier needs to know about what happened during play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLog {
    pub start_tile: TileIndex,
    pub finish_tile: TileIndex,
    pub map_nonce: u32,
    pub reveals: Vec<TileClaim>,
    pub outcome: Outcome,
    pub collected_reward: u64,
    pub payout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    params: GameParameters,
    phase: GamePhase,
    token: Option<TileIndex>,
    revealed: Vec<TileClaim>,
    collected_reward: u64,
    outcome: Outcome,
    payout: u64,
}

impl GameState {
    pub fn new(params: GameParameters) -> Self {
        Self {
            params,
            phase: GamePhase::AwaitingRandomness,
            token: None,
            revealed: Vec::new(),
            collected_reward: 0,
            outcome: Outcome::Unset,
            payout: 0,
        }
    }

    pub fn params(&self) -> &GameParameters {
        &self.params
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn token(&self) -> Option<TileIndex> {
        self.token
    }

    pub fn revealed(&self) -> &[TileClaim] {
        &self.revealed
    }

    pub fn collected_reward(&self) -> u64 {
        self.collected_reward
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn payout(&self) -> u64 {
        self.payout
    }

    fn grid(&self) -> Grid {
        self.params.grid()
    }

    fn is_revealed(&self, tile: TileIndex) -> bool {
        self.revealed.iter().any(|claim| claim.tile == tile)
    }

    /// Randomness arrived: place the token on the start tile and reveal it.
    pub fn activate(&mut self, map: &GameMap) -> Result<TileClaim, MoveError> {
        if self.phase != GamePhase::AwaitingRandomness {
            return Err(MoveError::WrongPhase);
        }

        let claim = TileClaim {
            tile: map.start,
            claim: ClaimedTile::Start,
        };
        self.token = Some(map.start);
        self.revealed.push(claim);
        self.phase = GamePhase::Active;
        Ok(claim)
    }

    /// Check a move without applying it.
    pub fn check_move(&self, target: TileIndex) -> Result<(), MoveError> {
        let from = match (self.phase, self.token) {
            (GamePhase::Active, Some(from)) => from,
            _ => return Err(MoveError::WrongPhase),
        };

        let grid = self.grid();
        if !grid.contains(target) {
            return Err(MoveError::OutOfBounds(target));
        }
        if self.is_revealed(target) {
            return Err(MoveError::AlreadyRevealed(target));
        }
        if !grid.is_adjacent(from, target) {
            return Err(MoveError::NotAdjacent { from, target });
        }
        if grid.progress(target) < grid.progress(from) {
            return Err(MoveError::BackwardMove { from, target });
        }
        Ok(())
    }

    pub fn legal_moves(&self) -> Vec<TileIndex> {
        match self.token {
            Some(from) if self.phase == GamePhase::Active => self
                .grid()
                .neighbors(from)
                .filter(|&tile| self.check_move(tile).is_ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Reveal `target` against `map`. Rejected moves leave the state untouched.
    pub fn apply_move(&mut self, map: &GameMap, target: TileIndex) -> Result<MoveResult, MoveError> {
        self.check_move(target)?;

        let kind = map.classify(target);
        let claim = ClaimedTile::from_kind(kind);
        self.revealed.push(TileClaim { tile: target, claim });
        self.token = Some(target);
        self.collected_reward = self.collected_reward.saturating_add(claim.reward());

        let mut stranded = false;
        match kind {
            TileKind::Trap => self.complete(Outcome::Lost),
            TileKind::Finish => self.complete(Outcome::Won),
            _ if self.legal_moves().is_empty() => {
                stranded = true;
                self.complete(Outcome::Lost);
            }
            _ => {}
        }

        Ok(MoveResult {
            tile: target,
            claim,
            collected_reward: self.collected_reward,
            terminal: self.phase == GamePhase::Completed,
            stranded,
        })
    }

    fn complete(&mut self, outcome: Outcome) {
        self.phase = GamePhase::Completed;
        self.outcome = outcome;
        self.payout = match outcome {
            Outcome::Won => self.params.payout_for(self.collected_reward),
            _ => 0,
        };
    }

    /// Refund path for a game whose randomness never arrived.
    pub fn refund(&mut self) -> Result<(), MoveError> {
        if self.phase != GamePhase::AwaitingRandomness {
            return Err(MoveError::WrongPhase);
        }
        self.phase = GamePhase::Refunded;
        Ok(())
    }

    /// Claim log for a completed game.
    pub fn claim_log(&self, map: &GameMap) -> Option<ClaimLog> {
        if self.phase != GamePhase::Completed {
            return None;
        }
        Some(ClaimLog {
            start_tile: map.start,
            finish_tile: map.finish,
            map_nonce: map.map_nonce,
            reveals: self.revealed.clone(),
            outcome: self.outcome,
            collected_reward: self.collected_reward,
            payout: self.payout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileReward;
    use crate::params::RewardTier;
    use std::collections::{BTreeMap, BTreeSet};

    // 5x5, start 22, finish 2, traps on 12 and 16, a 1x reward on 17
    fn fixture() -> (GameParameters, GameMap) {
        let params = GameParameters::standard(5, 1000, 500).unwrap();
        let mut rewards = BTreeMap::new();
        rewards.insert(
            17,
            TileReward {
                tier: RewardTier::Even,
                amount: 1000,
            },
        );
        let map = GameMap {
            grid: Grid::new(5),
            start: 22,
            finish: 2,
            traps: BTreeSet::from([12, 16, 24]),
            rewards,
            map_nonce: 0,
        };
        (params, map)
    }

    fn active() -> (GameState, GameMap) {
        let (params, map) = fixture();
        let mut state = GameState::new(params);
        state.activate(&map).unwrap();
        (state, map)
    }

    #[test]
    fn test_activation_reveals_start() {
        let (state, _) = active();
        assert_eq!(state.phase(), GamePhase::Active);
        assert_eq!(state.token(), Some(22));
        assert_eq!(state.revealed()[0].claim, ClaimedTile::Start);
    }

    #[test]
    fn test_moves_before_activation_are_rejected() {
        let (params, map) = fixture();
        let mut state = GameState::new(params);
        assert_eq!(state.apply_move(&map, 17), Err(MoveError::WrongPhase));
    }

    #[test]
    fn test_illegal_moves_leave_state_untouched() {
        let (mut state, map) = active();
        state.apply_move(&map, 17).unwrap();
        let before = state.clone();

        assert_eq!(
            state.apply_move(&map, 22),
            Err(MoveError::AlreadyRevealed(22))
        );
        assert_eq!(
            state.apply_move(&map, 7),
            Err(MoveError::NotAdjacent { from: 17, target: 7 })
        );
        assert_eq!(state.apply_move(&map, 99), Err(MoveError::OutOfBounds(99)));

        state.apply_move(&map, 18).unwrap();
        let before_backward = state.clone();
        assert_eq!(
            state.apply_move(&map, 23),
            Err(MoveError::BackwardMove { from: 18, target: 23 })
        );
        assert_eq!(state, before_backward);
        assert_ne!(state, before);
    }

    #[test]
    fn test_reward_accumulates() {
        let (mut state, map) = active();
        let result = state.apply_move(&map, 17).unwrap();
        assert_eq!(result.claim, ClaimedTile::Reward { amount: 1000 });
        assert_eq!(result.collected_reward, 1000);
        assert!(!result.terminal);
        assert_eq!(state.phase(), GamePhase::Active);
    }

    #[test]
    fn test_trap_loses() {
        let (mut state, map) = active();
        state.apply_move(&map, 17).unwrap();
        let result = state.apply_move(&map, 16).unwrap();
        assert!(result.terminal);
        assert_eq!(state.outcome(), Outcome::Lost);
        assert_eq!(state.payout(), 0);
        assert_eq!(state.apply_move(&map, 11), Err(MoveError::WrongPhase));
    }

    #[test]
    fn test_finish_wins_with_fee() {
        let (mut state, map) = active();
        for tile in [17, 18, 13, 8, 3, 2] {
            state.apply_move(&map, tile).unwrap();
        }
        assert_eq!(state.phase(), GamePhase::Completed);
        assert_eq!(state.outcome(), Outcome::Won);
        assert_eq!(state.collected_reward(), 1000);
        assert_eq!(state.payout(), 950);

        let log = state.claim_log(&map).unwrap();
        assert_eq!(log.reveals.len(), 7);
        assert_eq!(log.reveals.last().unwrap().claim, ClaimedTile::Finish);
    }

    #[test]
    fn test_stranded_token_loses() {
        let (mut state, map) = active();
        // Walk up the east side, cross to 3, then step into the corner at 4:
        // its only neighbours (3 and 9) are already revealed.
        for tile in [23, 18, 19, 14, 9, 8, 3] {
            let result = state.apply_move(&map, tile).unwrap();
            assert!(!result.terminal);
        }
        let result = state.apply_move(&map, 4).unwrap();
        assert!(result.stranded);
        assert!(result.terminal);
        assert_eq!(state.outcome(), Outcome::Lost);
        assert_eq!(state.payout(), 0);
        assert!(state.legal_moves().is_empty());
    }

    #[test]
    fn test_refund_only_before_randomness() {
        let (params, map) = fixture();
        let mut state = GameState::new(params);
        state.refund().unwrap();
        assert_eq!(state.phase(), GamePhase::Refunded);
        assert_eq!(state.activate(&map), Err(MoveError::WrongPhase));

        let (mut running, _) = active();
        assert_eq!(running.refund(), Err(MoveError::WrongPhase));
    }
}
