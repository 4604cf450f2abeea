//! Independent re-derivation of a finished game.
//!
//! The verifier owns no state. Given the on-chain-visible tuple (vrf output,
//! revealed salt, game id, claim log, map nonce) it rebuilds the map and
//! replays every claim through [`GameState`]; any disagreement voids the game.

use crate::commitment::{OperatorSalt, SaltCommitment, VrfOutput};
use crate::connectivity::is_connected;
use crate::error::{Result, VerifyError};
use crate::game::{ClaimLog, ClaimedTile, GamePhase, GameState, Outcome, TileClaim};
use crate::hash::FinalSeed;
use crate::map::{GameMap, MapGenerator, DEFAULT_MAX_NONCE_ATTEMPTS};
use crate::params::GameParameters;
use crate::MapError;
use serde::{Deserialize, Serialize};

/// Logical sequence numbers stamped by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolTimeline {
    pub committed_at: u64,
    pub randomness_requested_at: u64,
}

/// The full tuple a settlement layer receives for a completed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSubmission {
    pub game_id: u64,
    pub params: GameParameters,
    pub commitment: SaltCommitment,
    pub revealed_salt: OperatorSalt,
    pub vrf_output: VrfOutput,
    pub timeline: ProtocolTimeline,
    pub claim_log: ClaimLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedOutcome {
    pub game_id: u64,
    pub outcome: Outcome,
    pub collected_reward: u64,
    pub payout: u64,
    pub map: GameMap,
}

#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    max_nonce_attempts: u32,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NONCE_ATTEMPTS)
    }
}

impl Verifier {
    pub fn new(max_nonce_attempts: u32) -> Self {
        Self { max_nonce_attempts }
    }

    pub fn verify(&self, submission: &OutcomeSubmission) -> Result<VerifiedOutcome> {
        let timeline = submission.timeline;
        if timeline.committed_at >= timeline.randomness_requested_at {
            return Err(VerifyError::protocol(format!(
                "salt committed at {} but randomness requested at {}",
                timeline.committed_at, timeline.randomness_requested_at
            )));
        }

        if !submission.commitment.verify(&submission.revealed_salt) {
            return Err(VerifyError::SaltMismatch);
        }

        let game_id = submission.game_id;
        let params = &submission.params;
        let log = &submission.claim_log;

        let seed = FinalSeed::derive(
            submission.vrf_output.as_bytes(),
            submission.revealed_salt.as_bytes(),
            game_id,
        );
        let generator = MapGenerator::new(&seed, game_id, params)?;

        let (start, finish) = generator.endpoints();
        if log.start_tile != start {
            return Err(VerifyError::StartMismatch {
                claimed: log.start_tile,
                derived: start,
            });
        }
        if log.finish_tile != finish {
            return Err(VerifyError::FinishMismatch {
                claimed: log.finish_tile,
                derived: finish,
            });
        }

        let nonce = log.map_nonce;
        let traps = generator.traps_at(start, finish, nonce);
        if !is_connected(params.grid(), start, finish, &traps) {
            return Err(VerifyError::ConnectivityViolated { nonce });
        }
        // The recorded nonce itself connects, so the search below always succeeds.
        let (_, canonical) = generator.search_traps(start, finish, nonce.saturating_add(1))?;
        if canonical != nonce {
            return Err(VerifyError::NonceMismatch {
                claimed: nonce,
                canonical,
            });
        }
        if nonce >= self.max_nonce_attempts {
            return Err(MapError::NonceSearchExhausted {
                attempts: self.max_nonce_attempts,
            }
            .into());
        }

        let map = generator.assemble(start, finish, traps, nonce)?;
        let state = replay(params, &map, &log.reveals)?;

        if state.outcome() != log.outcome
            || state.collected_reward() != log.collected_reward
            || state.payout() != log.payout
        {
            return Err(VerifyError::OutcomeMismatch);
        }

        tracing::debug!(
            "Verified game {}: {:?}, payout {}",
            game_id,
            state.outcome(),
            state.payout()
        );
        Ok(VerifiedOutcome {
            game_id,
            outcome: state.outcome(),
            collected_reward: state.collected_reward(),
            payout: state.payout(),
            map,
        })
    }
}

/// Drive a fresh state machine through the claimed reveals, comparing each
/// claim with what the derived map says.
fn replay(params: &GameParameters, map: &GameMap, reveals: &[TileClaim]) -> Result<GameState> {
    let expected_start = TileClaim {
        tile: map.start,
        claim: ClaimedTile::Start,
    };
    match reveals.first() {
        Some(first) if *first == expected_start => {}
        Some(first) => {
            return Err(VerifyError::StartMismatch {
                claimed: first.tile,
                derived: map.start,
            })
        }
        None => return Err(VerifyError::IncompleteGame),
    }

    let mut state = GameState::new(*params);
    state
        .activate(map)
        .map_err(|source| VerifyError::IllegalClaim { index: 0, source })?;

    for (index, claimed) in reveals.iter().enumerate().skip(1) {
        let result = state
            .apply_move(map, claimed.tile)
            .map_err(|source| VerifyError::IllegalClaim { index, source })?;
        compare_claim(map, claimed, result.claim)?;
    }

    if state.phase() != GamePhase::Completed {
        return Err(VerifyError::IncompleteGame);
    }
    Ok(state)
}

fn compare_claim(map: &GameMap, claimed: &TileClaim, derived: ClaimedTile) -> Result<()> {
    let tile = claimed.tile;
    match (claimed.claim, derived) {
        (claimed, derived) if claimed == derived => Ok(()),
        (ClaimedTile::Trap, _) | (_, ClaimedTile::Trap) => Err(VerifyError::TrapMismatch { tile }),
        (ClaimedTile::Reward { .. }, _) | (_, ClaimedTile::Reward { .. }) => {
            Err(VerifyError::RewardMismatch { tile })
        }
        (ClaimedTile::Finish, _) => Err(VerifyError::FinishMismatch {
            claimed: tile,
            derived: map.finish,
        }),
        (claimed, derived) => Err(VerifyError::TileMismatch {
            tile,
            claimed,
            derived,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, TileIndex};
    use std::collections::{HashMap, VecDeque};

    const GAME_ID: u64 = 42;

    fn salt() -> OperatorSalt {
        OperatorSalt::from_bytes([0x22; 32])
    }

    fn vrf() -> VrfOutput {
        VrfOutput::from_bytes([0x11; 32])
    }

    fn derive_map(game_id: u64, params: &GameParameters) -> GameMap {
        let seed = FinalSeed::derive(vrf().as_bytes(), salt().as_bytes(), game_id);
        GameMap::generate(&seed, game_id, params, DEFAULT_MAX_NONCE_ATTEMPTS).unwrap()
    }

    /// Shortest forward-only, trap-free route from start to finish.
    fn safe_route(map: &GameMap) -> Vec<TileIndex> {
        let grid: Grid = map.grid;
        let mut parent: HashMap<TileIndex, TileIndex> = HashMap::new();
        let mut queue = VecDeque::from([map.start]);
        while let Some(tile) = queue.pop_front() {
            if tile == map.finish {
                break;
            }
            for next in grid.neighbors(tile) {
                let forward = grid.row(next) < grid.row(tile);
                let lateral = grid.row(next) == grid.row(tile);
                if (forward || lateral)
                    && next != map.start
                    && !map.traps.contains(&next)
                    && !parent.contains_key(&next)
                {
                    parent.insert(next, tile);
                    queue.push_back(next);
                }
            }
        }
        let mut route = vec![map.finish];
        while let Some(&prev) = parent.get(route.last().unwrap()) {
            route.push(prev);
        }
        route.pop();
        route.reverse();
        route
    }

    fn play(game_id: u64, params: GameParameters, route: &[TileIndex]) -> OutcomeSubmission {
        let map = derive_map(game_id, &params);
        let mut state = GameState::new(params);
        state.activate(&map).unwrap();
        for &tile in route {
            state.apply_move(&map, tile).unwrap();
        }
        OutcomeSubmission {
            game_id,
            params,
            commitment: salt().commit(),
            revealed_salt: salt(),
            vrf_output: vrf(),
            timeline: ProtocolTimeline {
                committed_at: 1,
                randomness_requested_at: 2,
            },
            claim_log: state.claim_log(&map).unwrap(),
        }
    }

    fn winning_submission() -> OutcomeSubmission {
        let params = GameParameters::standard(5, 1000, 500).unwrap();
        let map = derive_map(GAME_ID, &params);
        let route = safe_route(&map);
        play(GAME_ID, params, &route)
    }

    #[test]
    fn test_honest_win_is_accepted() {
        let submission = winning_submission();
        let verified = Verifier::default().verify(&submission).unwrap();
        assert_eq!(verified.outcome, Outcome::Won);
        assert_eq!(verified.payout, submission.claim_log.payout);
        assert_eq!(
            verified.payout,
            submission.params.payout_for(verified.collected_reward)
        );
    }

    #[test]
    fn test_honest_loss_is_accepted() {
        let params = GameParameters::standard(5, 1000, 500).unwrap();
        let map = derive_map(GAME_ID, &params);
        // golden layout for game 42: start 24, traps {0, 4, 12}; walk 24 -> 19 -> 14 -> 9 -> 4
        assert_eq!(map.start, 24);
        let submission = play(GAME_ID, params, &[19, 14, 9, 4]);
        let verified = Verifier::default().verify(&submission).unwrap();
        assert_eq!(verified.outcome, Outcome::Lost);
        assert_eq!(verified.payout, 0);
    }

    #[test]
    fn test_flipped_salt_bit_is_rejected() {
        let mut submission = winning_submission();
        let mut bytes = *submission.revealed_salt.as_bytes();
        bytes[0] ^= 0x80;
        submission.revealed_salt = OperatorSalt::from_bytes(bytes);
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::SaltMismatch)
        );
    }

    #[test]
    fn test_commit_after_randomness_is_a_protocol_violation() {
        let mut submission = winning_submission();
        submission.timeline = ProtocolTimeline {
            committed_at: 5,
            randomness_requested_at: 5,
        };
        assert!(matches!(
            Verifier::default().verify(&submission),
            Err(VerifyError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_fake_reward_is_rejected() {
        let mut submission = winning_submission();
        let map = derive_map(GAME_ID, &submission.params);
        let index = submission
            .claim_log
            .reveals
            .iter()
            .position(|claim| claim.claim == ClaimedTile::Safe)
            .expect("route crosses a plain tile");
        let tile = submission.claim_log.reveals[index].tile;
        assert!(!map.rewards.contains_key(&tile));

        submission.claim_log.reveals[index].claim = ClaimedTile::Reward { amount: 5000 };
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::RewardMismatch { tile })
        );
    }

    #[test]
    fn test_misnamed_plain_tile_is_rejected() {
        let submission = winning_submission();
        let index = submission
            .claim_log
            .reveals
            .iter()
            .position(|claim| claim.claim == ClaimedTile::Safe)
            .expect("route crosses a plain tile");
        let tile = submission.claim_log.reveals[index].tile;

        let mut as_start = submission.clone();
        as_start.claim_log.reveals[index].claim = ClaimedTile::Start;
        assert_eq!(
            Verifier::default().verify(&as_start),
            Err(VerifyError::TileMismatch {
                tile,
                claimed: ClaimedTile::Start,
                derived: ClaimedTile::Safe,
            })
        );

        let mut as_finish = submission;
        as_finish.claim_log.reveals[index].claim = ClaimedTile::Finish;
        assert_eq!(
            Verifier::default().verify(&as_finish),
            Err(VerifyError::FinishMismatch {
                claimed: tile,
                derived: as_finish.claim_log.finish_tile,
            })
        );
    }

    #[test]
    fn test_hidden_trap_is_rejected() {
        let params = GameParameters::standard(5, 1000, 500).unwrap();
        let mut submission = play(GAME_ID, params, &[19, 14, 9, 4]);
        let last = submission.claim_log.reveals.len() - 1;
        submission.claim_log.reveals[last].claim = ClaimedTile::Safe;
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::TrapMismatch { tile: 4 })
        );
    }

    #[test]
    fn test_inflated_payout_is_rejected() {
        let mut submission = winning_submission();
        submission.claim_log.payout += 1;
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::OutcomeMismatch)
        );
    }

    #[test]
    fn test_backward_claim_is_rejected() {
        let mut submission = winning_submission();
        let start = submission.claim_log.start_tile;
        // Re-insert the start tile after the first move: revisiting and moving backward.
        submission.claim_log.reveals.insert(
            2,
            TileClaim {
                tile: start,
                claim: ClaimedTile::Safe,
            },
        );
        assert!(matches!(
            Verifier::default().verify(&submission),
            Err(VerifyError::IllegalClaim { index: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_log_is_incomplete() {
        let mut submission = winning_submission();
        submission.claim_log.reveals.pop();
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::IncompleteGame)
        );
    }

    #[test]
    fn test_wrong_start_is_rejected() {
        let mut submission = winning_submission();
        submission.claim_log.start_tile = 20;
        assert!(matches!(
            Verifier::default().verify(&submission),
            Err(VerifyError::StartMismatch { claimed: 20, .. })
        ));
    }

    #[test]
    fn test_skipped_nonce_is_rejected() {
        // Game 48 needs one retry: nonce 0 walls off the start corner.
        let params = GameParameters::standard(5, 1000, 500).unwrap();
        let map = derive_map(48, &params);
        assert_eq!(map.map_nonce, 1);

        let route = safe_route(&map);
        let mut submission = play(48, params, &route);
        submission.claim_log.map_nonce = 0;
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::ConnectivityViolated { nonce: 0 })
        );
    }

    #[test]
    fn test_later_connected_nonce_is_rejected() {
        let mut submission = winning_submission();
        let params = submission.params;
        let seed = FinalSeed::derive(vrf().as_bytes(), salt().as_bytes(), GAME_ID);
        let generator = MapGenerator::new(&seed, GAME_ID, &params).unwrap();
        let (start, finish) = generator.endpoints();
        let later = (1..DEFAULT_MAX_NONCE_ATTEMPTS)
            .find(|&n| is_connected(params.grid(), start, finish, &generator.traps_at(start, finish, n)))
            .unwrap();

        submission.claim_log.map_nonce = later;
        assert_eq!(
            Verifier::default().verify(&submission),
            Err(VerifyError::NonceMismatch {
                claimed: later,
                canonical: 0
            })
        );
    }
}
