//! Deterministic map derivation.
//!
//! Every value is a pure hash of (final seed, game id, domain tag, loop
//! indices, version tag), so anyone holding the final seed and game id can
//! re-derive any single tile without trusting the operator.
//!
//! 1. start = bottom row[`H("start") mod width`], finish = top row[`H("finish") mod width`]
//! 2. traps: partial Fisher-Yates over every other tile with pivots from
//!    `H("bomb", nonce, draw)`; retry with the next nonce until start and finish
//!    are connected, up to a hard attempt cap
//! 3. reward count = `min + H("rewardCount") mod (max - min + 1)`
//! 4. reward tiles: partial Fisher-Yates over the remaining tiles with `H("rewardPos", draw)`
//! 5. reward tier per tile from `H("reward", tile) mod 10000`

use crate::connectivity::is_connected;
use crate::error::MapError;
use crate::grid::{Grid, TileIndex};
use crate::hash::FinalSeed;
use crate::params::{GameParameters, RewardTier, BASIS_POINTS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_MAX_NONCE_ATTEMPTS: u32 = 100;

const TAG_START: &str = "start";
const TAG_FINISH: &str = "finish";
const TAG_TRAP: &str = "bomb";
const TAG_REWARD_COUNT: &str = "rewardCount";
const TAG_REWARD_POS: &str = "rewardPos";
const TAG_REWARD: &str = "reward";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileReward {
    pub tier: RewardTier,
    pub amount: u64,
}

/// What a tile turns out to be when revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Start,
    Safe,
    Reward(TileReward),
    Trap,
    Finish,
}

impl TileKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TileKind::Trap | TileKind::Finish)
    }
}

/// A fully derived map. Operator-only until the game completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMap {
    pub grid: Grid,
    pub start: TileIndex,
    pub finish: TileIndex,
    pub traps: BTreeSet<TileIndex>,
    pub rewards: BTreeMap<TileIndex, TileReward>,
    /// Index of the shuffle attempt that produced a connected trap layout.
    pub map_nonce: u32,
}

impl GameMap {
    /// Derive the map, searching nonces `0..max_attempts` for a connected layout.
    pub fn generate(
        seed: &FinalSeed,
        game_id: u64,
        params: &GameParameters,
        max_attempts: u32,
    ) -> Result<Self, MapError> {
        let generator = MapGenerator::new(seed, game_id, params)?;
        let (start, finish) = generator.endpoints();
        let (traps, map_nonce) = generator.search_traps(start, finish, max_attempts)?;
        generator.assemble(start, finish, traps, map_nonce)
    }

    pub fn classify(&self, tile: TileIndex) -> TileKind {
        if tile == self.start {
            TileKind::Start
        } else if tile == self.finish {
            TileKind::Finish
        } else if self.traps.contains(&tile) {
            TileKind::Trap
        } else if let Some(reward) = self.rewards.get(&tile) {
            TileKind::Reward(*reward)
        } else {
            TileKind::Safe
        }
    }

    pub fn total_reward(&self) -> u64 {
        self.rewards.values().map(|r| r.amount).sum()
    }

    /// One-character-per-tile rendering, top row first.
    pub fn render(&self) -> String {
        let width = self.grid.width();
        let mut out = String::with_capacity(self.grid.tile_count() * 2);
        for row in 0..width {
            for col in 0..width {
                let symbol = match self.classify(self.grid.tile(row, col)) {
                    TileKind::Start => 'S',
                    TileKind::Finish => 'F',
                    TileKind::Trap => 'X',
                    TileKind::Reward(_) => '$',
                    TileKind::Safe => '.',
                };
                out.push(symbol);
                if col + 1 < width {
                    out.push(' ');
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Step-by-step access to the derivation, used by the verifier to recompute
/// individual pieces at a recorded nonce.
pub struct MapGenerator<'a> {
    seed: &'a FinalSeed,
    game_id: u64,
    params: &'a GameParameters,
}

impl<'a> MapGenerator<'a> {
    pub fn new(seed: &'a FinalSeed, game_id: u64, params: &'a GameParameters) -> Result<Self, MapError> {
        params.validate()?;
        Ok(Self {
            seed,
            game_id,
            params,
        })
    }

    fn grid(&self) -> Grid {
        self.params.grid()
    }

    pub fn endpoints(&self) -> (TileIndex, TileIndex) {
        let grid = self.grid();
        let width = grid.width() as u64;
        let start_col = self.seed.domain(self.game_id, TAG_START).reduce(width) as usize;
        let finish_col = self.seed.domain(self.game_id, TAG_FINISH).reduce(width) as usize;
        (grid.bottom_row()[start_col], grid.top_row()[finish_col])
    }

    /// Trap layout produced by shuffle attempt `nonce`, without any connectivity check.
    pub fn traps_at(&self, start: TileIndex, finish: TileIndex, nonce: u32) -> BTreeSet<TileIndex> {
        let candidates: Vec<TileIndex> = (0..self.grid().tile_count())
            .filter(|&tile| tile != start && tile != finish)
            .collect();

        partial_shuffle(candidates, self.params.trap_count, |draw| {
            self.seed
                .domain(self.game_id, TAG_TRAP)
                .index(nonce as u64)
                .index(draw as u64)
                .finish()
        })
        .into_iter()
        .collect()
    }

    /// First connected trap layout and its nonce.
    pub fn search_traps(
        &self,
        start: TileIndex,
        finish: TileIndex,
        max_attempts: u32,
    ) -> Result<(BTreeSet<TileIndex>, u32), MapError> {
        let grid = self.grid();
        for nonce in 0..max_attempts {
            let traps = self.traps_at(start, finish, nonce);
            if is_connected(grid, start, finish, &traps) {
                return Ok((traps, nonce));
            }
            tracing::debug!(
                "Trap layout {} for game {} blocks the finish, retrying",
                nonce,
                self.game_id
            );
        }

        tracing::error!(
            "No connected trap layout for game {} after {} attempts",
            self.game_id,
            max_attempts
        );
        Err(MapError::NonceSearchExhausted {
            attempts: max_attempts,
        })
    }

    pub fn reward_count(&self) -> usize {
        let span = (self.params.max_reward_count - self.params.min_reward_count + 1) as u64;
        let extra = self.seed.domain(self.game_id, TAG_REWARD_COUNT).reduce(span) as usize;
        self.params.min_reward_count + extra
    }

    /// Raw tier roll for a tile, in `0..10000`.
    pub fn reward_roll(&self, tile: TileIndex) -> u64 {
        self.seed
            .domain(self.game_id, TAG_REWARD)
            .index(tile as u64)
            .reduce(BASIS_POINTS)
    }

    pub fn reward_for(&self, tile: TileIndex) -> Result<TileReward, MapError> {
        let roll = self.reward_roll(tile);
        let tier = RewardTier::from_roll(roll)
            .ok_or_else(|| MapError::invalid(format!("reward roll {} outside tier table", roll)))?;
        Ok(TileReward {
            tier,
            amount: tier.amount(self.params.bet_amount)?,
        })
    }

    pub fn rewards(
        &self,
        start: TileIndex,
        finish: TileIndex,
        traps: &BTreeSet<TileIndex>,
    ) -> Result<BTreeMap<TileIndex, TileReward>, MapError> {
        let candidates: Vec<TileIndex> = (0..self.grid().tile_count())
            .filter(|tile| *tile != start && *tile != finish && !traps.contains(tile))
            .collect();

        let count = self.reward_count();
        if count > candidates.len() {
            return Err(MapError::invalid(format!(
                "{} rewards do not fit in {} free tiles",
                count,
                candidates.len()
            )));
        }

        let tiles = partial_shuffle(candidates, count, |draw| {
            self.seed
                .domain(self.game_id, TAG_REWARD_POS)
                .index(draw as u64)
                .finish()
        });

        tiles
            .into_iter()
            .map(|tile| self.reward_for(tile).map(|reward| (tile, reward)))
            .collect()
    }

    /// Build the map around an already chosen trap layout.
    pub fn assemble(
        &self,
        start: TileIndex,
        finish: TileIndex,
        traps: BTreeSet<TileIndex>,
        map_nonce: u32,
    ) -> Result<GameMap, MapError> {
        let rewards = self.rewards(start, finish, &traps)?;
        Ok(GameMap {
            grid: self.grid(),
            start,
            finish,
            traps,
            rewards,
            map_nonce,
        })
    }
}

/// Fisher-Yates stopped after `take` draws. Draw `i` swaps slot `i` with
/// `i + (pivot(i) mod remaining)`; the first `take` slots are returned.
fn partial_shuffle<F>(mut items: Vec<TileIndex>, take: usize, pivot: F) -> Vec<TileIndex>
where
    F: Fn(usize) -> [u8; 32],
{
    let len = items.len();
    let take = take.min(len);
    for draw in 0..take {
        let remaining = (len - draw) as u64;
        let offset = crate::hash::reduce_mod(&pivot(draw), remaining) as usize;
        items.swap(draw, draw + offset);
    }
    items.truncate(take);
    items
}
