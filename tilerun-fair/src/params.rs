use crate::error::MapError;
use crate::grid::Grid;
use serde::{Deserialize, Serialize};

pub const BASIS_POINTS: u64 = 10_000;

/// Supported grid widths and their fixed layouts: (width, traps, min rewards, max rewards).
const LAYOUTS: [(usize, usize, usize, usize); 3] = [(5, 3, 3, 5), (6, 5, 4, 6), (7, 7, 5, 8)];

/// Per-game settings, fixed when the bet is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameParameters {
    pub grid_width: usize,
    pub trap_count: usize,
    pub min_reward_count: usize,
    pub max_reward_count: usize,
    pub bet_amount: u64,
    /// House cut taken from a winning payout, in basis points.
    pub house_fee_bps: u64,
}

impl GameParameters {
    /// Canonical parameters for a supported width.
    pub fn standard(grid_width: usize, bet_amount: u64, house_fee_bps: u64) -> Result<Self, MapError> {
        let (_, trap_count, min_reward_count, max_reward_count) = LAYOUTS
            .iter()
            .copied()
            .find(|(width, ..)| *width == grid_width)
            .ok_or_else(|| MapError::invalid(format!("unsupported grid width {}", grid_width)))?;

        let params = Self {
            grid_width,
            trap_count,
            min_reward_count,
            max_reward_count,
            bet_amount,
            house_fee_bps,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn grid(&self) -> Grid {
        Grid::new(self.grid_width)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        let (_, traps, min, max) = LAYOUTS
            .iter()
            .copied()
            .find(|(width, ..)| *width == self.grid_width)
            .ok_or_else(|| MapError::invalid(format!("unsupported grid width {}", self.grid_width)))?;

        if self.trap_count != traps {
            return Err(MapError::invalid(format!(
                "width {} requires {} traps, got {}",
                self.grid_width, traps, self.trap_count
            )));
        }
        if self.min_reward_count != min || self.max_reward_count != max {
            return Err(MapError::invalid(format!(
                "width {} requires {}..={} rewards",
                self.grid_width, min, max
            )));
        }
        if self.bet_amount == 0 {
            return Err(MapError::invalid("bet amount must be greater than 0"));
        }
        if self.house_fee_bps >= BASIS_POINTS {
            return Err(MapError::invalid("house fee must be below 100%"));
        }
        Ok(())
    }

    /// Winning payout after the house fee.
    pub fn payout_for(&self, collected: u64) -> u64 {
        let kept = BASIS_POINTS - self.house_fee_bps;
        (collected as u128 * kept as u128 / BASIS_POINTS as u128) as u64
    }
}

/// One of seven reward bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RewardTier {
    Tenth,
    Fifth,
    Half,
    Even,
    Double,
    Five,
    Ten,
}

/// (tier, cumulative threshold out of 10000, multiplier in basis points)
const TIER_TABLE: [(RewardTier, u64, u64); 7] = [
    (RewardTier::Tenth, 3_500, 1_000),
    (RewardTier::Fifth, 6_000, 2_000),
    (RewardTier::Half, 8_000, 5_000),
    (RewardTier::Even, 9_200, 10_000),
    (RewardTier::Double, 9_700, 20_000),
    (RewardTier::Five, 9_950, 50_000),
    (RewardTier::Ten, 10_000, 100_000),
];

impl RewardTier {
    /// Map a roll in `0..10000` onto its tier; `None` past the table.
    pub fn from_roll(roll: u64) -> Option<Self> {
        TIER_TABLE
            .iter()
            .find(|(_, threshold, _)| roll < *threshold)
            .map(|(tier, ..)| *tier)
    }

    pub fn multiplier_bps(&self) -> u64 {
        TIER_TABLE
            .iter()
            .find(|(tier, ..)| tier == self)
            .map(|(_, _, bps)| *bps)
            .unwrap_or(0)
    }

    pub fn amount(&self, bet: u64) -> Result<u64, MapError> {
        let amount = bet as u128 * self.multiplier_bps() as u128 / BASIS_POINTS as u128;
        u64::try_from(amount).map_err(|_| MapError::RewardOverflow { bet })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RewardTier::Tenth => "0.1x",
            RewardTier::Fifth => "0.2x",
            RewardTier::Half => "0.5x",
            RewardTier::Even => "1x",
            RewardTier::Double => "2x",
            RewardTier::Five => "5x",
            RewardTier::Ten => "10x",
        }
    }
}
