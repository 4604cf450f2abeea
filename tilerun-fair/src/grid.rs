//! Square grid geometry.
//!
//! Tiles are indexed row-major (`row * width + col`). Row 0 is the top row
//! where the finish lives; row `width - 1` is the bottom row where the token
//! starts. Moving "forward" means moving to a smaller row number.

use serde::{Deserialize, Serialize};

pub type TileIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
}

impl Grid {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn tile_count(&self) -> usize {
        self.width * self.width
    }

    pub fn contains(&self, tile: TileIndex) -> bool {
        tile < self.tile_count()
    }

    pub fn row(&self, tile: TileIndex) -> usize {
        tile / self.width
    }

    pub fn col(&self, tile: TileIndex) -> usize {
        tile % self.width
    }

    pub fn tile(&self, row: usize, col: usize) -> TileIndex {
        row * self.width + col
    }

    /// Candidate start tiles, left to right.
    pub fn bottom_row(&self) -> Vec<TileIndex> {
        let row = self.width - 1;
        (0..self.width).map(|col| self.tile(row, col)).collect()
    }

    /// Candidate finish tiles, left to right.
    pub fn top_row(&self) -> Vec<TileIndex> {
        (0..self.width).map(|col| self.tile(0, col)).collect()
    }

    /// How many rows `tile` sits above the start row.
    pub fn progress(&self, tile: TileIndex) -> usize {
        self.width - 1 - self.row(tile)
    }

    /// Orthogonal neighbours in N, E, S, W order.
    pub fn neighbors(&self, tile: TileIndex) -> impl Iterator<Item = TileIndex> + '_ {
        let row = self.row(tile);
        let col = self.col(tile);
        let candidates = [
            (row.wrapping_sub(1), col),
            (row, col + 1),
            (row + 1, col),
            (row, col.wrapping_sub(1)),
        ];
        // wrapping_sub underflows to usize::MAX, which the bounds check drops
        candidates
            .into_iter()
            .filter(move |&(r, c)| r < self.width && c < self.width)
            .map(move |(r, c)| self.tile(r, c))
    }

    pub fn is_adjacent(&self, a: TileIndex, b: TileIndex) -> bool {
        let (ra, ca) = (self.row(a), self.col(a));
        let (rb, cb) = (self.row(b), self.col(b));
        ra.abs_diff(rb) + ca.abs_diff(cb) == 1
    }
}
