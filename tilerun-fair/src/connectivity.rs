//! Trap-avoiding reachability between start and finish.

use crate::grid::{Grid, TileIndex};
use std::collections::{BTreeSet, VecDeque};

/// Breadth-first search over orthogonal neighbours, treating traps as walls.
///
/// Returns `false` straight away when either endpoint is itself a trap.
pub fn is_connected(
    grid: Grid,
    start: TileIndex,
    finish: TileIndex,
    traps: &BTreeSet<TileIndex>,
) -> bool {
    if !grid.contains(start) || !grid.contains(finish) {
        return false;
    }
    if traps.contains(&start) || traps.contains(&finish) {
        return false;
    }

    let mut visited = vec![false; grid.tile_count()];
    let mut queue = VecDeque::with_capacity(grid.tile_count());
    visited[start] = true;
    queue.push_back(start);

    while let Some(tile) = queue.pop_front() {
        if tile == finish {
            return true;
        }
        for next in grid.neighbors(tile) {
            if !visited[next] && !traps.contains(&next) {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traps(tiles: &[TileIndex]) -> BTreeSet<TileIndex> {
        tiles.iter().copied().collect()
    }

    #[test]
    fn test_open_grid_is_connected() {
        assert!(is_connected(Grid::new(5), 22, 2, &BTreeSet::new()));
    }

    #[test]
    fn test_isolated_corner_start() {
        // 20 is bottom-left; its only neighbours are 15 and 21
        let grid = Grid::new(5);
        assert!(!is_connected(grid, 20, 0, &traps(&[15, 21, 9])));
        assert!(is_connected(grid, 20, 0, &traps(&[6, 12, 18])));
    }

    #[test]
    fn test_full_wall_blocks() {
        let grid = Grid::new(5);
        assert!(!is_connected(grid, 22, 2, &traps(&[10, 11, 12, 13, 14])));
    }

    #[test]
    fn test_trap_on_endpoint() {
        let grid = Grid::new(5);
        assert!(!is_connected(grid, 22, 2, &traps(&[22])));
        assert!(!is_connected(grid, 22, 2, &traps(&[2])));
    }

    #[test]
    fn test_detour_around_partial_wall() {
        let grid = Grid::new(5);
        assert!(is_connected(grid, 22, 2, &traps(&[10, 11, 12, 13])));
    }
}
