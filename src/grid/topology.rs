use serde::{Deserialize, Serialize};

/// Cell neighbourhood used for adjacency queries and gradient stencils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Adjacency {
    /// 4 neighbours: N, S, E, W.
    #[default]
    Rook,
    /// 8 neighbours: rook plus diagonals.
    Queen,
}

/// (row, col) offsets for the 4-neighbourhood. Row 0 is the northern edge.
pub const ROOK_OFFSETS: [(i32, i32); 4] = [
    (-1, 0), // North
    (0, 1),  // East
    (1, 0),  // South
    (0, -1), // West
];

/// (row, col) offsets for the 8-neighbourhood.
pub const QUEEN_OFFSETS: [(i32, i32); 8] = [
    (-1, 0),  // North
    (-1, 1),  // Northeast
    (0, 1),   // East
    (1, 1),   // Southeast
    (1, 0),   // South
    (1, -1),  // Southwest
    (0, -1),  // West
    (-1, -1), // Northwest
];

impl Adjacency {
    pub fn offsets(self) -> &'static [(i32, i32)] {
        match self {
            Adjacency::Rook => &ROOK_OFFSETS,
            Adjacency::Queen => &QUEEN_OFFSETS,
        }
    }
}

/// Resolve a (row, col) offset on an `nrows x ncols` grid.
///
/// Rows never wrap. Columns wrap only when `wrap_cols` is set (global lon/lat grids).
pub fn offset_index(
    nrows: u32,
    ncols: u32,
    row: u32,
    col: u32,
    dr: i32,
    dc: i32,
    wrap_cols: bool,
) -> Option<(u32, u32)> {
    let nr = row as i64 + dr as i64;
    if nr < 0 || nr >= nrows as i64 {
        return None;
    }
    let mut nc = col as i64 + dc as i64;
    if wrap_cols {
        nc = nc.rem_euclid(ncols as i64);
    } else if nc < 0 || nc >= ncols as i64 {
        return None;
    }
    Some((nr as u32, nc as u32))
}

/// Neighbour ids of every cell, in offset order, excluding out-of-grid positions.
///
/// On a wrapped grid narrower than 3 columns, east and west may resolve to the
/// same cell; duplicates and self-references are removed.
pub fn neighbor_table(nrows: u32, ncols: u32, adjacency: Adjacency, wrap_cols: bool) -> Vec<Vec<u32>> {
    let mut table = Vec::with_capacity((nrows * ncols) as usize);
    for row in 0..nrows {
        for col in 0..ncols {
            let id = row * ncols + col;
            let mut neighbors = Vec::with_capacity(adjacency.offsets().len());
            for &(dr, dc) in adjacency.offsets() {
                if let Some((nr, nc)) = offset_index(nrows, ncols, row, col, dr, dc, wrap_cols) {
                    let nid = nr * ncols + nc;
                    if nid != id && !neighbors.contains(&nid) {
                        neighbors.push(nid);
                    }
                }
            }
            table.push(neighbors);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};

    #[test]
    fn interior_cells_have_full_neighbourhoods() {
        let rook = neighbor_table(5, 5, Adjacency::Rook, false);
        let queen = neighbor_table(5, 5, Adjacency::Queen, false);
        assert_eq!(rook[12].len(), 4);
        assert_eq!(queen[12].len(), 8);
    }

    #[test]
    fn corner_cells_are_clipped_without_wrap() {
        let rook = neighbor_table(4, 4, Adjacency::Rook, false);
        let queen = neighbor_table(4, 4, Adjacency::Queen, false);
        assert_eq!(rook[0].len(), 2);
        assert_eq!(queen[0].len(), 3);
    }

    #[test]
    fn wrapped_columns_connect_east_and_west_edges() {
        let rook = neighbor_table(3, 4, Adjacency::Rook, true);
        // Cell 4 is (row 1, col 0); its west neighbour wraps to (1, 3) = 7
        assert!(rook[4].contains(&7), "neighbors of 4: {:?}", rook[4]);
        assert!(rook[7].contains(&4), "neighbors of 7: {:?}", rook[7]);
    }

    #[test]
    fn rows_never_wrap() {
        let rook = neighbor_table(3, 4, Adjacency::Rook, true);
        // Top row cell 1 must not see the bottom row
        assert!(!rook[1].iter().any(|&n| n >= 8), "neighbors of 1: {:?}", rook[1]);
    }

    #[test]
    fn neighbors_are_bidirectional() {
        for wrap in [false, true] {
            let table = neighbor_table(6, 7, Adjacency::Queen, wrap);
            for (id, neighbors) in table.iter().enumerate() {
                for &n in neighbors {
                    assert!(
                        table[n as usize].contains(&(id as u32)),
                        "Cell {} has neighbor {}, but not the reverse (wrap={})",
                        id,
                        n,
                        wrap
                    );
                }
            }
        }
    }

    #[test]
    fn no_self_or_duplicate_neighbors_on_narrow_wrapped_grid() {
        let table = neighbor_table(3, 2, Adjacency::Queen, true);
        for (id, neighbors) in table.iter().enumerate() {
            assert!(!neighbors.contains(&(id as u32)), "Cell {} is its own neighbor", id);
            let unique: HashSet<u32> = neighbors.iter().copied().collect();
            assert_eq!(unique.len(), neighbors.len(), "Cell {} has duplicates", id);
        }
    }

    #[test]
    fn all_cells_reachable() {
        let table = neighbor_table(8, 9, Adjacency::Rook, false);
        let total = table.len();
        let mut visited = vec![false; total];
        let mut queue = VecDeque::new();
        queue.push_back(0u32);
        visited[0] = true;
        let mut count = 1;

        while let Some(id) = queue.pop_front() {
            for &n in &table[id as usize] {
                if !visited[n as usize] {
                    visited[n as usize] = true;
                    count += 1;
                    queue.push_back(n);
                }
            }
        }

        assert_eq!(count, total, "Only {} of {} cells reachable", count, total);
    }
}
