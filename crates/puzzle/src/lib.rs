//! Susen Puzzle Engine
//!
//! This crate holds the sudoku rules the session service delegates to. It is
//! pure: no I/O, no clocks, no shared state. Every operation takes a
//! [`Snapshot`] by reference and, on success, returns a new one.
//!
//! # Value Form
//!
//! Puzzles travel in a flat "raw values" form: the first element is the
//! geometry code, followed by one entry per cell in row-major order, with `0`
//! meaning unassigned. Cells are therefore addressed 1-based, so that a cell's
//! index equals its position in the raw form.
//!
//! # Modules
//!
//! - [`sudoku`]: the [`PuzzleEngine`] implementation
//! - [`catalog`]: named puzzles, built-in and loaded from TOML
//! - [`error`]: rejection conditions

#![deny(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod sudoku;

use std::sync::Arc;

pub use catalog::{Catalog, CatalogError, DEFAULT_PUZZLE};
pub use error::{Condition, PuzzleError};
pub use sudoku::Sudoku;

// ============================================================================
// Core Types
// ============================================================================

/// Intent to assign `value` to the cell at 1-based `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub index: usize,
    pub value: u8,
}

/// One cell as presented to clients.
///
/// `pvals` lists the values still possible for an unassigned cell and is
/// empty for an assigned one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Square {
    pub index: usize,
    pub aval: u8,
    pub pvals: Vec<u8>,
}

/// Grid layout, identified on the wire by its geometry code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geometry {
    /// Side length is a perfect square; tiles are `sqrt(side)` on each edge.
    Standard,
}

impl Geometry {
    pub const STANDARD_CODE: i32 = 1;

    pub fn code(&self) -> i32 {
        match self {
            Self::Standard => Self::STANDARD_CODE,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::STANDARD_CODE => Some(Self::Standard),
            _ => None,
        }
    }
}

/// Smallest and largest supported tile edge (4x4 up to 25x25 grids).
const MIN_TILE: usize = 2;
const MAX_TILE: usize = 5;

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable puzzle state: geometry plus one value per cell.
///
/// Cell storage is shared, so cloning a snapshot is cheap; no method mutates
/// a snapshot in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    geometry: Geometry,
    side: u8,
    tile: u8,
    cells: Arc<[u8]>,
}

impl Snapshot {
    /// Build a snapshot from the raw value form.
    ///
    /// Rejects unknown geometry codes, cell counts that are not a supported
    /// square grid, out-of-range values and givens that conflict.
    pub fn from_values(values: &[i32]) -> Result<Self, PuzzleError> {
        let Some((&code, raw_cells)) = values.split_first() else {
            return Err(PuzzleError::new(
                Condition::MalformedValues,
                Vec::new(),
                "value list is empty",
            ));
        };

        let geometry = Geometry::from_code(code).ok_or_else(|| {
            PuzzleError::new(
                Condition::UnknownGeometry,
                vec![i64::from(code)],
                format!("geometry code {code} is not supported"),
            )
        })?;

        let count = raw_cells.len();
        let tile = (MIN_TILE..=MAX_TILE)
            .find(|t| t * t * t * t == count)
            .ok_or_else(|| {
                PuzzleError::new(
                    Condition::MalformedValues,
                    vec![count as i64],
                    format!("{count} cells do not form a supported square grid"),
                )
            })?;
        let side = tile * tile;

        let mut cells = Vec::with_capacity(count);
        for (offset, &raw) in raw_cells.iter().enumerate() {
            match u8::try_from(raw) {
                Ok(value) if usize::from(value) <= side => cells.push(value),
                _ => {
                    return Err(PuzzleError::value_out_of_range(
                        offset as i64 + 1,
                        i64::from(raw),
                        side as u8,
                    ));
                }
            }
        }

        let snapshot = Self {
            geometry,
            side: side as u8,
            tile: tile as u8,
            cells: cells.into(),
        };

        for position in 0..count {
            let value = snapshot.cells[position];
            if value == 0 {
                continue;
            }
            if let Some(other) = snapshot.conflicting_peer(position, value) {
                return Err(PuzzleError::conflict(position + 1, value, other + 1));
            }
        }

        Ok(snapshot)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of cells along one edge of the grid.
    pub fn side(&self) -> u8 {
        self.side
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Value at 1-based `index` (0 = unassigned), or `None` if out of range.
    pub fn value(&self, index: usize) -> Option<u8> {
        index
            .checked_sub(1)
            .and_then(|position| self.cells.get(position).copied())
    }

    /// True when the cell at `index` exists and holds a value.
    pub fn is_assigned(&self, index: usize) -> bool {
        self.value(index).is_some_and(|v| v != 0)
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(|&v| v != 0)
    }

    /// Raw value form: geometry code followed by the cells.
    pub fn to_values(&self) -> Vec<i32> {
        std::iter::once(self.geometry.code())
            .chain(self.cells.iter().map(|&v| i32::from(v)))
            .collect()
    }

    /// All cells in index order, with possible values for unassigned ones.
    pub fn squares(&self) -> Vec<Square> {
        (0..self.cells.len())
            .map(|position| {
                let aval = self.cells[position];
                let pvals = if aval == 0 {
                    self.candidates(position)
                } else {
                    Vec::new()
                };
                Square {
                    index: position + 1,
                    aval,
                    pvals,
                }
            })
            .collect()
    }

    // ========================================================================
    // Internal Methods (0-based positions)
    // ========================================================================

    /// Copy of this snapshot with one more cell assigned.
    pub(crate) fn with_assignment(&self, position: usize, value: u8) -> Self {
        let mut cells = self.cells.to_vec();
        cells[position] = value;
        Self {
            cells: cells.into(),
            ..self.clone()
        }
    }

    /// Values not yet used by any peer of `position`.
    pub(crate) fn candidates(&self, position: usize) -> Vec<u8> {
        let mut used = vec![false; usize::from(self.side) + 1];
        for peer in self.peers(position) {
            used[usize::from(self.cells[peer])] = true;
        }
        (1..=self.side).filter(|&v| !used[usize::from(v)]).collect()
    }

    /// First peer of `position` already holding `value`.
    pub(crate) fn conflicting_peer(&self, position: usize, value: u8) -> Option<usize> {
        self.peers(position).find(|&peer| self.cells[peer] == value)
    }

    /// Every other cell sharing a row, column or tile with `position`.
    ///
    /// Cells in both the tile and the row/column are yielded twice; callers
    /// only test membership.
    fn peers(&self, position: usize) -> impl Iterator<Item = usize> + '_ {
        let side = usize::from(self.side);
        let tile = usize::from(self.tile);
        let (row, col) = (position / side, position % side);
        let (tile_row, tile_col) = (row - row % tile, col - col % tile);

        let row_cells = (0..side).map(move |c| row * side + c);
        let col_cells = (0..side).map(move |r| r * side + col);
        let tile_cells =
            (0..side).map(move |k| (tile_row + k / tile) * side + tile_col + k % tile);

        row_cells
            .chain(col_cells)
            .chain(tile_cells)
            .filter(move |&p| p != position)
    }
}

// ============================================================================
// Engine Seam
// ============================================================================

/// The operations the session service consumes from a puzzle engine.
///
/// Implementations must leave their inputs untouched: a failed `apply`
/// reports a condition and the caller keeps its current snapshot.
pub trait PuzzleEngine: Send + Sync {
    /// Root snapshot of the named puzzle.
    fn initial_snapshot(&self, name: &str) -> Result<Snapshot, PuzzleError>;

    /// Snapshot that results from applying `choice` to `snapshot`.
    fn apply(&self, snapshot: &Snapshot, choice: Choice) -> Result<Snapshot, PuzzleError>;
}

// ============================================================================
// Tests
// ============================================================================
