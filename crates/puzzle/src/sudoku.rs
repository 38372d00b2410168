//! Sudoku assignment rules over the named catalog.

use crate::{Catalog, Choice, PuzzleEngine, PuzzleError, Snapshot};

/// Puzzle engine backed by a [`Catalog`].
#[derive(Debug, Clone)]
pub struct Sudoku {
    catalog: Catalog,
}

impl Sudoku {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl PuzzleEngine for Sudoku {
    fn initial_snapshot(&self, name: &str) -> Result<Snapshot, PuzzleError> {
        self.catalog.get(name)
    }

    /// Checks, in order: index range, value range, cell already assigned,
    /// row/column/tile conflict, and finally that every empty cell still has
    /// at least one possible value.
    fn apply(&self, snapshot: &Snapshot, choice: Choice) -> Result<Snapshot, PuzzleError> {
        let Choice { index, value } = choice;

        let Some(current) = snapshot.value(index) else {
            return Err(PuzzleError::index_out_of_range(
                index as i64,
                snapshot.cell_count(),
            ));
        };
        if value == 0 || value > snapshot.side() {
            return Err(PuzzleError::value_out_of_range(
                index as i64,
                i64::from(value),
                snapshot.side(),
            ));
        }
        if current != 0 {
            return Err(PuzzleError::duplicate_assignment(index, current));
        }

        let position = index - 1;
        if let Some(other) = snapshot.conflicting_peer(position, value) {
            return Err(PuzzleError::conflict(index, value, other + 1));
        }

        let next = snapshot.with_assignment(position, value);
        if let Some(dead) = (0..next.cell_count())
            .find(|&p| next.value(p + 1) == Some(0) && next.candidates(p).is_empty())
        {
            return Err(PuzzleError::unsolvable(index, value, dead + 1));
        }

        Ok(next)
    }
}
