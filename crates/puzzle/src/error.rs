//! Rejection conditions reported by the puzzle engine.

use std::fmt;

/// Why a snapshot could not be built or a choice could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// The target cell already holds a value.
    DuplicateAssignment,
    /// The cell index is outside `1..=cell_count`.
    IndexOutOfRange,
    /// The value is outside `1..=side` (or `0..=side` for raw values).
    ValueOutOfRange,
    /// The value already appears in the cell's row, column or tile.
    Conflict,
    /// After the assignment some empty cell has no possible value left.
    Unsolvable,
    /// The geometry code is not one this engine understands.
    UnknownGeometry,
    /// The raw value list does not describe a square grid.
    MalformedValues,
    /// No catalog entry has the requested name.
    PuzzleNotFound,
}

impl Condition {
    /// Wire name of the condition, as sent to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateAssignment => "DuplicateAssignmentCondition",
            Self::IndexOutOfRange => "IndexOutOfRangeCondition",
            Self::ValueOutOfRange => "ValueOutOfRangeCondition",
            Self::Conflict => "ConflictCondition",
            Self::Unsolvable => "UnsolvableCondition",
            Self::UnknownGeometry => "UnknownGeometryCondition",
            Self::MalformedValues => "MalformedValuesCondition",
            Self::PuzzleNotFound => "PuzzleNotFoundCondition",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An engine rejection: the condition, its detail integers and a message.
///
/// `values` carries the offending index/value pairs in the order documented
/// on each constructor, so clients can highlight cells without parsing text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{condition}: {message}")]
pub struct PuzzleError {
    pub condition: Condition,
    pub values: Vec<i64>,
    pub message: String,
}

impl PuzzleError {
    pub fn new(condition: Condition, values: Vec<i64>, message: impl Into<String>) -> Self {
        Self {
            condition,
            values,
            message: message.into(),
        }
    }

    /// Values: `[index, assigned]`.
    pub fn duplicate_assignment(index: usize, assigned: u8) -> Self {
        Self::new(
            Condition::DuplicateAssignment,
            vec![index as i64, i64::from(assigned)],
            format!("square {index} is already assigned the value {assigned}"),
        )
    }

    /// Values: `[index]`.
    pub fn index_out_of_range(index: i64, cell_count: usize) -> Self {
        Self::new(
            Condition::IndexOutOfRange,
            vec![index],
            format!("square index {index} is not in 1..={cell_count}"),
        )
    }

    /// Values: `[index, value]`.
    pub fn value_out_of_range(index: i64, value: i64, side: u8) -> Self {
        Self::new(
            Condition::ValueOutOfRange,
            vec![index, value],
            format!("value {value} for square {index} is not in 1..={side}"),
        )
    }

    /// Values: `[index, value, conflicting_index]`.
    pub fn conflict(index: usize, value: u8, other: usize) -> Self {
        Self::new(
            Condition::Conflict,
            vec![index as i64, i64::from(value), other as i64],
            format!("value {value} for square {index} is already present in square {other}"),
        )
    }

    /// Values: `[index, value, dead_index]`.
    pub fn unsolvable(index: usize, value: u8, dead: usize) -> Self {
        Self::new(
            Condition::Unsolvable,
            vec![index as i64, i64::from(value), dead as i64],
            format!("assigning {value} to square {index} leaves square {dead} with no candidates"),
        )
    }

    pub fn puzzle_not_found(name: &str) -> Self {
        Self::new(
            Condition::PuzzleNotFound,
            Vec::new(),
            format!("no puzzle named {name:?}"),
        )
    }
}
