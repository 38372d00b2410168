//! Susen Wire Types
//!
//! JSON bodies exchanged between the browser solver and the session server.
//! Field names are PascalCase (`Index`, `Aval`, ...) because that is what the
//! existing browser client reads and writes.
//!
//! # Bodies
//!
//! - [`SquareBody`]: one cell of the current puzzle (response)
//! - [`ChoiceBody`]: a proposed assignment (`POST /api/assign` request)
//! - [`ErrorBody`]: a structured rejection (400/404 response)
//! - [`StateBody`]: raw values plus history position (`GET /api/state`)

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use susen_puzzle::{Choice, Condition, PuzzleError, Snapshot, Square};

/// Condition name for a request body that is not a valid choice.
pub const MALFORMED_CHOICE_CONDITION: &str = "MalformedChoiceCondition";

// ============================================================================
// Squares
// ============================================================================

/// One cell: its 1-based index, assigned value (0 if none), and the values
/// still possible when unassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SquareBody {
    pub index: usize,
    pub aval: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pvals: Vec<u8>,
}

impl From<Square> for SquareBody {
    fn from(square: Square) -> Self {
        Self {
            index: square.index,
            aval: square.aval,
            pvals: square.pvals,
        }
    }
}

/// Squares of a snapshot, in index order.
pub fn squares(snapshot: &Snapshot) -> Vec<SquareBody> {
    snapshot.squares().into_iter().map(Into::into).collect()
}

// ============================================================================
// Choice
// ============================================================================

/// Proposed assignment as sent by the client.
///
/// Fields are signed so that nonsense input still deserializes and is
/// rejected with a range condition rather than a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceBody {
    pub index: i64,
    pub value: i64,
}

impl TryFrom<ChoiceBody> for Choice {
    type Error = PuzzleError;

    fn try_from(body: ChoiceBody) -> Result<Self, Self::Error> {
        let index = usize::try_from(body.index).map_err(|_| {
            PuzzleError::new(
                Condition::IndexOutOfRange,
                vec![body.index],
                format!("square index {} is negative", body.index),
            )
        })?;
        let value = u8::try_from(body.value).map_err(|_| {
            PuzzleError::new(
                Condition::ValueOutOfRange,
                vec![body.index, body.value],
                format!("value {} for square {} is out of range", body.value, body.index),
            )
        })?;
        Ok(Choice { index, value })
    }
}

impl From<Choice> for ChoiceBody {
    fn from(choice: Choice) -> Self {
        Self {
            index: choice.index as i64,
            value: i64::from(choice.value),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Structured rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody {
    pub condition: String,
    #[serde(default)]
    pub values: Vec<i64>,
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    pub fn malformed_choice(message: impl Into<String>) -> Self {
        Self {
            condition: MALFORMED_CHOICE_CONDITION.to_string(),
            values: Vec::new(),
            message: message.into(),
        }
    }
}

impl From<&PuzzleError> for ErrorBody {
    fn from(err: &PuzzleError) -> Self {
        Self {
            condition: err.condition.as_str().to_string(),
            values: err.values.clone(),
            message: err.message.clone(),
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Raw values of the current snapshot and where it sits in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateBody {
    pub geometry: i32,
    pub side_length: u8,
    pub values: Vec<i32>,
    /// 0-based position of the current snapshot in the history.
    pub cursor: usize,
    /// Number of snapshots in the history.
    pub depth: usize,
}

impl StateBody {
    pub fn new(snapshot: &Snapshot, cursor: usize, depth: usize) -> Self {
        Self {
            geometry: snapshot.geometry().code(),
            side_length: snapshot.side(),
            values: snapshot.to_values(),
            cursor,
            depth,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
