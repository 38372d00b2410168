//! Named puzzle catalog.
//!
//! Built-in entries are rated `1-star` (easiest) to `6-star`. Deployments may
//! add or replace entries from a TOML file:
//!
//! ```toml
//! [[puzzles]]
//! name = "mini"
//! values = [1, 1, 2, 0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 3]
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{PuzzleError, Snapshot};

/// Puzzle new sessions start on.
pub const DEFAULT_PUZZLE: &str = "1-star";

/// Built-in catalog entry in raw value form.
#[derive(Clone, Copy, Debug)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub values: &'static [i32],
}

/// Standard 9x9 puzzles, each with a unique solution.
pub const BUILTIN_PUZZLES: &[CatalogEntry] = &[
    CatalogEntry {
        name: "1-star",
        values: &[
            1, //
            0, 0, 0, 5, 1, 8, 4, 0, 0, //
            0, 0, 9, 0, 7, 0, 5, 0, 8, //
            1, 5, 8, 0, 0, 9, 2, 0, 0, //
            6, 3, 4, 0, 8, 0, 0, 9, 5, //
            8, 7, 0, 1, 0, 0, 0, 6, 0, //
            9, 0, 5, 3, 6, 4, 0, 0, 2, //
            0, 0, 0, 0, 0, 0, 0, 0, 0, //
            0, 0, 7, 9, 4, 1, 6, 0, 3, //
            2, 6, 3, 0, 0, 7, 0, 4, 0, //
        ],
    },
    CatalogEntry {
        name: "2-star",
        values: &[
            1, //
            0, 0, 5, 1, 4, 0, 0, 2, 0, //
            0, 3, 0, 0, 0, 0, 0, 4, 1, //
            4, 0, 9, 0, 0, 6, 5, 8, 7, //
            0, 0, 0, 4, 0, 3, 7, 0, 2, //
            0, 0, 0, 0, 6, 7, 0, 5, 0, //
            0, 0, 7, 0, 5, 1, 0, 0, 4, //
            0, 0, 0, 0, 1, 4, 2, 3, 0, //
            0, 9, 0, 0, 7, 0, 4, 1, 0, //
            1, 5, 0, 0, 0, 0, 8, 0, 6, //
        ],
    },
    CatalogEntry {
        name: "3-star",
        values: &[
            1, //
            7, 6, 0, 5, 0, 3, 1, 9, 4, //
            0, 4, 9, 7, 0, 0, 5, 0, 0, //
            5, 0, 0, 1, 0, 0, 0, 2, 0, //
            0, 0, 0, 0, 1, 0, 2, 4, 0, //
            0, 0, 0, 3, 0, 6, 0, 0, 1, //
            0, 0, 0, 0, 7, 0, 3, 0, 0, //
            0, 0, 1, 6, 0, 0, 0, 0, 9, //
            8, 0, 0, 4, 0, 0, 0, 0, 3, //
            0, 3, 7, 0, 9, 0, 0, 1, 0, //
        ],
    },
    CatalogEntry {
        name: "4-star",
        values: &[
            1, //
            0, 0, 0, 8, 5, 7, 0, 0, 0, //
            6, 0, 0, 0, 9, 1, 0, 0, 8, //
            5, 0, 7, 2, 0, 0, 0, 0, 0, //
            0, 0, 0, 0, 0, 0, 0, 8, 0, //
            0, 7, 0, 0, 0, 0, 6, 0, 1, //
            8, 0, 5, 1, 0, 0, 0, 3, 0, //
            0, 5, 0, 0, 4, 0, 0, 0, 0, //
            0, 0, 2, 0, 7, 0, 8, 0, 0, //
            4, 6, 8, 9, 0, 0, 0, 7, 5, //
        ],
    },
    CatalogEntry {
        name: "5-star",
        values: &[
            1, //
            0, 0, 0, 9, 0, 0, 0, 0, 0, //
            0, 7, 9, 3, 1, 4, 0, 0, 0, //
            0, 0, 0, 6, 5, 0, 2, 0, 0, //
            0, 0, 0, 0, 0, 7, 0, 9, 0, //
            0, 6, 2, 0, 0, 1, 0, 0, 0, //
            1, 0, 4, 8, 0, 5, 7, 0, 0, //
            6, 0, 0, 1, 0, 0, 0, 0, 5, //
            3, 0, 0, 0, 8, 0, 0, 0, 1, //
            0, 2, 0, 0, 0, 3, 0, 0, 0, //
        ],
    },
    CatalogEntry {
        name: "6-star",
        values: &[
            1, //
            0, 2, 0, 0, 0, 0, 0, 0, 0, //
            0, 0, 0, 1, 0, 0, 4, 9, 0, //
            0, 0, 7, 0, 0, 6, 0, 0, 1, //
            1, 0, 3, 2, 5, 0, 9, 0, 0, //
            0, 0, 0, 0, 9, 8, 0, 0, 0, //
            0, 0, 0, 0, 0, 0, 0, 0, 2, //
            4, 7, 0, 0, 8, 0, 0, 2, 0, //
            0, 0, 9, 0, 0, 0, 0, 0, 0, //
            0, 1, 6, 5, 7, 4, 0, 0, 0, //
        ],
    },
];

/// Error loading catalog entries from TOML.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to parse puzzle file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("puzzle {name:?} is invalid: {source}")]
    Invalid {
        name: String,
        #[source]
        source: PuzzleError,
    },

    #[error("puzzle name must not be empty")]
    EmptyName,
}

#[derive(Deserialize)]
struct PuzzleFile {
    #[serde(default)]
    puzzles: Vec<PuzzleFileEntry>,
}

#[derive(Deserialize)]
struct PuzzleFileEntry {
    name: String,
    values: Vec<i32>,
}

/// Validated puzzles by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    puzzles: BTreeMap<String, Snapshot>,
}

impl Catalog {
    /// Catalog holding the built-in puzzles.
    pub fn with_builtins() -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for entry in BUILTIN_PUZZLES {
            catalog.insert(entry.name, entry.values)?;
        }
        Ok(catalog)
    }

    /// Validate and add (or replace) a puzzle.
    pub fn insert(&mut self, name: &str, values: &[i32]) -> Result<(), CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        let snapshot = Snapshot::from_values(values).map_err(|source| CatalogError::Invalid {
            name: name.to_string(),
            source,
        })?;
        self.puzzles.insert(name.to_string(), snapshot);
        Ok(())
    }

    /// Add every `[[puzzles]]` entry of a TOML document. Returns how many
    /// entries were loaded; nothing is added if any entry is invalid.
    pub fn load_toml(&mut self, text: &str) -> Result<usize, CatalogError> {
        let file: PuzzleFile = toml::from_str(text)?;
        let mut staged = self.clone();
        for entry in &file.puzzles {
            staged.insert(&entry.name, &entry.values)?;
        }
        *self = staged;
        Ok(file.puzzles.len())
    }

    pub fn get(&self, name: &str) -> Result<Snapshot, PuzzleError> {
        self.puzzles
            .get(name.trim())
            .cloned()
            .ok_or_else(|| PuzzleError::puzzle_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.puzzles.contains_key(name.trim())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.puzzles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.puzzles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puzzles.is_empty()
    }
}
