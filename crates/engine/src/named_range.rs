//! Named ranges: user-defined names for cells and rectangles.
//!
//! Names are matched case-insensitively (the parser uppercases
//! identifiers, users type whatever they like).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sheet::SheetId;

/// What a name points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamedRangeTarget {
    Cell {
        sheet: SheetId,
        row: usize,
        col: usize,
    },
    Range {
        sheet: SheetId,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRange {
    pub name: String,
    pub target: NamedRangeTarget,
}

impl NamedRange {
    pub fn cell(name: &str, sheet: SheetId, row: usize, col: usize) -> Self {
        Self {
            name: name.to_string(),
            target: NamedRangeTarget::Cell { sheet, row, col },
        }
    }

    pub fn range(
        name: &str,
        sheet: SheetId,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            target: NamedRangeTarget::Range {
                sheet,
                start_row: start_row.min(end_row),
                start_col: start_col.min(end_col),
                end_row: start_row.max(end_row),
                end_col: start_col.max(end_col),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamedRangeError {
    #[error("invalid name '{0}': must start with a letter or underscore")]
    InvalidName(String),
    #[error("name '{0}' collides with a cell reference")]
    LooksLikeCellRef(String),
    #[error("name '{0}' is already defined")]
    Duplicate(String),
    #[error("no named range '{0}'")]
    NotFound(String),
}

fn normalize(name: &str) -> String {
    name.trim().to_uppercase()
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A name like "A1" would shadow every reference to that cell.
fn looks_like_cell_ref(name: &str) -> bool {
    crate::cell_id::parse_ref(name).is_ok()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedRangeStore {
    /// Keyed by normalized (uppercase) name.
    entries: FxHashMap<String, NamedRange>,
}

impl NamedRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine a name.
    pub fn set(&mut self, range: NamedRange) -> Result<(), NamedRangeError> {
        let trimmed = range.name.trim();
        if !is_valid_name(trimmed) {
            return Err(NamedRangeError::InvalidName(range.name));
        }
        if looks_like_cell_ref(trimmed) {
            return Err(NamedRangeError::LooksLikeCellRef(range.name));
        }
        self.entries.insert(normalize(trimmed), range);
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&NamedRange> {
        self.entries.get(&normalize(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<NamedRange> {
        self.entries.remove(&normalize(name))
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<(), NamedRangeError> {
        let new_trimmed = new_name.trim();
        if !is_valid_name(new_trimmed) {
            return Err(NamedRangeError::InvalidName(new_name.to_string()));
        }
        if looks_like_cell_ref(new_trimmed) {
            return Err(NamedRangeError::LooksLikeCellRef(new_name.to_string()));
        }
        if self.entries.contains_key(&normalize(new_trimmed)) {
            return Err(NamedRangeError::Duplicate(new_name.to_string()));
        }
        let mut entry = self
            .entries
            .remove(&normalize(old_name))
            .ok_or_else(|| NamedRangeError::NotFound(old_name.to_string()))?;
        entry.name = new_trimmed.to_string();
        self.entries.insert(normalize(new_trimmed), entry);
        Ok(())
    }

    pub fn list(&self) -> Vec<&NamedRange> {
        let mut all: Vec<&NamedRange> = self.entries.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all names targeting a deleted sheet.
    pub fn remove_sheet(&mut self, sheet: SheetId) {
        self.entries.retain(|_, nr| match nr.target {
            NamedRangeTarget::Cell { sheet: s, .. } => s != sheet,
            NamedRangeTarget::Range { sheet: s, .. } => s != sheet,
        });
    }
}
