//! The ZIA routing map being discovered, and the checkpoint document it is saved in.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The physical signal that drives one ZIA choice slot
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingSource {
    DedicatedInput,
    /// Macrocell feedback
    Macrocell { fb: u32, mc: u32 },
    /// Pad input buffer, numbered `fb * macrocells_per_block + mc`
    InputBuffer { pad: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub slot: usize,
}

impl CellIndex {
    pub const fn new(row: usize, slot: usize) -> Self {
        Self { row, slot }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "row {} choice {}", self.row, self.slot)
    }
}

/// ZIA row × choice slot → source, `None` while unknown.  Serialized as a nested array, row
/// major, with `null` for unknown cells.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingMap {
    cells: Vec<Vec<Option<RoutingSource>>>,
}

impl RoutingMap {
    pub fn new(rows: usize, slots: usize) -> Self {
        Self {
            cells: vec![vec![None; slots]; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn slots(&self) -> usize {
        self.cells.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        cell.row < self.rows() && cell.slot < self.cells[cell.row].len()
    }

    pub fn get(&self, cell: CellIndex) -> Option<RoutingSource> {
        self.cells.get(cell.row).and_then(|r| r.get(cell.slot)).copied().flatten()
    }

    pub fn set(&mut self, cell: CellIndex, source: RoutingSource) {
        self.cells[cell.row][cell.slot] = Some(source);
    }

    pub fn row(&self, row: usize) -> &[Option<RoutingSource>] {
        &self.cells[row]
    }

    pub fn resolved(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Fail unless the map is `rows` × `slots` and rectangular
    pub fn check_dims(&self, rows: usize, slots: usize) -> Result<()> {
        if self.cells.len() != rows || self.cells.iter().any(|r| r.len() != slots) {
            return Err(Error::checkpoint(format!(
                "map is {}x{}, device has {rows}x{slots}",
                self.rows(),
                self.slots()
            )));
        }
        Ok(())
    }
}

/// Everything needed to resume a discovery run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub map: RoutingMap,
    /// Cell being probed when the checkpoint was written
    #[serde(default)]
    pub cursor: Option<CellIndex>,
    /// Cells no search phase could resolve; these need manual review
    #[serde(default)]
    pub exhausted: BTreeSet<CellIndex>,
}

impl Checkpoint {
    pub fn new(rows: usize, slots: usize) -> Self {
        Self {
            map: RoutingMap::new(rows, slots),
            cursor: None,
            exhausted: BTreeSet::new(),
        }
    }
}
