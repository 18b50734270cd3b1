//! Per-bag solution tables in their two interchangeable layouts.
mod array;
mod tree;

pub use array::ArraySolution;
pub use tree::TreeSolution;

/// One fragment of a bag's solution table, covering the assignment-id range
/// `[min_id, max_id)` of that bag. Bags whose assignment space exceeds the
/// memory budget are split into several fragments with consecutive ranges.
#[derive(Debug)]
pub enum SolutionTable {
    Array(ArraySolution),
    Tree(TreeSolution),
}

impl SolutionTable {
    #[must_use]
    pub fn min_id(&self) -> u64 {
        match self {
            SolutionTable::Array(table) => table.min_id(),
            SolutionTable::Tree(table) => table.min_id(),
        }
    }

    #[must_use]
    pub fn max_id(&self) -> u64 {
        match self {
            SolutionTable::Array(table) => table.max_id(),
            SolutionTable::Tree(table) => table.max_id(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        (self.min_id()..self.max_id()).contains(&id)
    }

    /// Count for `id` if this fragment covers it, clamped to be
    /// non-negative so join sentinels read as "zero solutions". `None`
    /// signals that the id lives in a fragment that is not currently
    /// loaded.
    #[must_use]
    pub fn fetch(&self, id: u64) -> Option<f64> {
        if !self.contains(id) {
            return None;
        }
        let raw = match self {
            SolutionTable::Array(table) => table.get(id),
            SolutionTable::Tree(table) => table.get_count(id),
        };
        Some(raw.max(0.0))
    }

    #[must_use]
    pub fn num_solutions(&self) -> u64 {
        match self {
            SolutionTable::Array(table) => table.num_solutions(),
            SolutionTable::Tree(table) => table.num_solutions(),
        }
    }

    pub fn set_num_solutions(&mut self, num_solutions: u64) {
        match self {
            SolutionTable::Array(table) => table.set_num_solutions(num_solutions),
            SolutionTable::Tree(table) => table.set_num_solutions(num_solutions),
        }
    }

    /// Number of 64-bit words backing the fragment.
    #[must_use]
    pub fn words(&self) -> usize {
        match self {
            SolutionTable::Array(table) => table.words(),
            SolutionTable::Tree(table) => table.words(),
        }
    }
}
