//! In-order release of out-of-order completions

use std::collections::BTreeMap;

/// Why a completion was not accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejected {
    /// The index is already buffered
    Duplicate(usize),
    /// The index was already released
    Released(usize),
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejected::Duplicate(i) => write!(f, "index {i} completed twice"),
            Rejected::Released(i) => write!(f, "index {i} was already released"),
        }
    }
}

/// Buffers completions keyed by index and releases them strictly in order
///
/// Released entries are removed, so the buffer only ever holds completions
/// waiting behind a gap.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<usize, T>,
    next_expected: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    /// Empty buffer expecting index 0 first
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: 0,
        }
    }

    /// Accept a completion in any order
    pub fn complete(&mut self, index: usize, value: T) -> Result<(), Rejected> {
        if index < self.next_expected {
            return Err(Rejected::Released(index));
        }
        if self.pending.contains_key(&index) {
            return Err(Rejected::Duplicate(index));
        }
        self.pending.insert(index, value);
        Ok(())
    }

    /// Release the contiguous run starting at the next expected index
    pub fn drain(&mut self) -> Vec<(usize, T)> {
        let mut released = Vec::new();
        while let Some(value) = self.pending.remove(&self.next_expected) {
            released.push((self.next_expected, value));
            self.next_expected += 1;
        }
        released
    }

    /// Index the buffer is waiting for
    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    /// Completions held behind a gap
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
