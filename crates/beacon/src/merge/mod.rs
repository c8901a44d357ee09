//! Delta merging.
//!
//! Accumulates incremental content fragments into one monotonically growing
//! buffer per step. Buffers are released on finalize, so memory is bounded
//! by the number of concurrently open steps rather than run length.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Merge errors. Stale deltas are an internal bug signal: the run continues
/// and nothing is shown to the end user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("delta for step {step} arrived after finalize")]
    StaleDelta { step: u64 },
}

/// Per-session delta accumulator.
///
/// The merger performs no redundancy detection: callers must hand over the
/// incremental suffix, not the whole text.
#[derive(Debug, Default)]
pub struct DeltaMerger {
    open: HashMap<u64, String>,
    finalized: HashSet<u64>,
}

impl DeltaMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the step's buffer and return the new full value.
    pub fn append(&mut self, step: u64, fragment: &str) -> Result<String, MergeError> {
        if self.finalized.contains(&step) {
            return Err(MergeError::StaleDelta { step });
        }
        let buffer = self.open.entry(step).or_default();
        buffer.push_str(fragment);
        Ok(buffer.clone())
    }

    /// Close the step's buffer and return the final text. The buffer is
    /// released; further appends for this step fail with `StaleDelta`.
    pub fn finalize(&mut self, step: u64) -> Result<String, MergeError> {
        if !self.finalized.insert(step) {
            return Err(MergeError::StaleDelta { step });
        }
        Ok(self.open.remove(&step).unwrap_or_default())
    }

    /// Whether the step still accepts deltas.
    pub fn is_open(&self, step: u64) -> bool {
        !self.finalized.contains(&step)
    }

    /// Whether the step has an accumulating buffer.
    pub fn has_buffer(&self, step: u64) -> bool {
        self.open.contains_key(&step)
    }

    /// Number of concurrently open buffers.
    pub fn open_buffers(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_grows_by_prefix_extension() {
        let mut merger = DeltaMerger::new();
        assert_eq!(merger.append(2, "Hel").unwrap(), "Hel");
        assert_eq!(merger.append(2, "lo ").unwrap(), "Hello ");
        assert_eq!(merger.append(2, "world").unwrap(), "Hello world");
        assert_eq!(merger.finalize(2).unwrap(), "Hello world");
    }

    #[test]
    fn test_append_after_finalize_is_stale() {
        let mut merger = DeltaMerger::new();
        merger.append(1, "a").unwrap();
        merger.finalize(1).unwrap();
        assert_eq!(
            merger.append(1, "b"),
            Err(MergeError::StaleDelta { step: 1 })
        );
    }

    #[test]
    fn test_double_finalize_is_stale() {
        let mut merger = DeltaMerger::new();
        merger.append(1, "a").unwrap();
        merger.finalize(1).unwrap();
        assert_eq!(merger.finalize(1), Err(MergeError::StaleDelta { step: 1 }));
    }

    #[test]
    fn test_finalize_releases_buffer() {
        let mut merger = DeltaMerger::new();
        merger.append(1, "a").unwrap();
        merger.append(2, "b").unwrap();
        assert_eq!(merger.open_buffers(), 2);
        merger.finalize(1).unwrap();
        assert_eq!(merger.open_buffers(), 1);
        assert!(!merger.has_buffer(1));
        assert!(merger.has_buffer(2));
    }

    #[test]
    fn test_finalize_without_deltas_yields_empty() {
        let mut merger = DeltaMerger::new();
        assert_eq!(merger.finalize(7).unwrap(), "");
        assert!(!merger.is_open(7));
    }

    #[test]
    fn test_independent_steps() {
        let mut merger = DeltaMerger::new();
        merger.append(1, "one").unwrap();
        merger.append(2, "two").unwrap();
        assert_eq!(merger.finalize(1).unwrap(), "one");
        assert_eq!(merger.append(2, " more").unwrap(), "two more");
    }
}
