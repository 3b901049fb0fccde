//! Range allocator for the search space
//!
//! Hands out contiguous, non-overlapping ranges from a cursor that only
//! ever moves forward, and holds the set-once solution for the search.

use serde::{Deserialize, Serialize};

// ============================================================================
// Range
// ============================================================================

/// A contiguous slice of the search space, `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: u64,

    /// Exclusive upper bound
    pub end: u64,
}

impl Range {
    /// Number of units covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether two ranges share at least one unit
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Solution Reports
// ============================================================================

/// Outcome of reporting a solution to the allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionOutcome {
    /// First report; the value is now the solution
    Accepted,

    /// Same value reported again
    Duplicate,

    /// A different value was already recorded; the report was dropped
    Conflicting { existing: String },
}

// ============================================================================
// Range Allocator
// ============================================================================

/// Global search state: cursor, solution and completed-units counter
#[derive(Debug, Clone)]
pub struct RangeAllocator {
    cursor: u64,
    range_size: u64,
    found: Option<String>,
    total_completed_units: u64,
}

impl RangeAllocator {
    /// Create an allocator starting at zero
    ///
    /// A `range_size` of zero is bumped to one so that ranges can never
    /// collapse onto the same cursor.
    pub fn new(range_size: u64) -> Self {
        Self {
            cursor: 0,
            range_size: range_size.max(1),
            found: None,
            total_completed_units: 0,
        }
    }

    /// Produce the next range and advance the cursor past it
    pub fn next_range(&mut self) -> Range {
        let start = self.cursor;
        let end = start.saturating_add(self.range_size);
        self.cursor = end;
        Range { start, end }
    }

    /// Record a solution; the first report wins
    pub fn report_solution(&mut self, value: impl Into<String>) -> SolutionOutcome {
        let value = value.into();
        match &self.found {
            None => {
                self.found = Some(value);
                SolutionOutcome::Accepted
            }
            Some(existing) if *existing == value => SolutionOutcome::Duplicate,
            Some(existing) => SolutionOutcome::Conflicting {
                existing: existing.clone(),
            },
        }
    }

    pub fn is_solved(&self) -> bool {
        self.found.is_some()
    }

    pub fn solution(&self) -> Option<&str> {
        self.found.as_deref()
    }

    /// Count completed work at face value (no per-range bookkeeping)
    pub fn record_completion(&mut self, units: u64) {
        self.total_completed_units = self.total_completed_units.saturating_add(units);
    }

    /// Next range start
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn range_size(&self) -> u64 {
        self.range_size
    }

    pub fn total_completed_units(&self) -> u64 {
        self.total_completed_units
    }
}

// ============================================================================
// Tests
// ============================================================================
