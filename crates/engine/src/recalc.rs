//! Recalculation types and reporting.
//!
//! This module defines the types used for ordered formula recomputation
//! and cycle detection.

use crate::column_id::ColumnId;

/// Report from a full ordered recompute.
#[derive(Debug, Clone, Default)]
pub struct RecalcReport {
    /// Time taken for full recompute in milliseconds.
    pub duration_ms: u64,

    /// Number of formula columns evaluated in dependency order.
    pub columns_recomputed: usize,

    /// Number of cells written by evaluated columns.
    pub cells_recomputed: usize,

    /// Number of formula columns that could not be ordered and were zeroed.
    pub columns_zeroed: usize,

    /// True if the graph held a cycle at recompute time. Only reachable
    /// through loaded state; formula assignment rejects cycles up front.
    pub had_cycles: bool,

    /// The columns left out of the order, when `had_cycles` is set.
    pub cycle: Option<CycleReport>,
}

impl RecalcReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format as a concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} columns, {} cells in {}ms, cycles={}",
            self.columns_recomputed, self.cells_recomputed, self.duration_ms, self.had_cycles
        )
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[recalc/full]   3ms  4 columns  120 cells  cycles=0`
    pub fn log_line(&self) -> String {
        format!(
            "[recalc/full] {:>3}ms  {} columns  {} cells  cycles={}",
            self.duration_ms,
            self.columns_recomputed,
            self.cells_recomputed,
            if self.had_cycles { 1 } else { 0 }
        )
    }
}

/// Report when cycle detection finds a circular reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Columns participating in (or blocked by) the cycle.
    pub columns: Vec<ColumnId>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleReport {
    pub fn new(columns: Vec<ColumnId>, message: impl Into<String>) -> Self {
        Self {
            columns,
            message: message.into(),
        }
    }

    /// Create a cycle report for a multi-column cycle.
    pub fn cycle(columns: Vec<ColumnId>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let message = match names.as_slice() {
            [] => "Circular reference".to_string(),
            [only] => format!("Circular reference: {} → {}", only, only),
            [first, .., last] if names.len() > 5 => format!(
                "Circular reference involving {} columns: {} → ... → {}",
                names.len(),
                first,
                last
            ),
            [first, ..] => format!("Circular reference: {} → {}", names.join(" → "), first),
        };
        Self { columns, message }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleReport {}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(column: &str) -> ColumnId {
        ColumnId::new("Main", column)
    }

    #[test]
    fn test_recalc_report_default() {
        let report = RecalcReport::default();
        assert_eq!(report.duration_ms, 0);
        assert_eq!(report.columns_recomputed, 0);
        assert_eq!(report.cells_recomputed, 0);
        assert!(!report.had_cycles);
        assert!(report.cycle.is_none());
    }

    #[test]
    fn test_recalc_report_summary() {
        let report = RecalcReport {
            duration_ms: 2,
            columns_recomputed: 3,
            cells_recomputed: 90,
            ..Default::default()
        };
        assert_eq!(report.summary(), "3 columns, 90 cells in 2ms, cycles=false");
    }

    #[test]
    fn test_recalc_report_log_line() {
        let report = RecalcReport {
            duration_ms: 3,
            columns_recomputed: 4,
            cells_recomputed: 120,
            ..Default::default()
        };
        assert_eq!(report.log_line(), "[recalc/full]   3ms  4 columns  120 cells  cycles=0");
    }

    #[test]
    fn test_recalc_report_log_line_with_cycles() {
        let report = RecalcReport {
            duration_ms: 12,
            columns_recomputed: 1,
            cells_recomputed: 10,
            columns_zeroed: 2,
            had_cycles: true,
            cycle: Some(CycleReport::cycle(vec![col("x"), col("y")])),
        };
        assert_eq!(report.log_line(), "[recalc/full]  12ms  1 columns  10 cells  cycles=1");
    }

    #[test]
    fn test_cycle_report_small_cycle() {
        let report = CycleReport::cycle(vec![col("x"), col("y")]);
        assert_eq!(report.message, "Circular reference: Main:x → Main:y → Main:x");
    }

    #[test]
    fn test_cycle_report_large_cycle() {
        let columns: Vec<ColumnId> = (0..10).map(|i| col(&format!("c{i}"))).collect();
        let report = CycleReport::cycle(columns);
        assert!(report.message.contains("..."));
        assert!(report.message.contains("10 columns"));
    }

    #[test]
    fn test_cycle_report_display() {
        let report = CycleReport::new(vec![col("x")], "Test error");
        assert_eq!(format!("{}", report), "Test error");
    }
}
