//! Test-run identifiers and the per-run verdict summary.
//!
//! Run IDs follow a shared naming template (`test-run-<n>`); the next ID is
//! always the numeric successor of the highest existing one, so IDs stay
//! monotonic across runs even when older runs are deleted.

use crate::models::TestReport;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Naming template for test runs.
pub const TEST_RUN_TEMPLATE: &str = "test-run";

fn template_number(id: &str, template: &str) -> Option<u64> {
    let rest = id.strip_prefix(template)?.strip_prefix('-')?;
    rest.parse().ok()
}

/// Next run ID for the template: `template-<max+1>`, starting at 1.
#[must_use]
pub fn next_run_id(existing: &[String], template: &str) -> String {
    let max = existing
        .iter()
        .filter_map(|id| template_number(id, template))
        .max()
        .unwrap_or(0);
    format!("{template}-{}", max + 1)
}

/// Most recent run ID matching the template, if any.
#[must_use]
pub fn last_run_id(existing: &[String], template: &str) -> Option<String> {
    existing
        .iter()
        .filter_map(|id| template_number(id, template))
        .max()
        .map(|n| format!("{template}-{n}"))
}

/// Verdict of one completed test set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetVerdict {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub set_passed: bool,
}

/// Aggregate verdicts across the test sets of one run.
///
/// Mutated only by the orchestrator between test sets; never shared across
/// tasks.
#[derive(Debug, Default)]
pub struct RunSummary {
    verdicts: BTreeMap<String, SetVerdict>,
    total_tests: usize,
    total_passed: usize,
    total_failed: usize,
}

impl RunSummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finalized report into the summary.
    pub fn record(&mut self, test_set_id: &str, report: &TestReport, set_passed: bool) {
        self.verdicts.insert(
            test_set_id.to_string(),
            SetVerdict {
                total: report.total,
                passed: report.success,
                failed: report.failure,
                set_passed,
            },
        );
        self.total_tests += report.total;
        self.total_passed += report.success;
        self.total_failed += report.failure;
    }

    #[must_use]
    pub const fn total_tests(&self) -> usize {
        self.total_tests
    }

    #[must_use]
    pub const fn total_passed(&self) -> usize {
        self.total_passed
    }

    #[must_use]
    pub const fn total_failed(&self) -> usize {
        self.total_failed
    }

    #[must_use]
    pub fn verdict(&self, test_set_id: &str) -> Option<&SetVerdict> {
        self.verdicts.get(test_set_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    /// Set names ordered by the numeric suffix of `<name>-<name>-<n>` ids,
    /// falling back to lexicographic order for non-conforming names.
    #[must_use]
    pub fn ordered_set_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.verdicts.keys().map(String::as_str).collect();
        names.sort_by(|a, b| {
            let num = |name: &str| {
                let parts: Vec<&str> = name.split('-').collect();
                if parts.len() < 3 {
                    return None;
                }
                parts[2].parse::<u64>().ok()
            };
            match (num(a), num(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.cmp(b),
            }
        });
        names
    }

    /// Render the complete-run summary table.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "complete test run summary");
        let _ = writeln!(out, "  total tests: {}", self.total_tests);
        let _ = writeln!(out, "  total passed: {}", self.total_passed);
        let _ = writeln!(out, "  total failed: {}", self.total_failed);
        let _ = writeln!(out, "  {:<24}{:>8}{:>8}{:>8}", "test set", "total", "passed", "failed");
        for name in self.ordered_set_names() {
            let verdict = &self.verdicts[name];
            let _ = writeln!(
                out,
                "  {:<24}{:>8}{:>8}{:>8}",
                name, verdict.total, verdict.passed, verdict.failed
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestSetStatus, version};

    fn report(total: usize, success: usize, failure: usize) -> TestReport {
        TestReport {
            version: version().to_string(),
            test_set: String::new(),
            status: TestSetStatus::Passed,
            total,
            success,
            failure,
            tests: Vec::new(),
        }
    }

    #[test]
    fn next_id_starts_at_one() {
        assert_eq!(next_run_id(&[], TEST_RUN_TEMPLATE), "test-run-1");
    }

    #[test]
    fn next_id_is_numeric_successor() {
        let existing = vec![
            "test-run-1".to_string(),
            "test-run-10".to_string(),
            "test-run-3".to_string(),
            "unrelated".to_string(),
        ];
        assert_eq!(next_run_id(&existing, TEST_RUN_TEMPLATE), "test-run-11");
    }

    #[test]
    fn last_id_picks_highest() {
        let existing = vec!["test-run-2".to_string(), "test-run-9".to_string()];
        assert_eq!(
            last_run_id(&existing, TEST_RUN_TEMPLATE),
            Some("test-run-9".to_string())
        );
        assert_eq!(last_run_id(&[], TEST_RUN_TEMPLATE), None);
    }

    #[test]
    fn summary_aggregates_totals() {
        let mut summary = RunSummary::new();
        summary.record("test-set-1", &report(3, 3, 0), true);
        summary.record("test-set-2", &report(2, 1, 1), false);
        assert_eq!(summary.total_tests(), 5);
        assert_eq!(summary.total_passed(), 4);
        assert_eq!(summary.total_failed(), 1);
        assert!(summary.verdict("test-set-1").expect("verdict").set_passed);
        assert!(!summary.verdict("test-set-2").expect("verdict").set_passed);
    }

    #[test]
    fn summary_orders_sets_numerically() {
        let mut summary = RunSummary::new();
        summary.record("test-set-10", &report(1, 1, 0), true);
        summary.record("test-set-2", &report(1, 1, 0), true);
        summary.record("test-set-1", &report(1, 1, 0), true);
        assert_eq!(
            summary.ordered_set_names(),
            vec!["test-set-1", "test-set-2", "test-set-10"]
        );
    }

    #[test]
    fn render_includes_every_set() {
        let mut summary = RunSummary::new();
        summary.record("test-set-1", &report(2, 2, 0), true);
        let rendered = summary.render();
        assert!(rendered.contains("total tests: 2"));
        assert!(rendered.contains("test-set-1"));
    }
}
