//! File-backed stores for test cases, mocks, reports and per-set config.
//!
//! Layout under the configured root directory:
//!
//! ```text
//! <root>/<test-set-id>/tests/<case>.json
//! <root>/<test-set-id>/<mock-file>.json
//! <root>/<test-set-id>/config.json
//! <root>/reports/<test-run-id>/<test-set-id>-report.json
//! ```

mod mockdb;
mod reportdb;
mod setconfig;
mod testdb;

pub use mockdb::FileMockDb;
pub use reportdb::FileReportDb;
pub use setconfig::FileTestSetConfigStore;
pub use testdb::FileTestDb;

/// Name of the reports directory under the storage root.
pub(crate) const REPORTS_DIR: &str = "reports";

/// Sort ids of the shape `<prefix>-<n>` by their numeric suffix, falling
/// back to lexicographic order. Keeps `test-2` before `test-10`.
pub(crate) fn natural_sort(ids: &mut [String]) {
    ids.sort_by(|a, b| {
        let num = |id: &str| id.rsplit_once('-').and_then(|(_, n)| n.parse::<u64>().ok());
        match (num(a), num(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            _ => a.cmp(b),
        }
    });
}
