//! File-backed report store.
//!
//! Per-case results accumulate in memory and are persisted as part of the
//! full report on `insert_report`; the terminal report therefore always
//! reaches disk in one write.

use super::{natural_sort, REPORTS_DIR};
use crate::error::{Error, Result};
use crate::models::{TestReport, TestResult};
use crate::service::ReportDb;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

/// Reports stored as one JSON file per (run, set).
#[derive(Debug)]
pub struct FileReportDb {
    root: PathBuf,
    results: StdMutex<HashMap<(String, String), Vec<TestResult>>>,
}

impl FileReportDb {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            results: StdMutex::new(HashMap::new()),
        }
    }

    fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    fn report_path(&self, test_run_id: &str, test_set_id: &str) -> PathBuf {
        self.reports_dir()
            .join(test_run_id)
            .join(format!("{test_set_id}-report.json"))
    }
}

#[async_trait]
impl ReportDb for FileReportDb {
    async fn get_all_test_run_ids(&self) -> Result<Vec<String>> {
        let dir = self.reports_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::storage(format!("failed to list {}: {e}", dir.display())))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::storage(format!("failed to list {}: {e}", dir.display())))?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        natural_sort(&mut ids);
        Ok(ids)
    }

    async fn get_test_case_results(
        &self,
        test_run_id: &str,
        test_set_id: &str,
    ) -> Result<Vec<TestResult>> {
        let key = (test_run_id.to_string(), test_set_id.to_string());
        if let Some(results) = self.results.lock().expect("results lock").get(&key) {
            return Ok(results.clone());
        }
        // Fall back to a persisted report from an earlier run.
        match self.get_report(test_run_id, test_set_id).await {
            Ok(report) => Ok(report.tests),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn get_report(&self, test_run_id: &str, test_set_id: &str) -> Result<TestReport> {
        let path = self.report_path(test_run_id, test_set_id);
        let content = asupersync::fs::read(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_slice(&content)
            .map_err(|e| Error::storage(format!("corrupt report {}: {e}", path.display())))
    }

    async fn insert_test_case_result(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        result: &TestResult,
    ) -> Result<()> {
        let key = (test_run_id.to_string(), test_set_id.to_string());
        self.results
            .lock()
            .expect("results lock")
            .entry(key)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn insert_report(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        report: &TestReport,
    ) -> Result<()> {
        let path = self.report_path(test_run_id, test_set_id);
        if let Some(parent) = path.parent() {
            asupersync::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("failed to create {}: {e}", parent.display())))?;
        }
        let content = serde_json::to_vec_pretty(report)
            .map_err(|e| Error::storage(format!("failed to serialize report: {e}")))?;
        asupersync::fs::write(&path, content)
            .await
            .map_err(|e| Error::storage(format!("failed to write {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        base_time, BodyComparison, BodyComparisonKind, ComparisonResult, HttpReq, HttpResp,
        TestCaseStatus, TestSetStatus, ValueComparison,
    };
    use asupersync::test_utils::run_test;
    use std::collections::BTreeMap;

    fn result(case: &str) -> TestResult {
        TestResult {
            test_case_id: case.to_string(),
            test_set_id: "test-set-1".to_string(),
            status: TestCaseStatus::Passed,
            started: 0,
            completed: 1,
            req: HttpReq {
                method: "GET".to_string(),
                proto_major: 1,
                proto_minor: 1,
                url: "http://localhost/x".to_string(),
                url_params: BTreeMap::new(),
                header: BTreeMap::new(),
                body: String::new(),
                binary: false,
                form: Vec::new(),
                timestamp: base_time(),
            },
            res: HttpResp {
                status_code: 200,
                header: BTreeMap::new(),
                body: String::new(),
                timestamp: base_time(),
            },
            test_case_path: String::new(),
            mock_path: String::new(),
            noise: BTreeMap::new(),
            result: ComparisonResult {
                status_code: ValueComparison {
                    expected: 200,
                    actual: 200,
                    passed: true,
                },
                headers: Vec::new(),
                body: BodyComparison {
                    kind: BodyComparisonKind::Plain,
                    expected: String::new(),
                    actual: String::new(),
                    passed: true,
                    failed_paths: Vec::new(),
                },
            },
        }
    }

    fn report(status: TestSetStatus, tests: Vec<TestResult>) -> TestReport {
        TestReport {
            version: crate::models::version().to_string(),
            test_set: "test-set-1".to_string(),
            status,
            total: tests.len(),
            success: tests.len(),
            failure: 0,
            tests,
        }
    }

    #[test]
    fn buffers_results_until_report_write() {
        run_test(|| async {
            let tmp = tempfile::tempdir().expect("tempdir");
            let db = FileReportDb::new(tmp.path());

            db.insert_test_case_result("test-run-1", "test-set-1", &result("case-1"))
                .await
                .expect("insert result");
            db.insert_test_case_result("test-run-1", "test-set-1", &result("case-2"))
                .await
                .expect("insert result");

            let buffered = db
                .get_test_case_results("test-run-1", "test-set-1")
                .await
                .expect("buffered");
            assert_eq!(buffered.len(), 2);

            let report = report(TestSetStatus::Passed, buffered);
            db.insert_report("test-run-1", "test-set-1", &report)
                .await
                .expect("write report");

            let loaded = db
                .get_report("test-run-1", "test-set-1")
                .await
                .expect("load report");
            assert_eq!(loaded.status, TestSetStatus::Passed);
            assert_eq!(loaded.tests.len(), 2);
        });
    }

    #[test]
    fn lists_run_ids_naturally() {
        run_test(|| async {
            let tmp = tempfile::tempdir().expect("tempdir");
            let db = FileReportDb::new(tmp.path());
            for run in ["test-run-10", "test-run-2"] {
                db.insert_report(run, "test-set-1", &report(TestSetStatus::Passed, Vec::new()))
                    .await
                    .expect("write");
            }
            let ids = db.get_all_test_run_ids().await.expect("ids");
            assert_eq!(ids, vec!["test-run-2", "test-run-10"]);
        });
    }

    #[test]
    fn missing_report_errors() {
        run_test(|| async {
            let tmp = tempfile::tempdir().expect("tempdir");
            let db = FileReportDb::new(tmp.path());
            assert!(db.get_report("test-run-1", "test-set-1").await.is_err());
            assert!(db
                .get_test_case_results("test-run-1", "test-set-1")
                .await
                .expect("empty")
                .is_empty());
        });
    }
}
