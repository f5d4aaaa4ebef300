//! File-backed test-case store.

use super::{natural_sort, REPORTS_DIR};
use crate::error::{Error, Result};
use crate::models::TestCase;
use crate::service::TestDb;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const TESTS_DIR: &str = "tests";

/// Test cases stored as one JSON file per case.
#[derive(Debug, Clone)]
pub struct FileTestDb {
    root: PathBuf,
}

impl FileTestDb {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn set_dir(&self, test_set_id: &str) -> PathBuf {
        self.root.join(test_set_id)
    }

    fn case_path(&self, test_set_id: &str, case_name: &str) -> PathBuf {
        self.set_dir(test_set_id)
            .join(TESTS_DIR)
            .join(format!("{case_name}.json"))
    }

    fn list_json(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::storage(format!("failed to list {}: {e}", dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::storage(format!("failed to list {}: {e}", dir.display())))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl TestDb for FileTestDb {
    async fn get_all_test_set_ids(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| Error::storage(format!("failed to list {}: {e}", self.root.display())))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::storage(format!("failed to list {}: {e}", self.root.display())))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != REPORTS_DIR {
                ids.push(name);
            }
        }
        natural_sort(&mut ids);
        Ok(ids)
    }

    async fn get_test_cases(&self, test_set_id: &str) -> Result<Vec<TestCase>> {
        let dir = self.set_dir(test_set_id).join(TESTS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let files = Self::list_json(&dir)?;
        let mut cases = Vec::with_capacity(files.len());
        for path in files {
            let content = asupersync::fs::read(&path).await.map_err(|e| {
                Error::storage(format!("failed to read {}: {e}", path.display()))
            })?;
            let case: TestCase = serde_json::from_slice(&content).map_err(|e| {
                Error::storage(format!("corrupt test case {}: {e}", path.display()))
            })?;
            cases.push(case);
        }
        let mut names: Vec<String> = cases.iter().map(|c| c.name.clone()).collect();
        natural_sort(&mut names);
        cases.sort_by_key(|c| names.iter().position(|n| n == &c.name).unwrap_or(usize::MAX));
        Ok(cases)
    }

    async fn update_test_case(&self, test_case: &TestCase, test_set_id: &str) -> Result<()> {
        let path = self.case_path(test_set_id, &test_case.name);
        if let Some(parent) = path.parent() {
            asupersync::fs::create_dir_all(parent).await.map_err(|e| {
                Error::storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let content = serde_json::to_vec_pretty(test_case)
            .map_err(|e| Error::storage(format!("failed to serialize test case: {e}")))?;
        asupersync::fs::write(&path, content)
            .await
            .map_err(|e| Error::storage(format!("failed to write {}: {e}", path.display())))
    }

    async fn delete_tests(&self, test_set_id: &str, case_ids: &[String]) -> Result<()> {
        for case_id in case_ids {
            let path = self.case_path(test_set_id, case_id);
            std::fs::remove_file(&path)
                .map_err(|e| Error::storage(format!("failed to delete {}: {e}", path.display())))?;
        }
        Ok(())
    }

    async fn delete_test_set(&self, test_set_id: &str) -> Result<()> {
        let dir = self.set_dir(test_set_id);
        std::fs::remove_dir_all(&dir)
            .map_err(|e| Error::storage(format!("failed to delete {}: {e}", dir.display())))
    }
}
