//! File-backed per-set configuration store.

use crate::error::{Error, Result};
use crate::models::TestSet;
use crate::service::TestSetConfigStore;
use async_trait::async_trait;
use std::path::PathBuf;

const CONFIG_FILE: &str = "config.json";

/// Per-set config stored as `<root>/<set>/config.json`.
#[derive(Debug, Clone)]
pub struct FileTestSetConfigStore {
    root: PathBuf,
}

impl FileTestSetConfigStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn config_path(&self, test_set_id: &str) -> PathBuf {
        self.root.join(test_set_id).join(CONFIG_FILE)
    }
}

#[async_trait]
impl TestSetConfigStore for FileTestSetConfigStore {
    async fn read(&self, test_set_id: &str) -> Result<Option<TestSet>> {
        let path = self.config_path(test_set_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = asupersync::fs::read(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to read {}: {e}", path.display())))?;
        let test_set = serde_json::from_slice(&content)
            .map_err(|e| Error::storage(format!("corrupt set config {}: {e}", path.display())))?;
        Ok(Some(test_set))
    }

    async fn write(&self, test_set_id: &str, test_set: &TestSet) -> Result<()> {
        let path = self.config_path(test_set_id);
        if let Some(parent) = path.parent() {
            asupersync::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("failed to create {}: {e}", parent.display())))?;
        }
        let content = serde_json::to_vec_pretty(test_set)
            .map_err(|e| Error::storage(format!("failed to serialize set config: {e}")))?;
        asupersync::fs::write(&path, content)
            .await
            .map_err(|e| Error::storage(format!("failed to write {}: {e}", path.display())))
    }
}
