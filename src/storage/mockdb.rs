//! File-backed mock store.
//!
//! All mocks of a set live in one JSON file. The filtered population is
//! the slice whose request timestamp falls inside the requested window;
//! everything else is unfiltered background traffic.

use crate::error::{Error, Result};
use crate::models::Mock;
use crate::service::MockDb;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Mocks stored as one JSON array per test set.
#[derive(Debug, Clone)]
pub struct FileMockDb {
    root: PathBuf,
    mock_name: String,
}

impl FileMockDb {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mock_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            mock_name: mock_name.into(),
        }
    }

    fn mock_path(&self, test_set_id: &str) -> PathBuf {
        self.root
            .join(test_set_id)
            .join(format!("{}.json", self.mock_name))
    }

    async fn load(&self, test_set_id: &str) -> Result<Vec<Mock>> {
        let path = self.mock_path(test_set_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = asupersync::fs::read(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_slice(&content)
            .map_err(|e| Error::storage(format!("corrupt mock file {}: {e}", path.display())))
    }

    async fn save(&self, test_set_id: &str, mocks: &[Mock]) -> Result<()> {
        let path = self.mock_path(test_set_id);
        if let Some(parent) = path.parent() {
            asupersync::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("failed to create {}: {e}", parent.display())))?;
        }
        let content = serde_json::to_vec_pretty(mocks)
            .map_err(|e| Error::storage(format!("failed to serialize mocks: {e}")))?;
        asupersync::fs::write(&path, content)
            .await
            .map_err(|e| Error::storage(format!("failed to write {}: {e}", path.display())))
    }

    /// Write the full mock set (used by the record path and tests).
    pub async fn put_mocks(&self, test_set_id: &str, mocks: &[Mock]) -> Result<()> {
        self.save(test_set_id, mocks).await
    }
}

fn in_window(mock: &Mock, after: DateTime<Utc>, before: DateTime<Utc>) -> bool {
    mock.req_timestamp >= after && mock.req_timestamp <= before
}

#[async_trait]
impl MockDb for FileMockDb {
    async fn get_filtered_mocks(
        &self,
        test_set_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Mock>> {
        let mocks = self.load(test_set_id).await?;
        Ok(mocks
            .into_iter()
            .filter(|m| in_window(m, after, before))
            .collect())
    }

    async fn get_unfiltered_mocks(
        &self,
        test_set_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Mock>> {
        let mocks = self.load(test_set_id).await?;
        Ok(mocks
            .into_iter()
            .filter(|m| !in_window(m, after, before))
            .collect())
    }

    async fn update_mocks(&self, test_set_id: &str, consumed: &BTreeSet<String>) -> Result<()> {
        let mocks = self.load(test_set_id).await?;
        let total = mocks.len();
        let kept: Vec<Mock> = mocks
            .into_iter()
            .filter(|m| consumed.contains(&m.name))
            .collect();
        tracing::debug!(
            test_set = %test_set_id,
            total,
            kept = kept.len(),
            "pruning unused mocks"
        );
        self.save(test_set_id, &kept).await
    }
}
