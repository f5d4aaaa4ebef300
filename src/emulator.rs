//! Default request emulator.
//!
//! Re-issues a captured request as a live client call against the
//! application under test and returns the observed response. The hook
//! methods around mock files are no-ops here; richer emulators implement
//! them to post-process per-set mock files.

use crate::error::Result;
use crate::http::HttpClient;
use crate::models::{version, HttpResp, TestCase, TestReport, TestSetStatus};
use crate::service::RequestEmulator;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Default name of the per-set mock file.
pub const DEFAULT_MOCK_NAME: &str = "mocks";

/// Emulator that issues captured requests over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpEmulator {
    client: HttpClient,
    /// Per-request timeout in seconds; 0 disables the bound.
    api_timeout: u64,
    mock_name: String,
}

impl HttpEmulator {
    #[must_use]
    pub fn new(api_timeout: u64) -> Self {
        Self {
            client: HttpClient::new(),
            api_timeout,
            mock_name: DEFAULT_MOCK_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_mock_name(mut self, name: impl Into<String>) -> Self {
        self.mock_name = name.into();
        self
    }
}

#[async_trait]
impl RequestEmulator for HttpEmulator {
    async fn simulate_request(
        &self,
        _app_id: u64,
        tc: &TestCase,
        test_set_id: &str,
    ) -> Result<HttpResp> {
        tracing::debug!(
            test_case = %tc.name,
            test_set = %test_set_id,
            method = %tc.http_req.method,
            url = %tc.http_req.url,
            "simulating request"
        );
        let timeout = (self.api_timeout > 0).then(|| Duration::from_secs(self.api_timeout));
        let parts = self
            .client
            .send(
                &tc.http_req.method,
                &tc.http_req.url,
                &tc.http_req.header,
                tc.http_req.body.as_bytes(),
                timeout,
            )
            .await?;
        Ok(HttpResp {
            status_code: parts.status,
            header: parts.headers,
            body: String::from_utf8_lossy(&parts.body).into_owned(),
            timestamp: Utc::now(),
        })
    }

    async fn process_test_run_status(&self, passed: bool, test_set_id: &str) {
        tracing::debug!(test_set = %test_set_id, passed, "test set finished");
    }

    fn fetch_mock_name(&self) -> String {
        self.mock_name.clone()
    }

    async fn process_mock_file(&self, test_set_id: &str) {
        tracing::debug!(test_set = %test_set_id, "no mock file post-processing configured");
    }

    async fn after_test_hook(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        total_test_sets: usize,
    ) -> Result<TestReport> {
        tracing::debug!(
            test_run = %test_run_id,
            test_set = %test_set_id,
            total_test_sets,
            "after-test hook"
        );
        Ok(TestReport {
            version: version().to_string(),
            test_set: test_set_id.to_string(),
            status: TestSetStatus::Running,
            total: 0,
            success: 0,
            failure: 0,
            tests: Vec::new(),
        })
    }
}
