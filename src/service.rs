//! Collaborator interfaces consumed by the replay core.
//!
//! The core owns none of these: the instrumentation backend, the stores,
//! the request emulator and the telemetry sink are injected at
//! construction. Every storage error must be distinguishable from
//! cancellation ([`crate::error::Error::Aborted`] is reserved for the
//! latter).

use crate::config::BypassRule;
use crate::error::Result;
use crate::models::{AppError, HttpResp, Mock, TestCase, TestReport, TestResult, TestSet};
use crate::scope::CancelScope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Options for preparing the application under instrumentation.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    pub container: String,
    pub docker_network: String,
    pub build_delay: u64,
}

/// Instrumentation mode for the hook layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentMode {
    Record,
    Test,
}

/// Options for loading hooks and starting the proxy.
#[derive(Debug, Clone)]
pub struct HookOptions {
    pub mode: InstrumentMode,
    pub enable_testing: bool,
}

/// Outbound-interception policy installed once per test set.
#[derive(Debug, Clone, Default)]
pub struct OutgoingOptions {
    pub rules: Vec<BypassRule>,
    pub mongo_password: String,
    /// Seconds of artificial delay for mocked SQL responses.
    pub sql_delay: u64,
    pub fallback_on_miss: bool,
    pub mocking: bool,
}

/// Options for the blocking application run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {}

/// Out-of-process traffic interception and application lifecycle.
#[async_trait]
pub trait Instrumentation: Send + Sync {
    /// Prepare the environment and return the application id.
    async fn setup(&self, cmd: &str, opts: SetupOptions) -> Result<u64>;

    /// Load kernel hooks and start the proxy. The hooks live until
    /// `scope` is canceled.
    async fn hook(&self, scope: &CancelScope, app_id: u64, opts: HookOptions) -> Result<()>;

    /// Install the outbound-interception policy.
    async fn mock_outgoing(&self, app_id: u64, opts: OutgoingOptions) -> Result<()>;

    /// Replace the in-memory mock selection the proxy serves from.
    async fn set_mocks(&self, app_id: u64, filtered: Vec<Mock>, unfiltered: Vec<Mock>)
        -> Result<()>;

    /// Names of the mocks consumed since the last call.
    async fn get_consumed_mocks(&self, app_id: u64) -> Result<Vec<String>>;

    /// Run the application. Blocks until the application exits or the
    /// scope is canceled; the returned error is always classified.
    async fn run_app(&self, scope: &CancelScope, app_id: u64, opts: RunOptions) -> AppError;

    /// IP of the application container (docker kinds only).
    async fn get_container_ip(&self, app_id: u64) -> Result<String>;
}

/// Store of recorded test sets and cases.
#[async_trait]
pub trait TestDb: Send + Sync {
    async fn get_all_test_set_ids(&self) -> Result<Vec<String>>;
    async fn get_test_cases(&self, test_set_id: &str) -> Result<Vec<TestCase>>;
    async fn update_test_case(&self, test_case: &TestCase, test_set_id: &str) -> Result<()>;
    async fn delete_tests(&self, test_set_id: &str, case_ids: &[String]) -> Result<()>;
    async fn delete_test_set(&self, test_set_id: &str) -> Result<()>;
}

/// Store of captured outbound mocks.
#[async_trait]
pub trait MockDb: Send + Sync {
    /// Mocks whose request timestamp falls inside `[after, before]`.
    async fn get_filtered_mocks(
        &self,
        test_set_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Mock>>;

    /// Mocks outside any known case window, bounded by `[after, before]`.
    async fn get_unfiltered_mocks(
        &self,
        test_set_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Mock>>;

    /// Keep only the named mocks; everything else may be deleted.
    async fn update_mocks(&self, test_set_id: &str, consumed: &BTreeSet<String>) -> Result<()>;
}

/// Store of run reports and per-case results.
#[async_trait]
pub trait ReportDb: Send + Sync {
    async fn get_all_test_run_ids(&self) -> Result<Vec<String>>;
    async fn get_test_case_results(
        &self,
        test_run_id: &str,
        test_set_id: &str,
    ) -> Result<Vec<TestResult>>;
    async fn get_report(&self, test_run_id: &str, test_set_id: &str) -> Result<TestReport>;
    async fn insert_test_case_result(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        result: &TestResult,
    ) -> Result<()>;
    async fn insert_report(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        report: &TestReport,
    ) -> Result<()>;
}

/// Store of per-set configuration (pre-/post-scripts).
#[async_trait]
pub trait TestSetConfigStore: Send + Sync {
    async fn read(&self, test_set_id: &str) -> Result<Option<TestSet>>;
    async fn write(&self, test_set_id: &str, test_set: &TestSet) -> Result<()>;
}

/// Replays a captured request as a live client call.
#[async_trait]
pub trait RequestEmulator: Send + Sync {
    /// Issue the (already rewritten) captured request and return the live
    /// response.
    async fn simulate_request(
        &self,
        app_id: u64,
        tc: &TestCase,
        test_set_id: &str,
    ) -> Result<HttpResp>;

    /// Observe the final verdict of a test set.
    async fn process_test_run_status(&self, passed: bool, test_set_id: &str);

    /// Name of the per-set mock file this emulator works with.
    fn fetch_mock_name(&self) -> String;

    /// Prepare the per-set mock file before the set runs.
    async fn process_mock_file(&self, test_set_id: &str);

    /// Hook invoked after each non-aborting test set.
    async fn after_test_hook(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        total_test_sets: usize,
    ) -> Result<TestReport>;
}

/// Telemetry sink for run-level events.
pub trait Telemetry: Send + Sync {
    fn test_set_run(&self, success: usize, failure: usize, test_set_id: &str, run_status: &str);
    fn test_run(&self, success: usize, failure: usize, test_sets: usize, run_status: &str);
    fn mock_test_run(&self, utilized_mocks: usize);
}

/// Mock-installation action: `Start` also installs the outbound policy,
/// `Update` only re-seeds the selected mock sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAction {
    Start,
    Update,
}

/// Handle to a live instrumentation session.
///
/// The sentinel state (no app, no hooks) is used in override-base-URL mode
/// where nothing is launched or intercepted.
#[derive(Debug, Clone, Default)]
pub struct InstrumentState {
    pub app_id: u64,
    hook_scope: Option<CancelScope>,
}

impl InstrumentState {
    #[must_use]
    pub fn new(app_id: u64, hook_scope: CancelScope) -> Self {
        Self {
            app_id,
            hook_scope: Some(hook_scope),
        }
    }

    /// Release kernel hooks and the proxy. Idempotent.
    pub fn release(&self) {
        if let Some(scope) = &self.hook_scope {
            scope.cancel();
        }
    }
}
