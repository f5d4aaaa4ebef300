//! Data model for recorded traffic, replay verdicts, and test reports.
//!
//! Everything here is serialized to disk by the storage layer, so field
//! shapes are part of the on-disk format. Recorded entities (`TestCase`,
//! `Mock`) are immutable during a run; only the normalize and denoise
//! workflows rewrite them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Noise mask: field path (e.g. `body.ts`, `header.date`) to a list of
/// regex modifiers. An empty modifier list ignores the field outright; a
/// non-empty list ignores it only when the live value matches one of the
/// regexes.
pub type NoiseMask = BTreeMap<String, Vec<String>>;

/// Engine version stamped into reports.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Lower bound of the initial mock window.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// One multipart form field of a captured request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A captured inbound HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpReq {
    pub method: String,
    #[serde(default)]
    pub proto_major: u8,
    #[serde(default)]
    pub proto_minor: u8,
    pub url: String,
    #[serde(default)]
    pub url_params: BTreeMap<String, String>,
    #[serde(default)]
    pub header: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub form: Vec<FormField>,
    pub timestamp: DateTime<Utc>,
}

/// A captured (or live) HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResp {
    pub status_code: u16,
    #[serde(default)]
    pub header: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// One recorded request/response pair, replayed as a single test case.
///
/// `name` is unique within its test set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub http_req: HttpReq,
    pub http_resp: HttpResp,
    #[serde(default)]
    pub noise: NoiseMask,
}

/// Per-test-set configuration: optional scripts run around the set when an
/// override base URL is active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSet {
    pub pre_script: String,
    pub post_script: String,
}

/// An opaque captured outbound interaction, served back by the
/// interception layer during replay. The two timestamps bound its original
/// capture and drive window selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mock {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub spec: serde_json::Value,
    pub req_timestamp: DateTime<Utc>,
    pub res_timestamp: DateTime<Utc>,
}

/// Verdict of a single replayed test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestCaseStatus {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Terminal (and transient) states of a test-set run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestSetStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "APP_HALTED")]
    AppHalted,
    #[serde(rename = "INTERNAL_ERR")]
    InternalErr,
    #[serde(rename = "FAULT_USER_APP")]
    FaultUserApp,
    #[serde(rename = "FAULT_SCRIPT")]
    FaultScript,
    #[serde(rename = "USER_ABORT")]
    UserAbort,
}

impl TestSetStatus {
    /// Wire string used in persisted reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::AppHalted => "APP_HALTED",
            Self::InternalErr => "INTERNAL_ERR",
            Self::FaultUserApp => "FAULT_USER_APP",
            Self::FaultScript => "FAULT_SCRIPT",
            Self::UserAbort => "USER_ABORT",
        }
    }

    /// Parse the wire string back into a status.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(Self::Running),
            "PASSED" => Some(Self::Passed),
            "FAILED" => Some(Self::Failed),
            "APP_HALTED" => Some(Self::AppHalted),
            "INTERNAL_ERR" => Some(Self::InternalErr),
            "FAULT_USER_APP" => Some(Self::FaultUserApp),
            "FAULT_SCRIPT" => Some(Self::FaultScript),
            "USER_ABORT" => Some(Self::UserAbort),
            _ => None,
        }
    }

    /// A terminal report is never mutated again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for TestSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison of one scalar field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueComparison<T> {
    pub expected: T,
    pub actual: T,
    pub passed: bool,
}

/// Comparison of one response header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderComparison {
    pub key: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
}

/// How the body was compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyComparisonKind {
    Json,
    Plain,
}

/// Comparison of the response body. `failed_paths` lists the JSON paths
/// that differed (empty for plain-text comparisons).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyComparison {
    pub kind: BodyComparisonKind,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    #[serde(default)]
    pub failed_paths: Vec<String>,
}

/// Full per-field delta between a recorded and a live response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub status_code: ValueComparison<u16>,
    pub headers: Vec<HeaderComparison>,
    pub body: BodyComparison,
}

impl ComparisonResult {
    /// True when every compared field passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status_code.passed && self.body.passed && self.headers.iter().all(|h| h.passed)
    }
}

/// Outcome of one replayed test case, appended to the set's report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case_id: String,
    pub test_set_id: String,
    pub status: TestCaseStatus,
    /// Wall-clock start, unix seconds.
    pub started: i64,
    /// Wall-clock completion, unix seconds.
    pub completed: i64,
    /// The request as actually sent (after URL rewrites).
    pub req: HttpReq,
    /// The live response received.
    pub res: HttpResp,
    #[serde(default)]
    pub test_case_path: String,
    #[serde(default)]
    pub mock_path: String,
    #[serde(default)]
    pub noise: NoiseMask,
    pub result: ComparisonResult,
}

/// Per-(run, set) report: seeded RUNNING, finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub test_set: String,
    pub status: TestSetStatus,
    pub total: usize,
    #[serde(default)]
    pub success: usize,
    #[serde(default)]
    pub failure: usize,
    #[serde(default)]
    pub tests: Vec<TestResult>,
}

/// Classified failure of the instrumented application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// The user command could not be launched at all.
    CommandError,
    /// The application exited on its own.
    AppStopped,
    /// The instrumentation layer itself failed.
    Internal,
    /// The surrounding scope was canceled; not a failure.
    CtxCanceled,
    /// Anything the instrumentation could not classify.
    Unexpected,
}

/// Error returned by the blocking application-run call.
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub message: String,
}

impl AppError {
    #[must_use]
    pub fn new(kind: AppErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "application error ({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

/// Denoise operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseOp {
    Add,
    Remove,
}

/// One denoise instruction plus its echo of the resulting mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseParams {
    pub test_case_id: String,
    pub ops: NoiseOp,
    #[serde(default)]
    pub assertion: NoiseMask,
    #[serde(default)]
    pub after_noise: NoiseMask,
}
