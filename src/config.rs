//! Replay configuration.
//!
//! These structs are deserialized from the user's settings file by the
//! surrounding tooling and handed to [`crate::replay::Replayer`] fully
//! resolved. Every field has a serde default so partial configs load.

use crate::error::{Error, Result};
use crate::models::NoiseMask;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for a replay run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the recorded test sets and reports.
    pub path: PathBuf,
    /// Command that launches the user application.
    pub command: String,
    /// Command kind: `native`, `docker`, or `docker-compose`.
    #[serde(alias = "commandType")]
    pub command_type: String,
    /// Container name for docker kinds.
    #[serde(alias = "containerName")]
    pub container_name: String,
    /// Docker network for docker kinds.
    #[serde(alias = "networkName")]
    pub network_name: String,
    /// Seconds to wait for a docker image build before hooking.
    #[serde(alias = "buildDelay")]
    pub build_delay: u64,
    /// Outbound destinations the interception layer must not mock.
    #[serde(alias = "bypassRules")]
    pub bypass_rules: Vec<BypassRule>,
    /// Test-bench mode: the engine itself is under test.
    #[serde(alias = "enableTesting")]
    pub enable_testing: bool,
    pub test: TestSettings,
    pub normalize: NormalizeSettings,
}

/// One bypass rule for the outbound-interception policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassRule {
    pub host: String,
    pub path: String,
    pub port: u16,
}

/// Settings scoped to replay itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSettings {
    /// Override base URL. When set, the application is neither launched nor
    /// instrumented and captured requests are re-targeted at this URL.
    #[serde(alias = "basePath")]
    pub base_path: String,
    /// Warmup seconds before the first case is driven.
    pub delay: u64,
    /// Per-request timeout in seconds for the emulator.
    #[serde(alias = "apiTimeout")]
    pub api_timeout: u64,
    /// Selection: test set id → case names. Empty map means every set;
    /// an empty name list means every case in that set.
    #[serde(alias = "selectedTests")]
    pub selected_tests: BTreeMap<String, Vec<String>>,
    /// Global and per-set noise masks.
    #[serde(alias = "globalNoise")]
    pub global_noise: GlobalNoise,
    /// Compare JSON object arrays as multisets when elements carry ids.
    #[serde(alias = "ignoreOrdering")]
    pub ignore_ordering: bool,
    /// Prune mocks never consumed by a fully passing set.
    #[serde(alias = "removeUnusedMocks")]
    pub remove_unused_mocks: bool,
    /// Pass unmatched outbound calls through to the real dependency.
    #[serde(alias = "fallBackOnMiss")]
    pub fall_back_on_miss: bool,
    /// Serve mocks at all (disabled for fully-live smoke runs).
    pub mocking: bool,
    /// Artificial delay (seconds) injected into mocked SQL responses.
    #[serde(alias = "sqlDelay")]
    pub sql_delay: u64,
    /// Password for replaying captured MongoDB handshakes.
    #[serde(alias = "mongoPassword")]
    pub mongo_password: String,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            delay: 5,
            api_timeout: 10,
            selected_tests: BTreeMap::new(),
            global_noise: GlobalNoise::default(),
            ignore_ordering: false,
            remove_unused_mocks: false,
            fall_back_on_miss: false,
            mocking: true,
            sql_delay: 0,
            mongo_password: String::new(),
        }
    }
}

/// Noise masks applied to every comparison, with per-set overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalNoise {
    pub global: NoiseMask,
    #[serde(alias = "testSets")]
    pub test_sets: BTreeMap<String, NoiseMask>,
}

/// Settings for the normalize workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    /// Test run to normalize from; empty selects the most recent.
    #[serde(alias = "testRun")]
    pub test_run: String,
    /// Sets (and optionally cases) to normalize; empty selects all.
    #[serde(alias = "selectedTests")]
    pub selected_tests: Vec<SelectedTests>,
}

/// One (set, cases) selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectedTests {
    #[serde(alias = "testSet")]
    pub test_set: String,
    pub tests: Vec<String>,
}

/// Kind of the user command, deciding URL-rewrite behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Native,
    Docker,
    DockerCompose,
}

impl CommandKind {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "docker" => Self::Docker,
            "docker-compose" => Self::DockerCompose,
            _ => Self::Native,
        }
    }

    /// Docker kinds route requests to the container IP.
    #[must_use]
    pub const fn is_docker(self) -> bool {
        matches!(self, Self::Docker | Self::DockerCompose)
    }
}

impl Config {
    /// Load a configuration file (JSON).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Whether an override base URL is configured.
    #[must_use]
    pub fn base_path_set(&self) -> bool {
        !self.test.base_path.is_empty()
    }

    /// Parsed command kind.
    #[must_use]
    pub fn command_kind(&self) -> CommandKind {
        CommandKind::parse(&self.command_type)
    }

    /// Selected case names for one set, if a selection exists.
    #[must_use]
    pub fn selected_cases(&self, test_set_id: &str) -> Option<&[String]> {
        self.test
            .selected_tests
            .get(test_set_id)
            .map(Vec::as_slice)
    }

    /// Whether `test_set_id` participates in this run.
    #[must_use]
    pub fn set_selected(&self, test_set_id: &str) -> bool {
        self.test.selected_tests.is_empty() || self.test.selected_tests.contains_key(test_set_id)
    }
}
