//! End-to-end replay loop tests against deterministic in-memory fakes.
//!
//! Covers the orchestrator and test-set runner behaviors:
//! - happy path across multiple cases and sets
//! - noise-masked body diffs flipping a verdict
//! - app crash mid-set routed through the exit cell
//! - unused-mock pruning eligibility
//! - override-base-URL mode (no instrumentation, rewritten URLs)
//! - user abort during the warmup delay
//! - mock-window ordering relative to each simulated request

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rewind::config::Config;
use rewind::error::{Error, Result};
use rewind::models::{
    AppError, AppErrorKind, HttpReq, HttpResp, Mock, NoiseMask, TestCase, TestCaseStatus,
    TestReport, TestResult, TestSet, TestSetStatus,
};
use rewind::replay::Replayer;
use rewind::scope::CancelScope;
use rewind::service::{
    HookOptions, Instrumentation, MockDb, OutgoingOptions, ReportDb, RequestEmulator, RunOptions,
    SetupOptions, Telemetry, TestDb, TestSetConfigStore,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Shared event log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Setup,
    Hook,
    RunApp,
    MockOutgoing,
    FilteredMocks { after: i64, before: i64 },
    SetMocks,
    ConsumedMocks,
    Simulate { case: String, url: String },
    InsertResult { case: String },
    UpdateMocks { consumed: Vec<String> },
    ProcessMockFile { set: String },
    AfterTestHook { set: String },
    RunStatus { set: String, passed: bool },
}

type EventLog = Arc<StdMutex<Vec<Event>>>;

fn log_event(log: &EventLog, event: Event) {
    log.lock().expect("event log lock").push(event);
}

fn events(log: &EventLog) -> Vec<Event> {
    log.lock().expect("event log lock").clone()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("timestamp")
}

fn case(name: &str, req_secs: i64, status: u16, body: &str) -> TestCase {
    let mut header = BTreeMap::new();
    if !body.is_empty() {
        header.insert(
            "Content-Type".to_string(),
            "application/json".to_string(),
        );
    }
    TestCase {
        name: name.to_string(),
        http_req: HttpReq {
            method: "GET".to_string(),
            proto_major: 1,
            proto_minor: 1,
            url: format!("http://service.internal:8080/v1/{name}?a=1"),
            url_params: BTreeMap::new(),
            header: BTreeMap::new(),
            body: String::new(),
            binary: false,
            form: Vec::new(),
            timestamp: at(req_secs),
        },
        http_resp: HttpResp {
            status_code: status,
            header,
            body: body.to_string(),
            timestamp: at(req_secs + 1),
        },
        noise: NoiseMask::new(),
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

struct FakeTestDb {
    sets: StdMutex<BTreeMap<String, Vec<TestCase>>>,
}

impl FakeTestDb {
    fn new(sets: Vec<(&str, Vec<TestCase>)>) -> Self {
        Self {
            sets: StdMutex::new(
                sets.into_iter()
                    .map(|(id, cases)| (id.to_string(), cases))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl TestDb for FakeTestDb {
    async fn get_all_test_set_ids(&self) -> Result<Vec<String>> {
        Ok(self.sets.lock().expect("sets").keys().cloned().collect())
    }

    async fn get_test_cases(&self, test_set_id: &str) -> Result<Vec<TestCase>> {
        Ok(self
            .sets
            .lock()
            .expect("sets")
            .get(test_set_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_test_case(&self, test_case: &TestCase, test_set_id: &str) -> Result<()> {
        let mut sets = self.sets.lock().expect("sets");
        let cases = sets
            .get_mut(test_set_id)
            .ok_or_else(|| Error::storage("unknown test set"))?;
        match cases.iter_mut().find(|c| c.name == test_case.name) {
            Some(existing) => *existing = test_case.clone(),
            None => cases.push(test_case.clone()),
        }
        Ok(())
    }

    async fn delete_tests(&self, test_set_id: &str, case_ids: &[String]) -> Result<()> {
        let mut sets = self.sets.lock().expect("sets");
        if let Some(cases) = sets.get_mut(test_set_id) {
            cases.retain(|c| !case_ids.contains(&c.name));
        }
        Ok(())
    }

    async fn delete_test_set(&self, test_set_id: &str) -> Result<()> {
        self.sets.lock().expect("sets").remove(test_set_id);
        Ok(())
    }
}

struct FakeMockDb {
    mocks: Vec<Mock>,
    log: EventLog,
}

#[async_trait]
impl MockDb for FakeMockDb {
    async fn get_filtered_mocks(
        &self,
        _test_set_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Mock>> {
        log_event(
            &self.log,
            Event::FilteredMocks {
                after: after.timestamp(),
                before: before.timestamp(),
            },
        );
        Ok(self
            .mocks
            .iter()
            .filter(|m| m.req_timestamp >= after && m.req_timestamp <= before)
            .cloned()
            .collect())
    }

    async fn get_unfiltered_mocks(
        &self,
        _test_set_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Mock>> {
        Ok(self
            .mocks
            .iter()
            .filter(|m| m.req_timestamp < after || m.req_timestamp > before)
            .cloned()
            .collect())
    }

    async fn update_mocks(&self, _test_set_id: &str, consumed: &BTreeSet<String>) -> Result<()> {
        log_event(
            &self.log,
            Event::UpdateMocks {
                consumed: consumed.iter().cloned().collect(),
            },
        );
        Ok(())
    }
}

#[derive(Default)]
struct FakeReportDb {
    reports: StdMutex<HashMap<(String, String), Vec<TestReport>>>,
    results: StdMutex<HashMap<(String, String), Vec<TestResult>>>,
    log: Option<EventLog>,
    /// Case after whose insert the store stalls, giving the supervisor and
    /// watcher time to classify an app crash before the next loop check.
    stall_after_insert: Option<String>,
}

impl FakeReportDb {
    fn with_log(log: EventLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    fn final_report(&self, run: &str, set: &str) -> Option<TestReport> {
        self.reports
            .lock()
            .expect("reports")
            .get(&(run.to_string(), set.to_string()))
            .and_then(|history| history.last().cloned())
    }

    fn report_history(&self, run: &str, set: &str) -> Vec<TestReport> {
        self.reports
            .lock()
            .expect("reports")
            .get(&(run.to_string(), set.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn stored_results(&self, run: &str, set: &str) -> Vec<TestResult> {
        self.results
            .lock()
            .expect("results")
            .get(&(run.to_string(), set.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportDb for FakeReportDb {
    async fn get_all_test_run_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .reports
            .lock()
            .expect("reports")
            .keys()
            .map(|(run, _)| run.clone())
            .collect())
    }

    async fn get_test_case_results(
        &self,
        test_run_id: &str,
        test_set_id: &str,
    ) -> Result<Vec<TestResult>> {
        Ok(self.stored_results(test_run_id, test_set_id))
    }

    async fn get_report(&self, test_run_id: &str, test_set_id: &str) -> Result<TestReport> {
        self.final_report(test_run_id, test_set_id)
            .ok_or_else(|| Error::storage("report not found"))
    }

    async fn insert_test_case_result(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        result: &TestResult,
    ) -> Result<()> {
        if let Some(log) = &self.log {
            log_event(
                log,
                Event::InsertResult {
                    case: result.test_case_id.clone(),
                },
            );
        }
        self.results
            .lock()
            .expect("results")
            .entry((test_run_id.to_string(), test_set_id.to_string()))
            .or_default()
            .push(result.clone());
        if self
            .stall_after_insert
            .as_deref()
            .is_some_and(|case| case == result.test_case_id)
        {
            asupersync::time::sleep(asupersync::time::wall_now(), Duration::from_millis(300)).await;
        }
        Ok(())
    }

    async fn insert_report(
        &self,
        test_run_id: &str,
        test_set_id: &str,
        report: &TestReport,
    ) -> Result<()> {
        self.reports
            .lock()
            .expect("reports")
            .entry((test_run_id.to_string(), test_set_id.to_string()))
            .or_default()
            .push(report.clone());
        Ok(())
    }
}

struct FakeConfigStore {
    sets: BTreeMap<String, TestSet>,
}

#[async_trait]
impl TestSetConfigStore for FakeConfigStore {
    async fn read(&self, test_set_id: &str) -> Result<Option<TestSet>> {
        Ok(self.sets.get(test_set_id).cloned())
    }

    async fn write(&self, _test_set_id: &str, _test_set: &TestSet) -> Result<()> {
        Ok(())
    }
}

struct FakeInstrumentation {
    log: EventLog,
    consumed_per_call: StdMutex<Vec<Vec<String>>>,
    crash: Arc<AtomicBool>,
    crash_kind: AppErrorKind,
}

impl FakeInstrumentation {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            consumed_per_call: StdMutex::new(Vec::new()),
            crash: Arc::new(AtomicBool::new(false)),
            crash_kind: AppErrorKind::AppStopped,
        }
    }

    fn with_consumed(self, consumed: Vec<Vec<String>>) -> Self {
        *self.consumed_per_call.lock().expect("consumed") = consumed;
        self
    }
}

#[async_trait]
impl Instrumentation for FakeInstrumentation {
    async fn setup(&self, _cmd: &str, _opts: SetupOptions) -> Result<u64> {
        log_event(&self.log, Event::Setup);
        Ok(7)
    }

    async fn hook(&self, _scope: &CancelScope, _app_id: u64, _opts: HookOptions) -> Result<()> {
        log_event(&self.log, Event::Hook);
        Ok(())
    }

    async fn mock_outgoing(&self, _app_id: u64, _opts: OutgoingOptions) -> Result<()> {
        log_event(&self.log, Event::MockOutgoing);
        Ok(())
    }

    async fn set_mocks(
        &self,
        _app_id: u64,
        _filtered: Vec<Mock>,
        _unfiltered: Vec<Mock>,
    ) -> Result<()> {
        log_event(&self.log, Event::SetMocks);
        Ok(())
    }

    async fn get_consumed_mocks(&self, _app_id: u64) -> Result<Vec<String>> {
        log_event(&self.log, Event::ConsumedMocks);
        let mut per_call = self.consumed_per_call.lock().expect("consumed");
        if per_call.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(per_call.remove(0))
        }
    }

    async fn run_app(&self, scope: &CancelScope, _app_id: u64, _opts: RunOptions) -> AppError {
        log_event(&self.log, Event::RunApp);
        loop {
            if scope.is_canceled() {
                return AppError::new(AppErrorKind::CtxCanceled, "scope canceled");
            }
            if self.crash.load(Ordering::SeqCst) {
                return AppError::new(self.crash_kind, "application exited unexpectedly");
            }
            asupersync::time::sleep(asupersync::time::wall_now(), Duration::from_millis(10)).await;
        }
    }

    async fn get_container_ip(&self, _app_id: u64) -> Result<String> {
        Ok("172.17.0.2".to_string())
    }
}

struct FakeEmulator {
    log: EventLog,
    /// Scripted responses by case name; a missing entry echoes the
    /// recorded response back (a passing replay).
    responses: HashMap<String, std::result::Result<HttpResp, String>>,
    /// Set this flag after simulating the named case (crash trigger).
    crash_after: Option<(String, Arc<AtomicBool>)>,
}

impl FakeEmulator {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            responses: HashMap::new(),
            crash_after: None,
        }
    }

    fn respond(mut self, case: &str, response: HttpResp) -> Self {
        self.responses.insert(case.to_string(), Ok(response));
        self
    }

    fn fail(mut self, case: &str, message: &str) -> Self {
        self.responses
            .insert(case.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl RequestEmulator for FakeEmulator {
    async fn simulate_request(
        &self,
        _app_id: u64,
        tc: &TestCase,
        _test_set_id: &str,
    ) -> Result<HttpResp> {
        log_event(
            &self.log,
            Event::Simulate {
                case: tc.name.clone(),
                url: tc.http_req.url.clone(),
            },
        );
        let outcome = match self.responses.get(&tc.name) {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(message)) => Err(Error::emulation(message.clone())),
            None => Ok(tc.http_resp.clone()),
        };
        if let Some((case, flag)) = &self.crash_after {
            if case == &tc.name {
                flag.store(true, Ordering::SeqCst);
            }
        }
        outcome
    }

    async fn process_test_run_status(&self, passed: bool, test_set_id: &str) {
        log_event(
            &self.log,
            Event::RunStatus {
                set: test_set_id.to_string(),
                passed,
            },
        );
    }

    fn fetch_mock_name(&self) -> String {
        "mocks".to_string()
    }

    async fn process_mock_file(&self, test_set_id: &str) {
        log_event(
            &self.log,
            Event::ProcessMockFile {
                set: test_set_id.to_string(),
            },
        );
    }

    async fn after_test_hook(
        &self,
        _test_run_id: &str,
        test_set_id: &str,
        _total_test_sets: usize,
    ) -> Result<TestReport> {
        log_event(
            &self.log,
            Event::AfterTestHook {
                set: test_set_id.to_string(),
            },
        );
        Ok(TestReport {
            version: String::new(),
            test_set: test_set_id.to_string(),
            status: TestSetStatus::Running,
            total: 0,
            success: 0,
            failure: 0,
            tests: Vec::new(),
        })
    }
}

#[derive(Default)]
struct FakeTelemetry {
    test_runs: StdMutex<Vec<(usize, usize, usize, String)>>,
    set_runs: StdMutex<Vec<(usize, usize, String, String)>>,
    mock_runs: StdMutex<Vec<usize>>,
}

impl Telemetry for FakeTelemetry {
    fn test_set_run(&self, success: usize, failure: usize, test_set_id: &str, run_status: &str) {
        self.set_runs.lock().expect("set runs").push((
            success,
            failure,
            test_set_id.to_string(),
            run_status.to_string(),
        ));
    }

    fn test_run(&self, success: usize, failure: usize, test_sets: usize, run_status: &str) {
        self.test_runs.lock().expect("test runs").push((
            success,
            failure,
            test_sets,
            run_status.to_string(),
        ));
    }

    fn mock_test_run(&self, utilized_mocks: usize) {
        self.mock_runs.lock().expect("mock runs").push(utilized_mocks);
    }
}

// ---------------------------------------------------------------------------
// World: wires fakes into a Replayer on a fresh runtime
// ---------------------------------------------------------------------------

struct World {
    log: EventLog,
    config: Config,
    sets: Vec<(&'static str, Vec<TestCase>)>,
    mocks: Vec<Mock>,
    emulator: Option<FakeEmulator>,
    instrumentation: Option<FakeInstrumentation>,
    report_db: Option<FakeReportDb>,
    set_configs: BTreeMap<String, TestSet>,
}

impl World {
    fn new(sets: Vec<(&'static str, Vec<TestCase>)>) -> Self {
        let mut config = Config::default();
        config.command = "./user-app".to_string();
        config.path = std::path::PathBuf::from("/tmp/rewind-data");
        config.test.delay = 0;
        Self {
            log: Arc::new(StdMutex::new(Vec::new())),
            config,
            sets,
            mocks: Vec::new(),
            emulator: None,
            instrumentation: None,
            report_db: None,
            set_configs: BTreeMap::new(),
        }
    }

    fn finish(
        self,
    ) -> (
        Arc<Replayer>,
        Arc<FakeReportDb>,
        Arc<FakeTelemetry>,
        EventLog,
        asupersync::runtime::Runtime,
    ) {
        let runtime = asupersync::runtime::RuntimeBuilder::new()
            .blocking_threads(1, 4)
            .build()
            .expect("build runtime");
        let handle = runtime.handle().clone();

        let log = Arc::clone(&self.log);
        let test_db = Arc::new(FakeTestDb::new(self.sets));
        let mock_db = Arc::new(FakeMockDb {
            mocks: self.mocks,
            log: Arc::clone(&log),
        });
        let report_db = Arc::new(
            self.report_db
                .unwrap_or_else(|| FakeReportDb::with_log(Arc::clone(&log))),
        );
        let set_config = Arc::new(FakeConfigStore {
            sets: self.set_configs,
        });
        let telemetry = Arc::new(FakeTelemetry::default());
        let instrumentation = Arc::new(
            self.instrumentation
                .unwrap_or_else(|| FakeInstrumentation::new(Arc::clone(&log))),
        );
        let emulator = Arc::new(
            self.emulator
                .unwrap_or_else(|| FakeEmulator::new(Arc::clone(&log))),
        );

        let replayer = Arc::new(Replayer::new(
            test_db,
            mock_db,
            Arc::clone(&report_db) as Arc<dyn ReportDb>,
            set_config,
            Arc::clone(&telemetry) as Arc<dyn Telemetry>,
            instrumentation,
            emulator,
            Arc::new(self.config),
            handle,
        ));
        (replayer, report_db, telemetry, log, runtime)
    }
}

fn start_run(
    replayer: &Arc<Replayer>,
    runtime: &asupersync::runtime::Runtime,
    scope: &CancelScope,
) -> Result<()> {
    let replayer = Arc::clone(replayer);
    let scope = scope.clone();
    let join = runtime
        .handle()
        .spawn(async move { replayer.start(&scope).await });
    runtime.block_on(join)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn happy_path_one_set_two_cases() {
    let world = World::new(vec![(
        "test-set-1",
        vec![
            case("case-1", 100, 200, r#"{"ok":true}"#),
            case("case-2", 200, 201, ""),
        ],
    )]);
    let (replayer, report_db, telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("terminal report");
    assert_eq!(report.status, TestSetStatus::Passed);
    assert_eq!(report.total, 2);
    assert_eq!(report.success, 2);
    assert_eq!(report.failure, 0);
    assert_eq!(report.tests.len(), 2);
    assert!(report
        .tests
        .iter()
        .all(|t| t.status == TestCaseStatus::Passed));

    let history = report_db.report_history("test-run-1", "test-set-1");
    assert_eq!(history[0].status, TestSetStatus::Running);
    assert_eq!(history.last().expect("final").status, TestSetStatus::Passed);

    let runs = telemetry.test_runs.lock().expect("test runs").clone();
    assert_eq!(runs, vec![(2, 0, 1, "pass".to_string())]);
    let set_runs = telemetry.set_runs.lock().expect("set runs").clone();
    assert_eq!(
        set_runs,
        vec![(2, 0, "test-set-1".to_string(), "PASSED".to_string())]
    );

    let log = events(&log);
    assert!(log.contains(&Event::ProcessMockFile {
        set: "test-set-1".to_string()
    }));
    assert!(log.contains(&Event::AfterTestHook {
        set: "test-set-1".to_string()
    }));
    assert!(log.contains(&Event::RunStatus {
        set: "test-set-1".to_string(),
        passed: true
    }));
}

#[test]
fn mock_window_tracks_each_case() {
    let world = World::new(vec![(
        "test-set-1",
        vec![
            case("case-1", 100, 200, ""),
            case("case-2", 300, 200, ""),
        ],
    )]);
    let (replayer, _report_db, _telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    let log = events(&log);
    let sim_idx = |name: &str| {
        log.iter()
            .position(|e| matches!(e, Event::Simulate { case, .. } if case == name))
            .expect("simulate event")
    };
    for (name, req_secs, resp_secs) in [("case-1", 100, 101), ("case-2", 300, 301)] {
        let idx = sim_idx(name);
        let window = log[..idx]
            .iter()
            .rev()
            .find_map(|e| match e {
                Event::FilteredMocks { after, before } => Some((*after, *before)),
                _ => None,
            })
            .expect("window before simulate");
        assert_eq!(window, (req_secs, resp_secs), "window for {name}");
    }

    // Between two consecutive cases exactly one SetMocks call occurs.
    let between = &log[sim_idx("case-1")..sim_idx("case-2")];
    let set_mocks_between = between
        .iter()
        .filter(|e| matches!(e, Event::SetMocks))
        .count();
    assert_eq!(set_mocks_between, 1);

    // Per-case ordering: SetMocks -> Simulate -> ConsumedMocks -> InsertResult.
    let positions: Vec<usize> = [
        log.iter()
            .position(|e| matches!(e, Event::Simulate { case, .. } if case == "case-1"))
            .expect("simulate"),
        log.iter()
            .position(|e| matches!(e, Event::ConsumedMocks))
            .expect("consumed"),
        log.iter()
            .position(|e| matches!(e, Event::InsertResult { case } if case == "case-1"))
            .expect("insert"),
    ]
    .to_vec();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn body_diff_masked_by_noise_passes() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, r#"{"id":"X","ts":123}"#)],
    )]);
    let live = HttpResp {
        status_code: 200,
        header: [(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]
        .into_iter()
        .collect(),
        body: r#"{"id":"X","ts":999}"#.to_string(),
        timestamp: at(500),
    };
    world
        .config
        .test
        .global_noise
        .global
        .insert("body.ts".to_string(), vec![".*".to_string()]);
    world.emulator = Some(FakeEmulator::new(Arc::clone(&world.log)).respond("case-1", live));
    let (replayer, report_db, _telemetry, _log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    assert_eq!(report.status, TestSetStatus::Passed);
}

#[test]
fn body_diff_without_noise_fails_set() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, r#"{"id":"X","ts":123}"#)],
    )]);
    let live = HttpResp {
        status_code: 200,
        header: [(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]
        .into_iter()
        .collect(),
        body: r#"{"id":"X","ts":999}"#.to_string(),
        timestamp: at(500),
    };
    world.emulator = Some(FakeEmulator::new(Arc::clone(&world.log)).respond("case-1", live));
    let (replayer, report_db, telemetry, _log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run completes");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    assert_eq!(report.status, TestSetStatus::Failed);
    assert_eq!(report.failure, 1);
    let runs = telemetry.test_runs.lock().expect("runs").clone();
    assert_eq!(runs, vec![(0, 1, 1, "fail".to_string())]);
}

#[test]
fn simulate_error_counts_as_failure_and_continues() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![
            case("case-1", 100, 200, ""),
            case("case-2", 200, 200, ""),
        ],
    )]);
    world.emulator =
        Some(FakeEmulator::new(Arc::clone(&world.log)).fail("case-1", "connection refused"));
    let (replayer, report_db, _telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run completes");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    // A transport failure is a failed case, not an infrastructure error,
    // and the loop continues; no result record exists for the failed case.
    assert_eq!(report.status, TestSetStatus::Failed);
    assert_eq!(report.failure, 1);
    assert_eq!(report.success, 1);
    assert_eq!(report.tests.len(), 1);
    assert_eq!(report.tests[0].test_case_id, "case-2");

    let log = events(&log);
    assert!(log
        .iter()
        .any(|e| matches!(e, Event::Simulate { case, .. } if case == "case-2")));
}

#[test]
fn app_crash_mid_set_halts_run() {
    let mut world = World::new(vec![
        (
            "test-set-1",
            vec![
                case("case-1", 100, 200, ""),
                case("case-2", 200, 200, ""),
            ],
        ),
        ("test-set-2", vec![case("case-1", 100, 200, "")]),
    ]);

    let instrumentation = FakeInstrumentation::new(Arc::clone(&world.log));
    let crash_flag = Arc::clone(&instrumentation.crash);
    world.instrumentation = Some(instrumentation);

    let mut emulator = FakeEmulator::new(Arc::clone(&world.log));
    emulator.crash_after = Some(("case-1".to_string(), crash_flag));
    world.emulator = Some(emulator);

    let mut report_db = FakeReportDb::with_log(Arc::clone(&world.log));
    report_db.stall_after_insert = Some("case-1".to_string());
    world.report_db = Some(report_db);

    let (replayer, report_db, telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run returns cleanly");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    assert_eq!(report.status, TestSetStatus::AppHalted);

    // The first case's verdict was persisted before the crash surfaced.
    let results = report_db.stored_results("test-run-1", "test-set-1");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].test_case_id, "case-1");
    assert_eq!(results[0].status, TestCaseStatus::Passed);

    // The run aborted: the second set was never started.
    assert!(report_db.final_report("test-run-1", "test-set-2").is_none());
    let log = events(&log);
    assert!(!log
        .iter()
        .any(|e| matches!(e, Event::Simulate { case, .. } if case == "case-2")));

    let runs = telemetry.test_runs.lock().expect("runs").clone();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].3, "fail");
}

#[test]
fn pruning_runs_once_for_passing_set() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![
            case("case-1", 100, 200, ""),
            case("case-2", 200, 200, ""),
            case("case-3", 300, 200, ""),
        ],
    )]);
    world.config.test.remove_unused_mocks = true;
    world.instrumentation = Some(
        FakeInstrumentation::new(Arc::clone(&world.log)).with_consumed(vec![
            vec!["m1".to_string()],
            vec!["m3".to_string()],
            vec!["m1".to_string()],
        ]),
    );
    let (replayer, report_db, telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    assert_eq!(report.status, TestSetStatus::Passed);

    let log = events(&log);
    let prune_calls: Vec<&Event> = log
        .iter()
        .filter(|e| matches!(e, Event::UpdateMocks { .. }))
        .collect();
    assert_eq!(prune_calls.len(), 1, "pruning runs exactly once");
    assert_eq!(
        prune_calls[0],
        &Event::UpdateMocks {
            consumed: vec!["m1".to_string(), "m3".to_string()]
        }
    );
    // Pruning happens after the last per-case insert.
    let prune_idx = log
        .iter()
        .position(|e| matches!(e, Event::UpdateMocks { .. }))
        .expect("prune");
    let last_insert = log
        .iter()
        .rposition(|e| matches!(e, Event::InsertResult { .. }))
        .expect("insert");
    assert!(prune_idx > last_insert);

    assert_eq!(
        telemetry.mock_runs.lock().expect("mock runs").clone(),
        vec![2]
    );
}

#[test]
fn failing_set_never_prunes() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, r#"{"a":1}"#)],
    )]);
    world.config.test.remove_unused_mocks = true;
    let live = HttpResp {
        status_code: 500,
        header: BTreeMap::new(),
        body: String::new(),
        timestamp: at(500),
    };
    world.emulator = Some(FakeEmulator::new(Arc::clone(&world.log)).respond("case-1", live));
    let (replayer, _report_db, _telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run completes");

    assert!(!events(&log)
        .iter()
        .any(|e| matches!(e, Event::UpdateMocks { .. })));
}

#[test]
fn override_base_url_rewrites_and_skips_instrumentation() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, "")],
    )]);
    world.config.test.base_path = "https://api.test/prefix".to_string();
    world
        .set_configs
        .insert("test-set-1".to_string(), TestSet::default());
    let (replayer, report_db, _telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    assert_eq!(report.status, TestSetStatus::Passed);

    let log = events(&log);
    let url = log
        .iter()
        .find_map(|e| match e {
            Event::Simulate { url, .. } => Some(url.clone()),
            _ => None,
        })
        .expect("simulate event");
    assert_eq!(url, "https://api.test/prefix/v1/case-1?a=1");

    for forbidden in [Event::Setup, Event::Hook, Event::RunApp, Event::MockOutgoing, Event::SetMocks]
    {
        assert!(
            !log.contains(&forbidden),
            "{forbidden:?} must not happen in override mode"
        );
    }
    assert!(!log
        .iter()
        .any(|e| matches!(e, Event::FilteredMocks { .. })));
}

#[test]
fn user_abort_during_warmup() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, "")],
    )]);
    world.config.test.delay = 5;
    let (replayer, report_db, _telemetry, _log, runtime) = world.finish();

    let scope = CancelScope::root();
    {
        let scope = scope.clone();
        runtime.handle().spawn(async move {
            asupersync::time::sleep(asupersync::time::wall_now(), Duration::from_millis(100)).await;
            scope.cancel();
        });
    }

    let err = start_run(&replayer, &runtime, &scope).expect_err("aborted");
    assert!(err.is_aborted());

    // Abort landed before the report was seeded.
    assert!(report_db.final_report("test-run-1", "test-set-1").is_none());
}

#[test]
fn empty_test_set_list_is_a_user_facing_error() {
    let world = World::new(Vec::new());
    let (replayer, report_db, telemetry, _log, runtime) = world.finish();

    let err = start_run(&replayer, &runtime, &CancelScope::root()).expect_err("must fail");
    assert!(matches!(err, Error::Validation(_)));
    assert!(report_db.reports.lock().expect("reports").is_empty());
    assert!(telemetry.test_runs.lock().expect("runs").is_empty());
}

#[test]
fn empty_set_passes_with_zero_total() {
    let world = World::new(vec![("test-set-1", Vec::new())]);
    let (replayer, report_db, telemetry, _log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    // The runner returns PASSED before seeding any report.
    assert!(report_db.final_report("test-run-1", "test-set-1").is_none());
    let set_runs = telemetry.set_runs.lock().expect("set runs").clone();
    assert!(set_runs.is_empty());
    let runs = telemetry.test_runs.lock().expect("runs").clone();
    assert_eq!(runs, vec![(0, 0, 1, "pass".to_string())]);
}

#[test]
fn case_selection_limits_total_and_driven() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![
            case("case-1", 100, 200, ""),
            case("case-2", 200, 200, ""),
            case("case-3", 300, 200, ""),
        ],
    )]);
    world
        .config
        .test
        .selected_tests
        .insert("test-set-1".to_string(), vec!["case-2".to_string()]);
    let (replayer, report_db, _telemetry, log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run succeeds");

    let report = report_db
        .final_report("test-run-1", "test-set-1")
        .expect("report");
    assert_eq!(report.total, 1);
    assert_eq!(report.success, 1);
    assert_eq!(report.tests.len(), 1);
    assert_eq!(report.tests[0].test_case_id, "case-2");

    let simulated: Vec<String> = events(&log)
        .iter()
        .filter_map(|e| match e {
            Event::Simulate { case, .. } => Some(case.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(simulated, vec!["case-2".to_string()]);
}

#[test]
fn run_ids_are_monotonic_across_runs() {
    let world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, "")],
    )]);
    let (replayer, report_db, _telemetry, _log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("first run");
    assert!(report_db.final_report("test-run-1", "test-set-1").is_some());

    start_run(&replayer, &runtime, &CancelScope::root()).expect("second run");
    assert!(report_db.final_report("test-run-2", "test-set-1").is_some());
}

// ---------------------------------------------------------------------------
// Normalize / denoise
// ---------------------------------------------------------------------------

#[test]
fn normalize_rewrites_failed_cases_and_is_idempotent() {
    let mut world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, r#"{"v":1}"#)],
    )]);
    let live = HttpResp {
        status_code: 200,
        header: [(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]
        .into_iter()
        .collect(),
        body: r#"{"v":2}"#.to_string(),
        timestamp: at(500),
    };
    world.emulator =
        Some(FakeEmulator::new(Arc::clone(&world.log)).respond("case-1", live.clone()));
    let (replayer, report_db, _telemetry, _log, runtime) = world.finish();

    start_run(&replayer, &runtime, &CancelScope::root()).expect("run completes");
    assert_eq!(
        report_db
            .final_report("test-run-1", "test-set-1")
            .expect("report")
            .status,
        TestSetStatus::Failed
    );

    let normalize = |replayer: &Arc<Replayer>| {
        let replayer = Arc::clone(replayer);
        let join = runtime.handle().spawn(async move {
            let scope = CancelScope::root();
            replayer.normalize(&scope).await
        });
        runtime.block_on(join)
    };
    normalize(&replayer).expect("normalize succeeds");

    let fetch_cases = |replayer: &Arc<Replayer>| {
        let replayer = Arc::clone(replayer);
        let join = runtime
            .handle()
            .spawn(async move { replayer.get_test_cases("test-set-1").await });
        runtime.block_on(join)
    };

    // The stored case now carries the live response.
    let cases = fetch_cases(&replayer).expect("cases");
    assert_eq!(cases[0].http_resp.body, r#"{"v":2}"#);

    // Second normalize from the same run changes nothing.
    normalize(&replayer).expect("normalize twice");
    let cases = fetch_cases(&replayer).expect("cases");
    assert_eq!(cases[0].http_resp.body, r#"{"v":2}"#);
}

#[test]
fn denoise_add_then_remove_is_identity() {
    let world = World::new(vec![(
        "test-set-1",
        vec![case("case-1", 100, 200, r#"{"ts":1}"#)],
    )]);
    let (replayer, _report_db, _telemetry, _log, runtime) = world.finish();

    let mut mask = NoiseMask::new();
    mask.insert("body.ts".to_string(), vec![".*".to_string()]);

    let denoise = |replayer: &Arc<Replayer>, op: rewind::models::NoiseOp, mask: NoiseMask| {
        let replayer = Arc::clone(replayer);
        let join = runtime.handle().spawn(async move {
            let scope = CancelScope::root();
            replayer
                .denoise_test_cases(
                    &scope,
                    "test-set-1",
                    vec![rewind::models::NoiseParams {
                        test_case_id: "case-1".to_string(),
                        ops: op,
                        assertion: mask,
                        after_noise: NoiseMask::new(),
                    }],
                )
                .await
        });
        runtime.block_on(join)
    };

    let added = denoise(&replayer, rewind::models::NoiseOp::Add, mask.clone())
        .expect("denoise add");
    assert!(added[0].after_noise.contains_key("body.ts"));

    let removed = denoise(&replayer, rewind::models::NoiseOp::Remove, mask)
        .expect("denoise remove");
    assert!(removed[0].after_noise.is_empty());
}
