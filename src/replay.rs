//! Replay orchestration: the run orchestrator and the test-set runner.
//!
//! One `Replayer` drives a whole test run: it derives the next run ID,
//! brings the application up under instrumentation (unless an override
//! base URL short-circuits that), then replays every selected test set
//! sequentially. Each set owns a nested cancellation scope, an app
//! supervisor task and an exit-condition watcher; both tasks are joined
//! before the runner returns.
//!
//! # Ordering invariants
//!
//! - Within a set, cases execute strictly in storage order.
//! - For case `i`: `set_mocks` happens-before `simulate_request`
//!   happens-before `get_consumed_mocks` happens-before the result insert.
//! - The mock window installed before case `i` is
//!   `[req_i.timestamp, resp_i.timestamp]`.
//! - The terminal report write runs under a detached scope so cancellation
//!   cannot lose it.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    base_time, version, AppErrorKind, ComparisonResult, HttpResp, TestCase, TestCaseStatus,
    TestReport, TestResult, TestSetStatus,
};
use crate::noise::{left_join, match_response};
use crate::report::{next_run_id, RunSummary, TEST_RUN_TEMPLATE};
use crate::scope::{CancelScope, ExitCell};
use crate::script::{execute_script, SCRIPT_TIMEOUT};
use crate::service::{
    HookOptions, InstrumentMode, Instrumentation, InstrumentState, MockAction, MockDb,
    OutgoingOptions, ReportDb, RequestEmulator, RunOptions, SetupOptions, Telemetry, TestDb,
    TestSetConfigStore,
};
use crate::urlrewrite::{replace_base_url, replace_host_with_ip};
use asupersync::channel::oneshot;
use asupersync::runtime::RuntimeHandle;
use asupersync::time::{sleep, wall_now};
use asupersync::Cx;
use chrono::Utc;
use futures::future::{BoxFuture, Either};
use futures::FutureExt;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Map a classified application error onto the set terminal status.
const fn classify_app_error(kind: AppErrorKind) -> TestSetStatus {
    match kind {
        AppErrorKind::CommandError => TestSetStatus::FaultUserApp,
        AppErrorKind::Internal => TestSetStatus::InternalErr,
        AppErrorKind::AppStopped | AppErrorKind::Unexpected | AppErrorKind::CtxCanceled => {
            TestSetStatus::AppHalted
        }
    }
}

/// Whether a post-script failure may override `current`.
///
/// Script faults outrank plain comparison failures but never an abort
/// class already recorded for the set.
const fn script_fault_overrides(current: TestSetStatus) -> bool {
    matches!(
        current,
        TestSetStatus::Running | TestSetStatus::Passed | TestSetStatus::Failed
    )
}

/// The replay engine.
pub struct Replayer {
    pub(crate) test_db: Arc<dyn TestDb>,
    pub(crate) mock_db: Arc<dyn MockDb>,
    pub(crate) report_db: Arc<dyn ReportDb>,
    pub(crate) set_config: Arc<dyn TestSetConfigStore>,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    pub(crate) instrumentation: Arc<dyn Instrumentation>,
    pub(crate) emulator: Arc<dyn RequestEmulator>,
    pub(crate) config: Arc<Config>,
    runtime: RuntimeHandle,
    summary: StdMutex<RunSummary>,
}

impl Replayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        test_db: Arc<dyn TestDb>,
        mock_db: Arc<dyn MockDb>,
        report_db: Arc<dyn ReportDb>,
        set_config: Arc<dyn TestSetConfigStore>,
        telemetry: Arc<dyn Telemetry>,
        instrumentation: Arc<dyn Instrumentation>,
        emulator: Arc<dyn RequestEmulator>,
        config: Arc<Config>,
        runtime: RuntimeHandle,
    ) -> Self {
        Self {
            test_db,
            mock_db,
            report_db,
            set_config,
            telemetry,
            instrumentation,
            emulator,
            config,
            runtime,
            summary: StdMutex::new(RunSummary::new()),
        }
    }

    /// Run every selected test set once. Returns `Err(Error::Aborted)` when
    /// the caller's scope is canceled mid-run.
    pub async fn start(&self, scope: &CancelScope) -> Result<()> {
        let run_scope = scope.child();
        let mut instrument_state = InstrumentState::default();
        let outcome = self.start_inner(&run_scope, &mut instrument_state).await;
        instrument_state.release();
        run_scope.cancel();
        outcome
    }

    async fn start_inner(
        &self,
        run_scope: &CancelScope,
        instrument_state: &mut InstrumentState,
    ) -> Result<()> {
        let test_set_ids = run_scope
            .guard(self.test_db.get_all_test_set_ids())
            .await??;
        if test_set_ids.is_empty() {
            return Err(Error::validation(
                "no test sets found in the recording directory; record test cases first",
            ));
        }

        let test_run_id = run_scope.guard(self.next_test_run_id()).await??;
        *instrument_state = self.instrument(run_scope).await?;

        let mut run_passed = true;
        let mut abort_run = false;

        for test_set_id in &test_set_ids {
            if !self.config.set_selected(test_set_id) {
                continue;
            }
            self.emulator.process_mock_file(test_set_id).await;

            let status = self
                .run_test_set(run_scope, test_set_id, &test_run_id, instrument_state.app_id, false)
                .await?;
            let mut set_passed = false;
            match status {
                TestSetStatus::Passed => {
                    set_passed = true;
                    self.emulator
                        .process_test_run_status(true, test_set_id)
                        .await;
                }
                TestSetStatus::Failed | TestSetStatus::Running => {}
                TestSetStatus::AppHalted
                | TestSetStatus::InternalErr
                | TestSetStatus::FaultUserApp
                | TestSetStatus::FaultScript => {
                    abort_run = true;
                }
                TestSetStatus::UserAbort => return Ok(()),
            }
            run_passed = run_passed && set_passed;
            if abort_run {
                break;
            }

            if let Err(err) = self
                .emulator
                .after_test_hook(&test_run_id, test_set_id, test_set_ids.len())
                .await
            {
                tracing::error!(%err, "after-test hook failed");
            }
        }

        let run_status = if run_passed { "pass" } else { "fail" };
        {
            let summary = self.summary.lock().expect("summary lock");
            self.telemetry.test_run(
                summary.total_passed(),
                summary.total_failed(),
                test_set_ids.len(),
                run_status,
            );
        }

        if !abort_run {
            let rendered = self.render_summary();
            if !rendered.is_empty() {
                tracing::info!("\n{rendered}");
            }
        }
        Ok(())
    }

    /// Launch the application under instrumentation and start the proxy.
    ///
    /// With an override base URL both are skipped and the sentinel state is
    /// returned.
    pub async fn instrument(&self, scope: &CancelScope) -> Result<InstrumentState> {
        if self.config.base_path_set() {
            tracing::info!(
                base_path = %self.config.test.base_path,
                "outgoing calls are not mocked when an override base URL is set"
            );
            return Ok(InstrumentState::default());
        }

        let app_id = scope
            .guard(self.instrumentation.setup(
                &self.config.command,
                SetupOptions {
                    container: self.config.container_name.clone(),
                    docker_network: self.config.network_name.clone(),
                    build_delay: self.config.build_delay,
                },
            ))
            .await?
            .map_err(|e| Error::instrumentation(format!("failed to set up instrumentation: {e}")))?;

        if scope.is_canceled() {
            return Err(Error::Aborted);
        }

        // Hooks outlive run cancellation; they are released explicitly
        // through the returned state.
        let hook_scope = scope.detached();
        if let Err(err) = self
            .instrumentation
            .hook(
                &hook_scope,
                app_id,
                HookOptions {
                    mode: InstrumentMode::Test,
                    enable_testing: self.config.enable_testing,
                },
            )
            .await
        {
            hook_scope.cancel();
            return Err(Error::instrumentation(format!(
                "failed to start the hooks and proxy: {err}"
            )));
        }
        Ok(InstrumentState::new(app_id, hook_scope))
    }

    /// Derive the next test-run ID from the IDs already stored.
    pub async fn next_test_run_id(&self) -> Result<String> {
        let run_ids = self.report_db.get_all_test_run_ids().await?;
        Ok(next_run_id(&run_ids, TEST_RUN_TEMPLATE))
    }

    /// All recorded test-set IDs.
    pub async fn get_all_test_set_ids(&self) -> Result<Vec<String>> {
        self.test_db.get_all_test_set_ids().await
    }

    /// Recorded test cases of one set.
    pub async fn get_test_cases(&self, test_set_id: &str) -> Result<Vec<TestCase>> {
        self.test_db.get_test_cases(test_set_id).await
    }

    /// Terminal status of a set in a given run, read back from its report.
    pub async fn get_test_set_status(
        &self,
        test_run_id: &str,
        test_set_id: &str,
    ) -> Result<TestSetStatus> {
        let report = self.report_db.get_report(test_run_id, test_set_id).await?;
        Ok(report.status)
    }

    /// Drive one test set end to end.
    pub async fn run_test_set(
        &self,
        scope: &CancelScope,
        test_set_id: &str,
        test_run_id: &str,
        app_id: u64,
        serve_test: bool,
    ) -> Result<TestSetStatus> {
        let set_scope = scope.child();
        let exit_cell = Arc::new(ExitCell::new());
        let mut tasks: Vec<BoxFuture<'static, ()>> = Vec::new();

        let outcome = self
            .drive_test_set(
                &set_scope,
                &exit_cell,
                &mut tasks,
                test_set_id,
                test_run_id,
                app_id,
                serve_test,
            )
            .await;

        // The supervisor and the watcher must both return before we do.
        set_scope.cancel();
        for task in tasks {
            task.await;
        }
        outcome
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    async fn drive_test_set(
        &self,
        set_scope: &CancelScope,
        exit_cell: &Arc<ExitCell>,
        tasks: &mut Vec<BoxFuture<'static, ()>>,
        test_set_id: &str,
        test_run_id: &str,
        app_id: u64,
        serve_test: bool,
    ) -> Result<TestSetStatus> {
        // Phase A: pre-script, only in override-base-URL mode.
        let mut post_script = String::new();
        if self.config.base_path_set() {
            let conf = set_scope
                .guard(self.set_config.read(test_set_id))
                .await?
                .map_err(|e| Error::storage(format!("failed to read test set config: {e}")))?
                .ok_or_else(|| Error::config("test set config not found"))?;
            post_script = conf.post_script;

            tracing::info!(script = %conf.pre_script, test_set = %test_set_id, "running pre-script");
            match execute_script(set_scope, &conf.pre_script, SCRIPT_TIMEOUT).await {
                Ok(()) => {}
                Err(Error::Aborted) => return Err(Error::Aborted),
                Err(err) => {
                    tracing::error!(%err, test_set = %test_set_id, "failed to execute pre-script");
                    return Ok(TestSetStatus::FaultScript);
                }
            }
        }

        let mut success = 0usize;
        let mut failure = 0usize;
        let mut total_consumed_mocks: BTreeSet<String> = BTreeSet::new();
        let mut test_set_status = TestSetStatus::Passed;

        tracing::info!(test_set = %test_set_id, "running");

        let test_cases = set_scope
            .guard(self.test_db.get_test_cases(test_set_id))
            .await??;
        if test_cases.is_empty() {
            return Ok(TestSetStatus::Passed);
        }

        let cmd_kind = self.config.command_kind();
        let mut user_ip = String::new();

        // Phase B: initial mock window covers everything up to now.
        self.setup_or_update_mocks(
            set_scope,
            app_id,
            test_set_id,
            MockAction::Start,
            base_time(),
            Utc::now(),
        )
        .await?;

        // Phase C: application supervision.
        if !self.config.base_path_set() {
            let mut err_rx = None;
            if !serve_test {
                let (tx, rx) = oneshot::channel();
                err_rx = Some(rx);
                let instrumentation = Arc::clone(&self.instrumentation);
                let supervisor_scope = set_scope.clone();
                tasks.push(Box::pin(self.runtime.spawn(async move {
                    let app_err = instrumentation
                        .run_app(&supervisor_scope, app_id, RunOptions::default())
                        .await;
                    if app_err.kind != AppErrorKind::CtxCanceled {
                        let cx = Cx::for_request();
                        let _ = tx.send(&cx, app_err);
                    }
                })));
            }

            let watcher_scope = set_scope.clone();
            let watcher_cell = Arc::clone(exit_cell);
            tasks.push(Box::pin(self.runtime.spawn(async move {
                let status = match err_rx {
                    Some(rx) => {
                        let cx = Cx::for_request();
                        let recv = rx.recv(&cx).fuse();
                        let cancel = watcher_scope.canceled().fuse();
                        futures::pin_mut!(recv, cancel);
                        match futures::future::select(recv, cancel).await {
                            Either::Left((Ok(app_err), _)) => {
                                tracing::error!(error = %app_err, "application failed to run");
                                classify_app_error(app_err.kind)
                            }
                            Either::Left((Err(_), _)) | Either::Right(((), _)) => {
                                TestSetStatus::UserAbort
                            }
                        }
                    }
                    None => {
                        watcher_scope.canceled().await;
                        TestSetStatus::UserAbort
                    }
                };
                watcher_cell.signal(status);
                watcher_scope.cancel();
            })));

            // Phase D: warmup delay for the application to come up.
            let delay = Duration::from_secs(self.config.test.delay);
            if set_scope.guard(sleep(wall_now(), delay)).await.is_err() {
                return Err(Error::Aborted);
            }

            if cmd_kind.is_docker() {
                user_ip = set_scope
                    .guard(self.instrumentation.get_container_ip(app_id))
                    .await??;
            }
        }

        // Phase E: seed the RUNNING report.
        let selected: Option<BTreeSet<String>> = self
            .config
            .selected_cases(test_set_id)
            .filter(|cases| !cases.is_empty())
            .map(|cases| cases.iter().cloned().collect());
        let total = selected
            .as_ref()
            .map_or(test_cases.len(), BTreeSet::len);

        let running_report = TestReport {
            version: version().to_string(),
            test_set: test_set_id.to_string(),
            status: TestSetStatus::Running,
            total,
            success: 0,
            failure: 0,
            tests: Vec::new(),
        };
        set_scope
            .guard(
                self.report_db
                    .insert_report(test_run_id, test_set_id, &running_report),
            )
            .await?
            .map_err(|e| Error::storage(format!("failed to insert report: {e}")))?;

        // Phase F: the per-case loop.
        let mut loop_err: Option<Error> = None;
        for test_case in &test_cases {
            if let Some(selected) = &selected {
                if !selected.contains(&test_case.name) {
                    continue;
                }
            }

            if let Some(status) = exit_cell.get() {
                test_set_status = status;
                break;
            }

            let mut test_case = test_case.clone();
            if self.config.base_path_set() {
                match replace_base_url(&self.config.test.base_path, &test_case.http_req.url) {
                    Ok(url) => test_case.http_req.url = url,
                    Err(err) => tracing::warn!(
                        test_case = %test_case.name,
                        base_path = %self.config.test.base_path,
                        %err,
                        "failed to replace the request base path"
                    ),
                }
            }

            if let Err(err) = self
                .setup_or_update_mocks(
                    set_scope,
                    app_id,
                    test_set_id,
                    MockAction::Update,
                    test_case.http_req.timestamp,
                    test_case.http_resp.timestamp,
                )
                .await
            {
                if !err.is_aborted() {
                    tracing::error!(%err, "failed to update mocks");
                }
                break;
            }

            if cmd_kind.is_docker() && !self.config.base_path_set() {
                match replace_host_with_ip(&test_case.http_req.url, &user_ip) {
                    Ok(url) => test_case.http_req.url = url,
                    Err(err) => {
                        tracing::error!(%err, "failed to replace host with container IP");
                        break;
                    }
                }
            }

            let started = Utc::now();
            let response = match set_scope
                .guard(
                    self.emulator
                        .simulate_request(app_id, &test_case, test_set_id),
                )
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    tracing::error!(%err, test_case = %test_case.name, "failed to simulate request");
                    failure += 1;
                    test_set_status = TestSetStatus::Failed;
                    continue;
                }
                Err(_) => {
                    failure += 1;
                    test_set_status = TestSetStatus::Failed;
                    continue;
                }
            };

            let mut consumed_mocks: Vec<String> = Vec::new();
            if !self.config.base_path_set() {
                match set_scope
                    .guard(self.instrumentation.get_consumed_mocks(app_id))
                    .await
                {
                    Ok(Ok(mocks)) => consumed_mocks = mocks,
                    Ok(Err(err)) => {
                        tracing::error!(%err, "failed to get consumed filtered mocks");
                    }
                    Err(_) => {}
                }
                if self.config.test.remove_unused_mocks {
                    total_consumed_mocks.extend(consumed_mocks.iter().cloned());
                }
            }

            let (test_pass, comparison) = self.compare_resp(&test_case, &response, test_set_id);
            if test_pass {
                tracing::info!(
                    test_case = %test_case.name,
                    test_set = %test_set_id,
                    passed = true,
                    "result"
                );
            } else {
                tracing::info!(
                    test_case = %test_case.name,
                    test_set = %test_set_id,
                    passed = false,
                    "result"
                );
                tracing::debug!(mocks = ?consumed_mocks, "consumed mocks");
            }
            let case_status = if test_pass {
                success += 1;
                TestCaseStatus::Passed
            } else {
                failure += 1;
                test_set_status = TestSetStatus::Failed;
                TestCaseStatus::Failed
            };

            let result = TestResult {
                test_case_id: test_case.name.clone(),
                test_set_id: test_set_id.to_string(),
                status: case_status,
                started: started.timestamp(),
                completed: Utc::now().timestamp(),
                req: test_case.http_req.clone(),
                res: response,
                test_case_path: self.config.path.join(test_set_id).display().to_string(),
                mock_path: self
                    .config
                    .path
                    .join(test_set_id)
                    .join(self.emulator.fetch_mock_name())
                    .display()
                    .to_string(),
                noise: test_case.noise.clone(),
                result: comparison,
            };
            match set_scope
                .guard(
                    self.report_db
                        .insert_test_case_result(test_run_id, test_set_id, &result),
                )
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(%err, "failed to insert test case result");
                    loop_err = Some(err);
                    break;
                }
                Err(aborted) => {
                    loop_err = Some(aborted);
                    break;
                }
            }

            if self.config.enable_testing {
                // Let the interception layer settle between cases when the
                // engine itself is under test.
                let _ = set_scope.guard(sleep(wall_now(), Duration::from_secs(1))).await;
            }
        }

        // Phase G: post-script, results, terminal report.
        if self.config.base_path_set() {
            tracing::info!(script = %post_script, test_set = %test_set_id, "running post-script");
            match execute_script(set_scope, &post_script, SCRIPT_TIMEOUT).await {
                Ok(()) => {}
                Err(Error::Aborted) => return Err(Error::Aborted),
                Err(err) => {
                    tracing::error!(%err, test_set = %test_set_id, "failed to execute post-script");
                    if script_fault_overrides(test_set_status) {
                        test_set_status = TestSetStatus::FaultScript;
                    }
                }
            }
        }

        let test_case_results = match set_scope
            .guard(
                self.report_db
                    .get_test_case_results(test_run_id, test_set_id),
            )
            .await
        {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                if !set_scope.is_canceled() {
                    tracing::error!(%err, "failed to get test case results");
                    test_set_status = TestSetStatus::InternalErr;
                }
                Vec::new()
            }
            Err(_) => Vec::new(),
        };

        if loop_err.as_ref().is_some_and(|err| !err.is_aborted()) {
            test_set_status = TestSetStatus::InternalErr;
        } else if let Some(status) = exit_cell.get() {
            test_set_status = status;
        }

        let final_report = TestReport {
            version: version().to_string(),
            test_set: test_set_id.to_string(),
            status: test_set_status,
            total,
            success,
            failure,
            tests: test_case_results,
        };

        // The terminal report must be written even when the run scope is
        // already canceled.
        let report_scope = set_scope.detached();
        report_scope
            .guard(
                self.report_db
                    .insert_report(test_run_id, test_set_id, &final_report),
            )
            .await?
            .map_err(|e| Error::storage(format!("failed to insert report: {e}")))?;

        // Phase H: prune mocks never consumed by a fully passing set.
        if self.config.test.remove_unused_mocks
            && test_set_status == TestSetStatus::Passed
            && !self.config.base_path_set()
        {
            tracing::debug!(
                test_set = %test_set_id,
                consumed = ?total_consumed_mocks,
                "consumed mocks from the completed test set"
            );
            match set_scope
                .guard(self.mock_db.update_mocks(test_set_id, &total_consumed_mocks))
                .await
            {
                Ok(Ok(())) => self.telemetry.mock_test_run(total_consumed_mocks.len()),
                Ok(Err(err)) => tracing::error!(%err, "failed to delete unused mocks"),
                Err(_) => {}
            }
        }

        {
            let mut summary = self.summary.lock().expect("summary lock");
            summary.record(
                test_set_id,
                &final_report,
                test_set_status == TestSetStatus::Passed,
            );
        }

        if matches!(
            test_set_status,
            TestSetStatus::Passed | TestSetStatus::Failed
        ) {
            tracing::info!(
                test_set = %test_set_id,
                total = final_report.total,
                passed = final_report.success,
                failed = final_report.failure,
                status = %test_set_status,
                "test set summary"
            );
        }

        // Phase I: per-set telemetry.
        self.telemetry.test_set_run(
            final_report.success,
            final_report.failure,
            test_set_id,
            test_set_status.as_str(),
        );
        Ok(test_set_status)
    }

    /// Fetch the filtered and unfiltered mock populations for a window.
    pub async fn get_mocks(
        &self,
        scope: &CancelScope,
        test_set_id: &str,
        after: chrono::DateTime<Utc>,
        before: chrono::DateTime<Utc>,
    ) -> Result<(Vec<crate::models::Mock>, Vec<crate::models::Mock>)> {
        if self.config.base_path_set() {
            tracing::debug!("mocks are not fetched when an override base URL is set");
            return Ok((Vec::new(), Vec::new()));
        }
        let filtered = scope
            .guard(self.mock_db.get_filtered_mocks(test_set_id, after, before))
            .await??;
        let unfiltered = scope
            .guard(self.mock_db.get_unfiltered_mocks(test_set_id, after, before))
            .await??;
        Ok((filtered, unfiltered))
    }

    /// Select the mock window `[after, before]` and hand it to the
    /// interception layer. `Start` additionally installs the outbound
    /// policy.
    pub async fn setup_or_update_mocks(
        &self,
        scope: &CancelScope,
        app_id: u64,
        test_set_id: &str,
        action: MockAction,
        after: chrono::DateTime<Utc>,
        before: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if self.config.base_path_set() {
            tracing::debug!("mocks are not installed when an override base URL is set");
            return Ok(());
        }

        let (filtered, unfiltered) = self.get_mocks(scope, test_set_id, after, before).await?;

        if action == MockAction::Start {
            scope
                .guard(self.instrumentation.mock_outgoing(
                    app_id,
                    OutgoingOptions {
                        rules: self.config.bypass_rules.clone(),
                        mongo_password: self.config.test.mongo_password.clone(),
                        sql_delay: self.config.test.sql_delay,
                        fallback_on_miss: self.config.test.fall_back_on_miss,
                        mocking: self.config.test.mocking,
                    },
                ))
                .await?
                .map_err(|e| {
                    Error::instrumentation(format!("failed to mock outgoing calls: {e}"))
                })?;
        }

        scope
            .guard(self.instrumentation.set_mocks(app_id, filtered, unfiltered))
            .await?
            .map_err(|e| Error::instrumentation(format!("failed to set mocks: {e}")))?;
        Ok(())
    }

    /// Compare a live response against the recorded one under the merged
    /// noise configuration.
    pub(crate) fn compare_resp(
        &self,
        tc: &TestCase,
        actual: &HttpResp,
        test_set_id: &str,
    ) -> (bool, ComparisonResult) {
        let global = &self.config.test.global_noise.global;
        let noise_config = match self.config.test.global_noise.test_sets.get(test_set_id) {
            Some(per_set) => left_join(global, per_set),
            None => global.clone(),
        };
        match_response(tc, actual, &noise_config, self.config.test.ignore_ordering)
    }

    /// Render the accumulated run summary.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let summary = self.summary.lock().expect("summary lock");
        if summary.total_tests() == 0 {
            return String::new();
        }
        summary.render()
    }

    /// Delete a whole test set.
    pub async fn delete_test_set(&self, test_set_id: &str) -> Result<()> {
        self.test_db.delete_test_set(test_set_id).await
    }

    /// Delete individual test cases from a set.
    pub async fn delete_tests(&self, test_set_id: &str, case_ids: &[String]) -> Result<()> {
        self.test_db.delete_tests(test_set_id, case_ids).await
    }
}
