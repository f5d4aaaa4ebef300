//! Normalize and denoise workflows.
//!
//! Normalize rewrites stored test cases from a past run's observed
//! responses: every selected case that did not pass in that run gets its
//! recorded response overwritten with the live one, so the next replay
//! passes. Running it twice with the same run is a no-op the second time.
//!
//! Denoise edits the per-case noise masks: `add` unions an assertion mask
//! into the stored mask, `remove` subtracts it, and each instruction
//! echoes the resulting mask back.

use crate::config::SelectedTests;
use crate::error::{Error, Result};
use crate::models::{NoiseOp, NoiseParams, TestCaseStatus, TestResult};
use crate::noise::{merge_masks, remove_masks};
use crate::replay::Replayer;
use crate::report::{last_run_id, TEST_RUN_TEMPLATE};
use crate::scope::CancelScope;
use std::collections::HashMap;

impl Replayer {
    /// Apply denoise instructions to a test set. Returns the instructions
    /// with `after_noise` filled in.
    pub async fn denoise_test_cases(
        &self,
        scope: &CancelScope,
        test_set_id: &str,
        mut noise_params: Vec<NoiseParams>,
    ) -> Result<Vec<NoiseParams>> {
        let test_cases = scope
            .guard(self.test_db.get_test_cases(test_set_id))
            .await??;

        for mut test_case in test_cases {
            for param in &mut noise_params {
                if test_case.name != param.test_case_id {
                    continue;
                }
                test_case.noise = match param.ops {
                    NoiseOp::Add => merge_masks(&test_case.noise, &param.assertion),
                    NoiseOp::Remove => remove_masks(&test_case.noise, &param.assertion),
                };
                scope
                    .guard(self.test_db.update_test_case(&test_case, test_set_id))
                    .await??;
                param.after_noise = test_case.noise.clone();
            }
        }
        Ok(noise_params)
    }

    /// Normalize the configured selection from the configured (or most
    /// recent) test run.
    pub async fn normalize(&self, scope: &CancelScope) -> Result<()> {
        let test_run_id = if self.config.normalize.test_run.is_empty() {
            let run_ids = scope
                .guard(self.report_db.get_all_test_run_ids())
                .await??;
            last_run_id(&run_ids, TEST_RUN_TEMPLATE)
                .ok_or_else(|| Error::validation("no test runs found to normalize from"))?
        } else {
            self.config.normalize.test_run.clone()
        };

        let mut selections = self.config.normalize.selected_tests.clone();
        if selections.is_empty() {
            let test_set_ids = scope
                .guard(self.test_db.get_all_test_set_ids())
                .await??;
            selections = test_set_ids
                .into_iter()
                .map(|test_set| SelectedTests {
                    test_set,
                    tests: Vec::new(),
                })
                .collect();
        }

        for selection in selections {
            self.normalize_test_cases(
                scope,
                &test_run_id,
                &selection.test_set,
                &selection.tests,
                Vec::new(),
            )
            .await?;
        }
        tracing::info!("normalized test cases; replay the tests to verify the changes");
        Ok(())
    }

    /// Normalize selected cases of one set from one run's results.
    ///
    /// Pass `results` to reuse already-fetched results; otherwise they are
    /// read from the run's report.
    pub async fn normalize_test_cases(
        &self,
        scope: &CancelScope,
        test_run_id: &str,
        test_set_id: &str,
        selected_case_ids: &[String],
        mut results: Vec<TestResult>,
    ) -> Result<()> {
        if results.is_empty() {
            let report = scope
                .guard(self.report_db.get_report(test_run_id, test_set_id))
                .await?
                .map_err(|e| Error::storage(format!("failed to get test report: {e}")))?;
            results = report.tests;
        }

        let result_map: HashMap<&str, &TestResult> = results
            .iter()
            .map(|result| (result.test_case_id.as_str(), result))
            .collect();

        let test_cases = scope
            .guard(self.test_db.get_test_cases(test_set_id))
            .await??;

        for mut test_case in test_cases {
            if !selected_case_ids.is_empty() && !selected_case_ids.contains(&test_case.name) {
                continue;
            }
            let Some(result) = result_map.get(test_case.name.as_str()) else {
                tracing::info!(
                    test_case = %test_case.name,
                    test_set = %test_set_id,
                    "test case not found in the test report"
                );
                continue;
            };
            if result.status == TestCaseStatus::Passed {
                continue;
            }
            test_case.http_resp = result.res.clone();
            scope
                .guard(self.test_db.update_test_case(&test_case, test_set_id))
                .await??;
        }
        Ok(())
    }
}
