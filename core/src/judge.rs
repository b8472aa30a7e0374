pub mod error {
    pub(crate) use anyhow::Context as _;
    pub use anyhow::{Error, Result};
}

use std::path::Path;

use chrono::{DateTime, Local};
use error::*;

use crate::config::TestPlan;
use crate::report::Reporter;
use crate::testing::{
    verifier, ExecutionOutcome, Failure, Supervisor, TestCase, TestGroup,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub testcase: TestCase,
    pub group: TestGroup,
    pub outcome: ExecutionOutcome,
}

/// Results of every attempted testcase, in execution order. Only the last one may have failed.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub results: Vec<CaseResult>,
}

impl RunSummary {
    pub fn failure(&self) -> Option<&CaseResult> {
        self.results.last().filter(|r| !r.outcome.is_passed())
    }

    pub fn num_passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_passed()).count()
    }

    pub fn all_passed(&self) -> bool {
        self.failure().is_none()
    }
}

/// Execute, verify, then audit the scratch dir: one testcase, one outcome.
pub async fn run_case(
    supervisor: &Supervisor,
    testcase: &TestCase,
    scratch_dir: &Path,
) -> Result<ExecutionOutcome> {
    let exec = supervisor.execute(testcase, scratch_dir).await?;
    let mut outcome = ExecutionOutcome {
        failure: exec.failure,
        execution_time: exec.execution_time,
        peak_memory_bytes: exec.peak_memory_bytes,
        disk_usage_bytes: None,
    };
    if !outcome.is_passed() {
        return Ok(outcome);
    }

    let mismatch = verifier::verify(testcase.output_path(), testcase.expected_path())
        .with_context(|| format!("Failed to verify output of test {}", testcase.index()))?;
    if let Some(mismatch) = mismatch {
        outcome.failure = Some(Failure::WrongAnswer(mismatch));
        return Ok(outcome);
    }

    let used_bytes = fsutil::dir_size(scratch_dir).context("Failed to measure disk usage")?;
    let limit = testcase.limits();
    if used_bytes > limit.disk_bytes() {
        outcome.failure = Some(Failure::DiskLimitExceeded {
            used_bytes,
            limit_mb: limit.disk_mb,
        });
    } else {
        outcome.disk_usage_bytes = Some(used_bytes);
    }
    Ok(outcome)
}

/// Run every group of `plan` in order, stopping the whole run at the first failed testcase.
pub async fn run_plan(
    plan: &TestPlan,
    supervisor: &Supervisor,
    reporter: &mut impl Reporter,
) -> Result<RunSummary> {
    let scratch_dir = plan.scratch_dir();
    let mut summary = RunSummary {
        started_at: Local::now(),
        results: Vec::new(),
    };

    log::info!("Running: {}", supervisor.get_command());

    for &group in plan.groups() {
        fsutil::clear_dir_contents(&scratch_dir)
            .with_context(|| format!("Failed to clear scratch dir before group {}", group))?;
        reporter.group_started(&group);

        for index in group.indices() {
            let testcase = plan.resolve(index)?;
            reporter.case_started(&testcase, &group);
            let outcome = self::run_case(supervisor, &testcase, &scratch_dir).await?;
            reporter.case_finished(&testcase, &group, &outcome);

            let passed = outcome.is_passed();
            summary.results.push(CaseResult {
                testcase,
                group,
                outcome,
            });
            if !passed {
                return Ok(summary);
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::report;
    use crate::testing::JudgeCode;

    #[derive(Default)]
    struct Recorder {
        groups: Vec<TestGroup>,
        started: Vec<usize>,
        lines: Vec<String>,
    }

    impl Reporter for Recorder {
        fn group_started(&mut self, group: &TestGroup) {
            self.groups.push(*group);
        }

        fn case_started(&mut self, testcase: &TestCase, _group: &TestGroup) {
            self.started.push(testcase.index());
        }

        fn case_finished(&mut self, t: &TestCase, g: &TestGroup, o: &ExecutionOutcome) {
            self.lines.push(report::report_line(t, g, o));
        }
    }

    /// Lays out `<root>/judge.toml`, `<root>/in/N.in`, `<root>/ans/N.out` and an empty `<root>/tmp`.
    fn setup(
        root: &Path,
        command: &str,
        cases: &[(&str, &str)],
        groups: &str,
        time_ms: u64,
        disk_mb: u64,
    ) -> TestPlan {
        for (i, (input, answer)) in cases.iter().enumerate() {
            fsutil::write_with_mkdir(root.join(format!("in/{}.in", i + 1)), input).unwrap();
            fsutil::write_with_mkdir(root.join(format!("ans/{}.out", i + 1)), answer).unwrap();
        }
        let n = cases.len();
        let toml = format!(
            r#"
            [candidate]
            command = '''{command}'''
            [paths]
            scratch_dir = "tmp"
            input_prefix = "../in/"
            expected_output_prefix = "ans/"
            [limits]
            time_ms = [{{ value = {time_ms}, repeat = {n} }}]
            memory_mb = [{{ value = 256, repeat = {n} }}]
            disk_mb = [{{ value = {disk_mb}, repeat = {n} }}]
            [plan]
            groups = {groups}
            "#
        );
        let filepath = root.join(TestPlan::FILENAME);
        fsutil::write(&filepath, toml).unwrap();
        TestPlan::from_toml_file(filepath).unwrap()
    }

    #[tokio::test]
    async fn should_pass_every_case_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = setup(
            tmp.path(),
            "cat",
            &[("42", "42"), ("a\nb\n", "a\nb\n\n"), ("x  \n", "x")],
            "[[1, 1], [2, 3]]",
            2000,
            16,
        );

        let mut rec = Recorder::default();
        let summary = run_plan(&plan, &plan.supervisor(), &mut rec).await.unwrap();

        assert!(summary.all_passed());
        assert_eq!(summary.num_passed(), 3);
        assert_eq!(rec.started, vec![1, 2, 3]);
        assert_eq!(rec.groups.len(), 2);
        assert!(rec.lines.iter().all(|l| l.contains("passed")));
        // matched outputs are removed from the scratch dir
        assert_eq!(fsutil::read_dir(plan.scratch_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn should_stop_whole_run_at_first_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = setup(
            tmp.path(),
            "cat",
            &[("1", "1"), ("2", "2"), ("3", "wrong"), ("4", "4"), ("5", "5")],
            "[[1, 2], [3, 4], [5, 5]]",
            2000,
            16,
        );

        let mut rec = Recorder::default();
        let summary = run_plan(&plan, &plan.supervisor(), &mut rec).await.unwrap();

        assert_eq!(rec.started, vec![1, 2, 3]);
        assert_eq!(rec.lines.len(), 3);
        assert!(rec.lines[..2].iter().all(|l| l.contains("passed")));
        assert!(rec.lines[2].starts_with("Test 3 in group (3, 4) failed: Output does not match"));
        assert_eq!(rec.groups.len(), 2);

        let failure = summary.failure().unwrap();
        assert_eq!(failure.outcome.judge(), JudgeCode::WA);
        assert_eq!(summary.num_passed(), 2);
        // unmatched output is kept for inspection
        assert!(plan.scratch_dir().join("3.out").exists());
    }

    #[tokio::test]
    async fn should_clear_scratch_dir_before_each_group_only() {
        let tmp = tempfile::tempdir().unwrap();
        // each case leaves a marker, and fails if a marker of the same group is missing
        let plan = setup(
            tmp.path(),
            "read n; touch mark$n; if [ $n -eq 2 ]; then test -e mark1 || exit 1; fi; if [ $n -eq 3 ]; then test -e mark2 && exit 1; fi; echo ok",
            &[("1", "ok"), ("2", "ok"), ("3", "ok")],
            "[[1, 2], [3, 3]]",
            2000,
            16,
        );
        let stale = plan.scratch_dir().join("stale.bin");
        fsutil::write_with_mkdir(&stale, "leftover").unwrap();

        let mut rec = Recorder::default();
        let summary = run_plan(&plan, &plan.supervisor(), &mut rec).await.unwrap();

        assert!(dbg!(&rec.lines).iter().all(|l| l.contains("passed")));
        assert!(summary.all_passed());
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn should_fail_on_disk_limit_even_if_answer_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = setup(
            tmp.path(),
            "head -c 3145728 /dev/zero > blob; cat",
            &[("42", "42")],
            "[[1, 1]]",
            5000,
            2,
        );

        let mut rec = Recorder::default();
        let summary = run_plan(&plan, &plan.supervisor(), &mut rec).await.unwrap();

        let failure = summary.failure().unwrap();
        assert_eq!(
            failure.outcome.failure,
            Some(Failure::DiskLimitExceeded {
                used_bytes: 3 * 1024 * 1024,
                limit_mb: 2,
            })
        );
        assert_eq!(failure.outcome.disk_usage_bytes, None);
    }

    #[tokio::test]
    async fn disk_usage_should_exclude_deleted_output() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = setup(
            tmp.path(),
            "printf 'abc' > keep; cat",
            &[("0123456789", "0123456789")],
            "[[1, 1]]",
            2000,
            1,
        );

        let summary = run_plan(&plan, &plan.supervisor(), &mut Recorder::default())
            .await
            .unwrap();

        assert!(summary.all_passed());
        assert_eq!(summary.results[0].outcome.disk_usage_bytes, Some(3));
    }

    #[tokio::test]
    async fn raising_time_limit_should_turn_tle_into_pass() {
        // spins for 2s of wall time unless the CPU rlimit kills the spinner first
        let busy = "timeout 2 sh -c 'while :; do :; done'; s=$?; [ $s -eq 124 ] || exit $s; cat";
        let run = |time_ms| async move {
            let tmp = tempfile::tempdir().unwrap();
            let plan = setup(tmp.path(), busy, &[("1", "1")], "[[1, 1]]", time_ms, 16);
            let summary = run_plan(&plan, &plan.supervisor(), &mut Recorder::default())
                .await
                .unwrap();
            summary.results[0].outcome.judge()
        };

        assert_eq!(run(1000).await, JudgeCode::TLE);
        assert_eq!(run(10000).await, JudgeCode::AC);
    }

    #[tokio::test]
    async fn missing_expected_output_is_an_error_not_a_verdict() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = setup(tmp.path(), "cat", &[("1", "1")], "[[1, 1]]", 2000, 16);
        fsutil::remove_file(tmp.path().join("ans/1.out")).unwrap();

        let res = run_plan(&plan, &plan.supervisor(), &mut Recorder::default()).await;
        assert!(res.is_err());
    }

    #[test]
    fn summary_without_results_counts_as_passed() {
        let s = RunSummary {
            started_at: Local::now(),
            results: Vec::new(),
        };
        assert!(s.all_passed());
        assert_eq!(s.num_passed(), 0);
    }
}
