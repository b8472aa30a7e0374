use std::{path::Path, time::Duration};

use chrono::{DateTime, Local};
use colored::Colorize;
use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::judge::{CaseResult, RunSummary};
use crate::style;
use crate::testing::{ExecutionOutcome, Failure, JudgeCode, Limits, TestCase, TestGroup};

/// Receives progress of a run, in order.
pub trait Reporter {
    fn group_started(&mut self, _group: &TestGroup) {}

    fn case_started(&mut self, _testcase: &TestCase, _group: &TestGroup) {}

    fn case_finished(&mut self, testcase: &TestCase, group: &TestGroup, outcome: &ExecutionOutcome);
}

pub fn pass_line(testcase: &TestCase, group: &TestGroup, outcome: &ExecutionOutcome) -> String {
    let l = testcase.limits();
    format!(
        "Test {} in group {} passed: Time taken: {:.2}/{} ms, Memory usage: {:.2}/{} MB, Disk usage: {:.2}/{} MB",
        testcase.index(),
        group,
        outcome.execution_time_ms(),
        l.time_ms,
        outcome.peak_memory_mb(),
        l.memory_mb,
        outcome.disk_usage_mb().unwrap_or_default(),
        l.disk_mb,
    )
}

pub fn fail_line(testcase: &TestCase, group: &TestGroup, outcome: &ExecutionOutcome) -> String {
    format!(
        "Test {} in group {} failed: {}",
        testcase.index(),
        group,
        outcome.diagnostic()
    )
}

pub fn report_line(testcase: &TestCase, group: &TestGroup, outcome: &ExecutionOutcome) -> String {
    if outcome.is_passed() {
        pass_line(testcase, group, outcome)
    } else {
        fail_line(testcase, group, outcome)
    }
}

/// Human readable report on the terminal, with a spinner while a testcase runs.
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_failure_detail(testcase: &TestCase, outcome: &ExecutionOutcome) {
        let Some(failure) = &outcome.failure else {
            return
        };
        let (cols, _) = terminal::size().unwrap_or((40, 40));
        let thin_bar = "─".repeat(cols as usize).bright_black();

        println!(
            "  {} {:.2} ms, {} {:.2}/{} MB",
            "elapsed:".dimmed(),
            outcome.execution_time_ms(),
            "peak memory:".dimmed(),
            outcome.peak_memory_mb(),
            testcase.limits().memory_mb,
        );
        if let Some(stderr) = failure.stderr().filter(|s| s.contains('\n')) {
            println!("{}\n{}{}", "[stderr]".cyan().bold(), stderr, thin_bar);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn group_started(&mut self, group: &TestGroup) {
        log::info!("Starting group {}", group);
    }

    fn case_started(&mut self, testcase: &TestCase, group: &TestGroup) {
        let style = ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap();
        let bar = ProgressBar::new_spinner()
            .with_style(style)
            .with_message(format!("Test {} in group {} ...", testcase.index(), group));
        bar.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(bar);
    }

    fn case_finished(&mut self, testcase: &TestCase, group: &TestGroup, outcome: &ExecutionOutcome) {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
        let line = report_line(testcase, group, outcome);
        let judge = style::judge_icon(outcome.judge());
        if outcome.is_passed() {
            println!("{} {}", judge, line);
        } else {
            println!("{} {}", judge, line.bright_red());
            Self::print_failure_detail(testcase, outcome);
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    let bar = "-".repeat(5);
    print!("{} ", bar);

    let num_passed = summary.num_passed();
    match summary.failure() {
        None => {
            let msg = format!("All {} tests passed ✨", num_passed);
            print!("{}", msg.green());
        }
        Some(r) => {
            let msg = format!(
                "Stopped at test {} after {} passed 💣",
                r.testcase.index(),
                num_passed
            );
            print!("{} ({})", msg.bright_red(), style::judge_icon(r.outcome.judge()));
        }
    }
    println!(" {}", bar);
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseRecord<'a> {
    pub index: usize,
    pub group: TestGroup,
    pub judge: JudgeCode,
    pub limits: &'a Limits,
    pub execution_time_ms: f64,
    pub peak_memory_mb: f64,
    pub disk_usage_mb: Option<f64>,
    pub failure: Option<&'a Failure>,
    pub message: String,
}

impl<'a> From<&'a CaseResult> for CaseRecord<'a> {
    fn from(r: &'a CaseResult) -> Self {
        Self {
            index: r.testcase.index(),
            group: r.group,
            judge: r.outcome.judge(),
            limits: r.testcase.limits(),
            execution_time_ms: r.outcome.execution_time_ms(),
            peak_memory_mb: r.outcome.peak_memory_mb(),
            disk_usage_mb: r.outcome.disk_usage_mb(),
            failure: r.outcome.failure.as_ref(),
            message: report_line(&r.testcase, &r.group, &r.outcome),
        }
    }
}

/// Machine readable form of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    pub started_at: DateTime<Local>,
    pub command: &'a str,
    pub passed: bool,
    pub cases: Vec<CaseRecord<'a>>,
}

impl<'a> JsonReport<'a> {
    pub fn new(command: &'a str, summary: &'a RunSummary) -> Self {
        Self {
            started_at: summary.started_at,
            command,
            passed: summary.all_passed(),
            cases: summary.results.iter().map(CaseRecord::from).collect(),
        }
    }

    pub fn save(&self, filepath: impl AsRef<Path>) -> fsutil::Result<()> {
        fsutil::write_json_with_mkdir(filepath, self)
    }
}
