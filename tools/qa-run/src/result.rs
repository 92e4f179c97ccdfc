//! 运行结果.

use acr_berry::prelude::*;
use std::io::{self, Write};
use std::process::ExitCode;

fn value_to_display(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) if unit.is_empty() => format!("{v:.2}"),
        Some(v) => format!("{v:.2} {unit}"),
        None => "/".to_string(),
    }
}

/// 将 `report` 的概要写进 `w` 中.
fn describe_report<W: Write>(report: &Report, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(
        w,
        "Run {} ({} {})",
        report.run_id(),
        report.protocol().name,
        report.protocol().version
    )?;
    if let Some(state) = report.stopped_at() {
        writeln!(w, "{S4}Cancelled after {state}")?;
    }
    for r in report.results() {
        writeln!(
            w,
            "{S4}{:<28} {:>14}  {:<14} {:?}",
            r.metric.name(),
            value_to_display(r.value, &r.unit),
            r.tolerance.to_string(),
            r.verdict
        )?;
        for note in &r.notes {
            writeln!(w, "{S4}{S4}{note}")?;
        }
    }
    for f in report.failed_metrics() {
        writeln!(w, "{S4}{:<28} failed: {}", f.metric.name(), f.reason)?;
    }
    for s in report.skipped_files() {
        writeln!(w, "{S4}Skipped {}: {}", s.name, s.reason)?;
    }
    utils::sep_to(&mut *w)?;
    writeln!(w, "Overall: {:?}", report.overall())
}

/// 一次运行的结果: 报告或失败.
pub struct QaResult {
    outcome: Result<Report, RunFailure>,
}

impl QaResult {
    pub fn new(outcome: Result<Report, RunFailure>) -> Self {
        Self { outcome }
    }

    /// 报告或失败的 JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        match &self.outcome {
            Ok(report) => report.to_json_pretty(),
            Err(failure) => failure.to_json_pretty(),
        }
    }

    /// 将概要写进 `w` 中.
    pub fn describe_into<W: Write>(&self, mut w: W) -> io::Result<()> {
        utils::sep_to(&mut w)?;
        match &self.outcome {
            Ok(report) => describe_report(report, &mut w)?,
            Err(failure) => {
                writeln!(w, "Run {} failed", failure.run_id)?;
                writeln!(w, "    {}: {}", failure.stage, failure.reason)?;
                for s in &failure.skipped_files {
                    writeln!(w, "    Skipped {}: {}", s.name, s.reason)?;
                }
            }
        }
        utils::sep_to(&mut w)
    }

    /// 通过为 0, 不通过或运行失败为 1.
    pub fn exit_code(&self) -> ExitCode {
        match &self.outcome {
            Ok(report) if report.overall() == Verdict::Pass => ExitCode::SUCCESS,
            _ => ExitCode::from(1),
        }
    }
}
