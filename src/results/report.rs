//! Machine-readable run reports
//!
//! Writes the finalized report as JUnit XML or JSON for CI consumption.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{ExecutionResult, JobStatus};
use crate::results::RunReport;

/// Report file format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Junit,
    Json,
}

impl ReportFormat {
    /// File name used when no output path is given
    pub fn default_path(&self) -> PathBuf {
        match self {
            ReportFormat::Junit => PathBuf::from("svcprobe-report.xml"),
            ReportFormat::Json => PathBuf::from("svcprobe-report.json"),
        }
    }
}

pub struct ReportEmitter {
    suite: String,
}

impl ReportEmitter {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
        }
    }

    pub fn render(&self, report: &RunReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Junit => Ok(self.render_junit(report)),
            ReportFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize report")
            }
        }
    }

    /// Render and write to `path`, creating parent directories
    pub fn emit(&self, report: &RunReport, format: ReportFormat, path: &Path) -> Result<()> {
        let content = self.render(report, format)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        info!("Report written to {}", path.display());
        Ok(())
    }

    fn render_junit(&self, report: &RunReport) -> String {
        let mut out = String::new();
        let stats = &report.stats;
        let name = xml_escape(&self.suite);
        let time = seconds(stats.duration_ms());
        let failures = report.count(JobStatus::Failed);
        let errors = report.count(JobStatus::Error);

        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
        writeln!(
            out,
            r#"<testsuites name="{name}" tests="{}" failures="{failures}" errors="{errors}" skipped="{}" time="{time}">"#,
            stats.total, stats.skipped
        )
        .unwrap();
        writeln!(
            out,
            r#"  <testsuite name="{name}" tests="{}" failures="{failures}" errors="{errors}" skipped="{}" time="{time}" timestamp="{}">"#,
            stats.total,
            stats.skipped,
            stats.start_time.to_rfc3339()
        )
        .unwrap();

        for result in &report.results {
            write_testcase(&mut out, &name, result);
        }

        writeln!(out, "  </testsuite>").unwrap();
        writeln!(out, "</testsuites>").unwrap();
        out
    }
}

fn write_testcase(out: &mut String, suite: &str, result: &ExecutionResult) {
    let name = xml_escape(&result.display_name);
    let time = seconds(result.duration_ms);
    let detail = xml_escape(result.error_detail.as_deref().unwrap_or_default());
    let kind = result.failure.map(|k| k.name()).unwrap_or("WorkerFault");

    writeln!(
        out,
        r#"    <testcase name="{name}" classname="{suite}" file="{}" time="{time}">"#,
        xml_escape(&result.job_id)
    )
    .unwrap();

    match result.status {
        JobStatus::Passed => {}
        JobStatus::Failed => {
            writeln!(out, r#"      <failure type="{kind}" message="{detail}"/>"#).unwrap();
        }
        JobStatus::Error => {
            writeln!(out, r#"      <error type="{kind}" message="{detail}"/>"#).unwrap();
        }
        JobStatus::Skipped => {
            writeln!(out, r#"      <skipped message="{detail}"/>"#).unwrap();
        }
    }

    if result.attempts > 1 {
        writeln!(
            out,
            "      <system-out>attempts: {}, retries: {}</system-out>",
            result.attempts,
            result.retries()
        )
        .unwrap();
    }

    writeln!(out, "    </testcase>").unwrap();
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateStats, ExecutionError, TestJob};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_report() -> RunReport {
        let ok = TestJob::new("tests/ok.yaml", "tests/ok.yaml", "ok");
        let bad = TestJob::new("tests/bad.yaml", "tests/bad.yaml", "bad <user>");
        let slow = TestJob::new("tests/slow.yaml", "tests/slow.yaml", "slow");
        let skip = TestJob::new("tests/skip.yaml", "tests/skip.yaml", "skip");
        let now = Utc::now();

        let stats = AggregateStats {
            total: 4,
            executed: 3,
            passed: 1,
            failed: 2,
            skipped: 1,
            start_time: now,
            end_time: Some(now),
        };

        RunReport {
            stats,
            results: vec![
                ExecutionResult::passed(&ok, now, 1500, 1),
                ExecutionResult::failed(
                    &bad,
                    &ExecutionError::AssertionMismatch("expected status 200, got 404".into()),
                    now,
                    20,
                    1,
                ),
                ExecutionResult::failed(&slow, &ExecutionError::Timeout(30000), now, 90000, 3),
                ExecutionResult::skipped(&skip, "fail-fast"),
            ],
        }
    }

    #[test]
    fn test_junit_structure() {
        let xml = ReportEmitter::new("svcprobe")
            .render(&sample_report(), ReportFormat::Junit)
            .unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"tests="4" failures="1" errors="1" skipped="1""#));
        assert!(xml.contains(
            r#"<testcase name="ok" classname="svcprobe" file="tests/ok.yaml" time="1.500">"#
        ));
        assert!(xml.contains("bad &lt;user&gt;"));
        assert!(xml.contains(r#"<failure type="AssertionMismatch""#));
        assert!(xml.contains(r#"<error type="Timeout""#));
        assert!(xml.contains("attempts: 3, retries: 2"));
        assert!(xml.contains(r#"<skipped message="fail-fast"/>"#));
        assert!(xml.trim_end().ends_with("</testsuites>"));
    }

    #[test]
    fn test_json_report() {
        let json = ReportEmitter::new("svcprobe")
            .render(&sample_report(), ReportFormat::Json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stats"]["total"], 4);
        assert_eq!(value["results"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_emit_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/nested/run.xml");

        ReportEmitter::new("svcprobe")
            .emit(&sample_report(), ReportFormat::Junit, &path)
            .unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("<testsuites"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"a&b<c>"d'"#), "a&amp;b&lt;c&gt;&quot;d&apos;");
    }
}
