//! Output formatters for run results
//!
//! Provides table, JSON, CSV and one-line summary formats.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::io::IsTerminal;

use crate::models::{ExecutionResult, JobStatus};
use crate::results::RunReport;

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn status_label(&self, status: JobStatus) -> &'static str {
        if self.colorize {
            match status {
                JobStatus::Passed => "\x1b[32m✓ PASS\x1b[0m",
                JobStatus::Failed => "\x1b[31m✗ FAIL\x1b[0m",
                JobStatus::Skipped => "\x1b[33m○ SKIP\x1b[0m",
                JobStatus::Error => "\x1b[31m! ERROR\x1b[0m",
            }
        } else {
            match status {
                JobStatus::Passed => "✓ PASS",
                JobStatus::Failed => "✗ FAIL",
                JobStatus::Skipped => "○ SKIP",
                JobStatus::Error => "! ERROR",
            }
        }
    }

    fn format_result_table(&self, result: &ExecutionResult) -> String {
        let mut line = format!(
            "{:32} {} [{:>6}ms]",
            truncate(&result.display_name, 32),
            self.status_label(result.status),
            result.duration_ms
        );
        if result.retries() > 0 {
            let _ = write!(line, " (retries: {})", result.retries());
        }
        line
    }

    /// Format the final run report
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Csv => csv_rows(&report.results, true),
            OutputFormat::Summary => report.stats.to_string(),
        }
    }

    fn format_report_table(&self, report: &RunReport) -> String {
        let stats = &report.stats;
        let mut output = String::new();

        output.push_str("\n══════════════════════════════════════════════════════════════\n");
        output.push_str(" Test Results\n");
        output.push_str("══════════════════════════════════════════════════════════════\n");

        for result in &report.results {
            let _ = writeln!(output, " {}", self.format_result_table(result));
        }

        let failures: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.status.is_failure())
            .collect();
        if !failures.is_empty() {
            output.push_str("──────────────────────────────────────────────────────────────\n");
            output.push_str(" Failures:\n");
            for result in failures {
                let _ = writeln!(
                    output,
                    "   - {}: {}",
                    result.display_name,
                    result.error_detail.as_deref().unwrap_or("unknown error")
                );
            }
        }

        output.push_str("══════════════════════════════════════════════════════════════\n");

        let passed = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", stats.passed)
        } else {
            stats.passed.to_string()
        };
        let failed = if self.colorize && stats.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", stats.failed)
        } else {
            stats.failed.to_string()
        };

        let _ = writeln!(
            output,
            " Total: {} | Executed: {} | Pass: {} | Fail: {} | Skip: {}",
            stats.total, stats.executed, passed, failed, stats.skipped
        );
        let _ = writeln!(
            output,
            " Success Rate: {:.1}% | Duration: {}ms",
            stats.success_rate(),
            stats.duration_ms()
        );
        output.push_str("══════════════════════════════════════════════════════════════\n");

        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// ANSI colors only on a terminal, and never with `NO_COLOR` set
pub fn should_colorize() -> bool {
    color_enabled(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

fn color_enabled(is_terminal: bool, no_color: bool) -> bool {
    is_terminal && !no_color
}

fn csv_rows(results: &[ExecutionResult], header: bool) -> String {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if header {
        let _ = writer.write_record([
            "job_id", "name", "status", "duration_ms", "attempts", "failure", "detail",
        ]);
    }

    for result in results {
        let status = result.status.to_string();
        let duration = result.duration_ms.to_string();
        let attempts = result.attempts.to_string();
        let _ = writer.write_record([
            result.job_id.as_str(),
            result.display_name.as_str(),
            status.as_str(),
            duration.as_str(),
            attempts.as_str(),
            result.failure.map(|k| k.name()).unwrap_or(""),
            result.error_detail.as_deref().unwrap_or(""),
        ]);
    }

    writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
