use std::fmt::Write as _;
use std::fs;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unsupported report generator type '{0}'")]
    UnsupportedGenerator(String),
    #[error("failed to write report file '{path}': {source}")]
    WriteFailed { path: String, source: std::io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    Warnings,
    Failure,
    SimulatedComplete,
    Skipped,
    ConfirmationDeclined,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReportEntry {
    pub label: String,
    pub detail: String,
}

/// Accumulates everything worth reporting about a single job run, built
/// up incrementally as the engine progresses through pre-processing,
/// archiving, testing, transfer, and post-run actions.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_name: String,
    pub status: JobStatus,
    pub archive_path: Option<String>,
    pub archive_size_bytes: Option<u64>,
    pub checksum: Option<String>,
    pub exit_code: i32,
    pub elapsed_seconds: f64,
    pub attempts_made: u32,
    pub entries: Vec<JobReportEntry>,
}

impl JobReport {
    pub fn new(job_name: impl Into<String>) -> Self {
        JobReport {
            job_name: job_name.into(),
            status: JobStatus::Failure,
            archive_path: None,
            archive_size_bytes: None,
            checksum: None,
            exit_code: -1,
            elapsed_seconds: 0.0,
            attempts_made: 0,
            entries: Vec::new(),
        }
    }

    pub fn note(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.entries.push(JobReportEntry { label: label.into(), detail: detail.into() });
    }
}

/// Renders reports in the requested formats. This is deliberately a
/// fixed, minimal set (plain text, JSON, a bare-bones HTML table)
/// rather than a templating engine, since only these three formats are
/// within scope.
pub struct ReportRenderer;

impl ReportRenderer {
    pub fn render(report: &JobReport, generator_type: &str) -> Result<String, ReportError> {
        match generator_type.to_ascii_uppercase().as_str() {
            "TEXT" | "PLAINTEXT" => Ok(Self::render_text(report)),
            "JSON" => serde_json::to_string_pretty(report)
                .map_err(|e| ReportError::WriteFailed { path: "<memory>".to_string(), source: std::io::Error::new(std::io::ErrorKind::Other, e) }),
            "HTML" => Ok(Self::render_html(report)),
            other => Err(ReportError::UnsupportedGenerator(other.to_string())),
        }
    }

    fn render_text(report: &JobReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Job: {}", report.job_name);
        let _ = writeln!(out, "Status: {:?}", report.status);
        let _ = writeln!(out, "Exit code: {}", report.exit_code);
        let _ = writeln!(out, "Elapsed: {:.1}s ({} attempt(s))", report.elapsed_seconds, report.attempts_made);
        if let Some(path) = &report.archive_path {
            let _ = writeln!(out, "Archive: {path}");
        }
        if let Some(checksum) = &report.checksum {
            let _ = writeln!(out, "Checksum: {checksum}");
        }
        for entry in &report.entries {
            let _ = writeln!(out, "  - {}: {}", entry.label, entry.detail);
        }
        out
    }

    fn render_html(report: &JobReport) -> String {
        let mut out = String::new();
        out.push_str("<table>\n");
        let _ = writeln!(out, "<tr><td>Job</td><td>{}</td></tr>", report.job_name);
        let _ = writeln!(out, "<tr><td>Status</td><td>{:?}</td></tr>", report.status);
        let _ = writeln!(out, "<tr><td>Exit code</td><td>{}</td></tr>", report.exit_code);
        if let Some(path) = &report.archive_path {
            let _ = writeln!(out, "<tr><td>Archive</td><td>{path}</td></tr>");
        }
        out.push_str("</table>\n");
        out
    }

    pub fn write_to_dir(report: &JobReport, report_dir: &str, generator_type: &str) -> Result<String, ReportError> {
        let body = Self::render(report, generator_type)?;
        let extension = match generator_type.to_ascii_uppercase().as_str() {
            "JSON" => "json",
            "HTML" => "html",
            _ => "txt",
        };
        let path = format!("{}/{}-report.{}", report_dir.trim_end_matches('/'), report.job_name, extension);
        fs::write(&path, body).map_err(|source| ReportError::WriteFailed { path: path.clone(), source })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_render_includes_job_name_and_status() {
        let mut report = JobReport::new("Docs");
        report.status = JobStatus::Success;
        report.note("target", "transferred to Nas");
        let text = ReportRenderer::render(&report, "text").unwrap();
        assert!(text.contains("Job: Docs"));
        assert!(text.contains("Success"));
        assert!(text.contains("transferred to Nas"));
    }

    #[test]
    fn unsupported_generator_is_an_error() {
        let report = JobReport::new("Docs");
        let err = ReportRenderer::render(&report, "XML").unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedGenerator(_)));
    }

    #[test]
    fn json_render_round_trips_job_name() {
        let report = JobReport::new("Docs");
        let json = ReportRenderer::render(&report, "json").unwrap();
        assert!(json.contains("\"job_name\": \"Docs\""));
    }
}
