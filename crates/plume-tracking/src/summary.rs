//! Run summaries.
//!
//! Renders [`RunRecord`]s for people (ASCII tables, Markdown) and for tools
//! (JSON, CSV).

use crate::error::{Result, TrackingError};
use crate::record::RunRecord;
use plume_model::format_metric;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Output format of a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Plain-text table
    #[default]
    Text,
    /// Markdown table
    Markdown,
    /// Pretty-printed JSON
    Json,
    /// Comma-separated values, one run per line
    Csv,
}

impl ReportFormat {
    /// Name accepted by [`FromStr`].
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(TrackingError::config(
                "format",
                format!("unknown format '{other}', expected text, markdown, json or csv"),
            )),
        }
    }
}

/// One line of a run listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct RunLine {
    run_id: String,
    finished_at: String,
    cutoff_year: i32,
    n_lags: usize,
    target: String,
    rmse: String,
    mae: String,
    r2: String,
}

impl RunLine {
    const HEADERS: [&'static str; 8] = [
        "run_id",
        "finished_at",
        "cutoff_year",
        "n_lags",
        "target",
        "rmse",
        "mae",
        "r2",
    ];

    fn from_record(record: &RunRecord) -> Self {
        let metrics = record.metrics();
        Self {
            run_id: record.run_id.to_string(),
            finished_at: record.finished_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            cutoff_year: record.cutoff_year,
            n_lags: record.n_lags,
            target: record.target.clone(),
            rmse: format_metric(metrics.rmse),
            mae: format_metric(metrics.mae),
            r2: format_metric(metrics.r2),
        }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.run_id.clone(),
            self.finished_at.clone(),
            self.cutoff_year.to_string(),
            self.n_lags.to_string(),
            self.target.clone(),
            self.rmse.clone(),
            self.mae.clone(),
            self.r2.clone(),
        ]
    }
}

/// Render one run in full.
pub fn render_run(record: &RunRecord, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(ascii_table(&["field", "value"], &detail_rows(record))),
        ReportFormat::Markdown => Ok(format!(
            "### Run `{}`\n\n{}",
            record.run_id,
            markdown_table(&["field", "value"], &detail_rows(record))
        )),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        ReportFormat::Csv => render_runs(std::slice::from_ref(record), format),
    }
}

/// Render a listing of runs, one line each.
pub fn render_runs(records: &[RunRecord], format: ReportFormat) -> Result<String> {
    let lines: Vec<RunLine> = records.iter().map(RunLine::from_record).collect();
    match format {
        ReportFormat::Text => {
            let rows: Vec<Vec<String>> = lines.iter().map(RunLine::cells).collect();
            Ok(ascii_table(&RunLine::HEADERS, &rows))
        }
        ReportFormat::Markdown => {
            let rows: Vec<Vec<String>> = lines.iter().map(RunLine::cells).collect();
            Ok(markdown_table(&RunLine::HEADERS, &rows))
        }
        ReportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        ReportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            if lines.is_empty() {
                writer.write_record(RunLine::HEADERS)?;
            }
            for line in &lines {
                writer.serialize(line)?;
            }
            let bytes = writer.into_inner().map_err(|e| TrackingError::Io(e.into_error()))?;
            String::from_utf8(bytes)
                .map_err(|e| TrackingError::config("format", format!("CSV output is not UTF-8: {e}")))
        }
    }
}

fn detail_rows(record: &RunRecord) -> Vec<Vec<String>> {
    let metrics = record.metrics();
    let mut rows = vec![
        vec!["run_id".to_string(), record.run_id.to_string()],
        vec!["started_at".to_string(), record.started_at.to_rfc3339()],
        vec!["finished_at".to_string(), record.finished_at.to_rfc3339()],
        vec!["cutoff_year".to_string(), record.cutoff_year.to_string()],
        vec!["n_lags".to_string(), record.n_lags.to_string()],
        vec!["target".to_string(), record.target.clone()],
        vec!["rmse".to_string(), format_metric(metrics.rmse)],
        vec!["mae".to_string(), format_metric(metrics.mae)],
        vec!["r2".to_string(), format_metric(metrics.r2)],
        vec!["test rows".to_string(), metrics.n_samples.to_string()],
    ];
    rows.extend(
        record
            .params
            .iter()
            .map(|(key, value)| vec![format!("param.{key}"), value.clone()]),
    );
    if let Some(artifact) = &record.artifact {
        rows.push(vec!["artifact".to_string(), artifact.path.display().to_string()]);
        rows.push(vec!["sha256".to_string(), artifact.sha256.clone()]);
        rows.push(vec!["features".to_string(), artifact.signature.len().to_string()]);
    }
    rows
}

fn ascii_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let rule = format!("+{rule}+\n");
    let line = |cells: Vec<&str>| {
        let body = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!(" {cell:<width$} "))
            .collect::<Vec<_>>()
            .join("|");
        format!("|{body}|\n")
    };

    let mut out = rule.clone();
    out.push_str(&line(headers.to_vec()));
    out.push_str(&rule);
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out.push_str(&rule);
    out
}

fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let escape = |cell: &str| cell.replace('|', "\\|");
    let mut out = format!("| {} |\n", headers.join(" | "));
    out.push_str(&format!("|{}\n", " --- |".repeat(headers.len())));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}
