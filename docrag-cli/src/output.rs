//! Human-readable rendering of command results.

use std::fmt::Write;

use docrag::{Answer, IndexReport, IndexStatus};

pub fn format_report(report: &IndexReport) -> String {
    let mut out = format!(
        "Indexed {} documents: {} new segments, {} already present",
        report.documents, report.indexed, report.skipped
    );
    if report.unsearchable > 0 {
        let _ = write!(out, ", {} without searchable text", report.unsearchable);
    }
    if !report.errors.is_empty() {
        let _ = write!(out, "\n{} documents skipped:", report.errors.len());
        for e in &report.errors {
            let _ = write!(out, "\n  {}: {}", e.source, e.reason);
        }
    }
    out
}

pub fn format_answer(answer: &Answer) -> String {
    let mut out = answer.text.clone();
    if !answer.sources.is_empty() {
        out.push_str("\n\nSources:");
        for source in &answer.sources {
            let _ = write!(out, "\n  - {} ({})", source.source, source.locator);
        }
    }
    out
}

pub fn format_status(status: &IndexStatus) -> String {
    let dimensions = status.dimensions.map_or_else(|| "-".to_string(), |d| d.to_string());
    format!(
        "records: {}\ndimensions: {}\nready: {}",
        status.records, dimensions, status.ready
    )
}
