//! Renders a posterior as comma-separated rows, best outcome first.

use super::predict::Posterior;
use std::io;
use thiserror::Error;

pub const REPORT_HEADER: [&str; 4] = [
    "OUTCOME_NAMESPACE",
    "OUTCOME",
    "OUTCOME_QUALIFIER",
    "PROBABILITY",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report row: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write report: {0}")]
    Io(#[from] io::Error),

    #[error("Report text was not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Writes one row per scored outcome. Absent namespaces and qualifiers are
/// written as empty fields.
pub fn write_report<W: io::Write>(
    posterior: &Posterior,
    writer: W,
    include_header: bool,
) -> Result<(), ReportError> {
    let mut rows = internal::row_writer(writer);
    if include_header {
        rows.write_record(REPORT_HEADER)?;
    }
    for (outcome, score) in posterior.scores() {
        let score = score.to_string();
        rows.write_record(internal::fields(outcome, &score))?;
    }
    rows.flush()?;
    Ok(())
}

/// The report as one string per row, without line terminators. A quoted field
/// may contain a newline, so a row is not necessarily a single text line.
pub fn render_report(
    posterior: &Posterior,
    include_header: bool,
) -> Result<Vec<String>, ReportError> {
    let mut rows = Vec::with_capacity(posterior.len() + usize::from(include_header));
    if include_header {
        rows.push(internal::render_row(REPORT_HEADER)?);
    }
    for (outcome, score) in posterior.scores() {
        let score = score.to_string();
        rows.push(internal::render_row(internal::fields(outcome, &score))?);
    }
    Ok(rows)
}

mod internal {
    use super::*;
    use crate::bayes::types::Outcome;

    pub(super) fn row_writer<W: io::Write>(writer: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer)
    }

    pub(super) fn fields<'a>(outcome: &'a Outcome, score: &'a str) -> [&'a str; 4] {
        [
            outcome.namespace().unwrap_or(""),
            outcome.value(),
            outcome.qualifier().unwrap_or(""),
            score,
        ]
    }

    /// Serializes a single record into its own buffer.
    pub(super) fn render_row(record: [&str; 4]) -> Result<String, ReportError> {
        let mut row = row_writer(Vec::new());
        row.write_record(record)?;
        let bytes = row.into_inner().map_err(|e| e.into_error())?;
        let mut text = String::from_utf8(bytes)?;
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }
}
