// ========================================================================================
//                         Input Loading and Validation
// ========================================================================================

// Every input is a delimited text file with a header row. Files ending in
// `.tsv` are tab separated; anything else is read as comma separated.

use crate::bayes::types::{Attribute, BuildError, Outcome};
use ndarray::Array1;
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed delimited input: {0}")]
    Csv(#[from] csv::Error),

    #[error("Record on line {line} is invalid: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: BuildError,
    },

    #[error("Row on line {line} has {found} columns, but the first row had {expected}.")]
    RaggedRow {
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("Row on line {line} needs a target and at least one feature, but has {found} columns.")]
    TooFewColumns { line: usize, found: usize },

    #[error(
        "Column {column} on line {line} holds '{text}', which is not a finite number. This tool requires all regression data to be finite."
    )]
    NonNumeric {
        line: usize,
        column: usize,
        text: String,
    },
}

/// Timestamped attribute records: `timestamp,namespace,value,qualifier`.
pub fn load_attributes(path: &Path) -> Result<Vec<(i64, Attribute)>, DataError> {
    let records = read_attributes(File::open(path)?, internal::delimiter_for(path))?;
    log::info!("Loaded {} attribute records from {}", records.len(), path.display());
    Ok(records)
}

/// Timestamped outcome records: `timestamp,namespace,value,qualifier`. The
/// namespace may be empty.
pub fn load_outcomes(path: &Path) -> Result<Vec<(i64, Outcome)>, DataError> {
    let records = read_outcomes(File::open(path)?, internal::delimiter_for(path))?;
    log::info!("Loaded {} outcome records from {}", records.len(), path.display());
    Ok(records)
}

/// Observed attributes to score: `namespace,value,qualifier`.
pub fn load_observed(path: &Path) -> Result<Vec<Attribute>, DataError> {
    read_observed(File::open(path)?, internal::delimiter_for(path))
}

/// Regression rows. The header is skipped; column 0 is the target and the
/// remaining columns are features.
pub fn load_rows(path: &Path) -> Result<Vec<Array1<f64>>, DataError> {
    let rows = read_rows(File::open(path)?, internal::delimiter_for(path))?;
    log::info!("Loaded {} regression rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn read_attributes<R: io::Read>(
    reader: R,
    delimiter: u8,
) -> Result<Vec<(i64, Attribute)>, DataError> {
    internal::read_keyed(reader, delimiter, |record| {
        let mut builder = Attribute::builder().value(record.value);
        if let Some(namespace) = record.namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(qualifier) = record.qualifier {
            builder = builder.qualifier(qualifier);
        }
        builder.build()
    })
}

pub fn read_outcomes<R: io::Read>(
    reader: R,
    delimiter: u8,
) -> Result<Vec<(i64, Outcome)>, DataError> {
    internal::read_keyed(reader, delimiter, |record| {
        let mut builder = Outcome::builder().value(record.value);
        if let Some(namespace) = record.namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(qualifier) = record.qualifier {
            builder = builder.qualifier(qualifier);
        }
        builder.build()
    })
}

pub fn read_observed<R: io::Read>(reader: R, delimiter: u8) -> Result<Vec<Attribute>, DataError> {
    let mut csv_reader = internal::reader(reader, delimiter);
    let mut observed = Vec::new();
    for (index, result) in csv_reader.deserialize::<internal::ObservedRecord>().enumerate() {
        let record = result?;
        let mut builder = Attribute::builder()
            .namespace(record.namespace.unwrap_or_default())
            .value(record.value);
        if let Some(qualifier) = record.qualifier {
            builder = builder.qualifier(qualifier);
        }
        let attribute = builder.build().map_err(|source| DataError::InvalidRecord {
            line: internal::line_of(index),
            source,
        })?;
        observed.push(attribute);
    }
    Ok(observed)
}

pub fn read_rows<R: io::Read>(reader: R, delimiter: u8) -> Result<Vec<Array1<f64>>, DataError> {
    let mut csv_reader = internal::reader(reader, delimiter);
    let mut rows: Vec<Array1<f64>> = Vec::new();
    for (index, result) in csv_reader.records().enumerate() {
        let record = result?;
        let line = internal::line_of(index);
        if record.len() < 2 {
            return Err(DataError::TooFewColumns {
                line,
                found: record.len(),
            });
        }
        if let Some(first) = rows.first() {
            if first.len() != record.len() {
                return Err(DataError::RaggedRow {
                    line,
                    found: record.len(),
                    expected: first.len(),
                });
            }
        }
        let values = record
            .iter()
            .enumerate()
            .map(|(column, text)| internal::parse_finite(text, line, column))
            .collect::<Result<Vec<f64>, DataError>>()?;
        rows.push(Array1::from(values));
    }
    Ok(rows)
}

mod internal {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub(super) struct KeyedRecord {
        pub(super) timestamp: i64,
        pub(super) namespace: Option<String>,
        pub(super) value: String,
        #[serde(default)]
        pub(super) qualifier: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ObservedRecord {
        pub(super) namespace: Option<String>,
        pub(super) value: String,
        #[serde(default)]
        pub(super) qualifier: Option<String>,
    }

    pub(super) fn delimiter_for(path: &Path) -> u8 {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        }
    }

    pub(super) fn reader<R: io::Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader)
    }

    /// One-based line number of the `index`-th data record, counting the header.
    pub(super) fn line_of(index: usize) -> usize {
        index + 2
    }

    pub(super) fn read_keyed<R, T, F>(
        reader: R,
        delimiter: u8,
        build: F,
    ) -> Result<Vec<(i64, T)>, DataError>
    where
        R: io::Read,
        F: Fn(KeyedRecord) -> Result<T, BuildError>,
    {
        let mut csv_reader = self::reader(reader, delimiter);
        let mut records = Vec::new();
        for (index, result) in csv_reader.deserialize::<KeyedRecord>().enumerate() {
            let record = result?;
            let timestamp = record.timestamp;
            let value = build(record).map_err(|source| DataError::InvalidRecord {
                line: line_of(index),
                source,
            })?;
            records.push((timestamp, value));
        }
        Ok(records)
    }

    pub(super) fn parse_finite(text: &str, line: usize, column: usize) -> Result<f64, DataError> {
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(DataError::NonNumeric {
                line,
                column,
                text: text.to_string(),
            }),
        }
    }
}
