//! Schema Gatekeeper: classifies an uploaded table and screens its rows before
//! anything reaches the Bronze layer.

pub mod csv_table;
pub mod date_parser;

use crate::constants::{self, COL_DATE, COL_DISTRICT, COL_PINCODE, COL_STATE};
use crate::domain::{Rejection, RejectionReason, SchemaType};
use crate::error::{PulseError, Result};
use crate::idempotency;
use crate::metrics::GatekeeperMetrics;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

pub use csv_table::RawTable;

static PINCODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("static regex"));

/// A row that passed every check, still carrying its source strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow {
    pub source_row: u64,
    pub date: NaiveDate,
    /// Signature columns only, exactly as read
    pub fields: BTreeMap<String, String>,
}

/// Result of screening one uploaded file.
#[derive(Debug, Clone)]
pub struct ScreenedFile {
    pub schema_type: SchemaType,
    pub content_hash: String,
    pub total_rows: usize,
    pub valid: Vec<ValidRow>,
    pub rejections: Vec<Rejection>,
}

impl ScreenedFile {
    pub fn accepted_rows(&self) -> usize {
        self.valid.len()
    }

    pub fn rejected_rows(&self) -> usize {
        self.rejections.len()
    }
}

pub struct SchemaGatekeeper;

impl SchemaGatekeeper {
    /// Match a header against the static signature table.
    ///
    /// Matching is case-sensitive. Extra columns are ignored; a header that satisfies
    /// more than one signature is treated as unrecognized rather than picking one.
    pub fn classify<S: AsRef<str>>(header: &[S]) -> Option<SchemaType> {
        let present: HashSet<&str> = header.iter().map(|h| h.as_ref()).collect();
        let mut matches = SchemaType::ALL.iter().copied().filter(|schema| {
            constants::required_columns(*schema)
                .iter()
                .all(|col| present.contains(col))
        });

        match (matches.next(), matches.next()) {
            (Some(schema), None) => Some(schema),
            _ => None,
        }
    }

    /// Validate one row of an already-classified file.
    pub fn validate(
        source_row: u64,
        fields: &BTreeMap<String, String>,
        schema: SchemaType,
    ) -> std::result::Result<ValidRow, RejectionReason> {
        let date_raw = required_value(fields, COL_DATE)?;
        let date = date_parser::parse_date(date_raw)?;

        required_value(fields, COL_STATE)?;
        required_value(fields, COL_DISTRICT)?;
        parse_pincode(required_value(fields, COL_PINCODE)?)?;

        for column in constants::measure_columns(schema) {
            parse_count(column, required_value(fields, column)?)?;
        }

        Ok(ValidRow {
            source_row,
            date,
            fields: fields.clone(),
        })
    }

    /// Classify and validate a whole file. Row failures are collected, never fatal.
    pub fn screen(bytes: &[u8], source_name: &str) -> Result<ScreenedFile> {
        let table = RawTable::from_bytes(bytes)?;

        let schema_type = match Self::classify(&table.header) {
            Some(schema) => schema,
            None => {
                GatekeeperMetrics::record_schema_unrecognized();
                warn!(source = %source_name, header = ?table.header, "Rejecting file with unrecognized header");
                return Err(PulseError::SchemaUnrecognized {
                    header: table.header.clone(),
                });
            }
        };

        if table.rows.is_empty() {
            return Err(PulseError::EmptyFile);
        }

        let columns: Vec<(&'static str, Option<usize>)> = constants::required_columns(schema_type)
            .into_iter()
            .map(|col| (col, table.column_index(col)))
            .collect();

        let mut valid = Vec::with_capacity(table.rows.len());
        let mut rejections = Vec::new();

        for row in &table.rows {
            let cells = match &row.cells {
                Ok(cells) => cells,
                Err(detail) => {
                    rejections.push(Rejection {
                        row: row.line,
                        reason: RejectionReason::MalformedRow {
                            detail: detail.clone(),
                        },
                    });
                    continue;
                }
            };

            let fields: BTreeMap<String, String> = columns
                .iter()
                .filter_map(|(col, idx)| {
                    idx.and_then(|i| cells.get(i))
                        .map(|value| (col.to_string(), value.clone()))
                })
                .collect();

            match Self::validate(row.line, &fields, schema_type) {
                Ok(valid_row) => valid.push(valid_row),
                Err(reason) => {
                    debug!(row = row.line, code = reason.code(), "Row rejected: {}", reason);
                    GatekeeperMetrics::record_row_rejected(reason.code());
                    rejections.push(Rejection {
                        row: row.line,
                        reason,
                    });
                }
            }
        }

        GatekeeperMetrics::record_file_screened(schema_type.as_str(), valid.len(), rejections.len());
        info!(
            source = %source_name,
            schema = %schema_type,
            accepted = valid.len(),
            rejected = rejections.len(),
            "Screened file"
        );

        Ok(ScreenedFile {
            schema_type,
            content_hash: idempotency::content_hash(bytes),
            total_rows: table.rows.len(),
            valid,
            rejections,
        })
    }
}

fn required_value<'a>(
    fields: &'a BTreeMap<String, String>,
    column: &str,
) -> std::result::Result<&'a str, RejectionReason> {
    match fields.get(column).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RejectionReason::MissingField {
            column: column.to_string(),
        }),
    }
}

pub fn parse_pincode(value: &str) -> std::result::Result<&str, RejectionReason> {
    let trimmed = value.trim();
    if PINCODE_PATTERN.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(RejectionReason::InvalidPincode {
            value: value.to_string(),
        })
    }
}

pub fn parse_count(column: &str, value: &str) -> std::result::Result<u64, RejectionReason> {
    let trimmed = value.trim();
    if let Ok(count) = trimmed.parse::<u64>() {
        return Ok(count);
    }
    if trimmed.parse::<i64>().map(|n| n < 0).unwrap_or(false) {
        return Err(RejectionReason::NegativeCount {
            column: column.to_string(),
            value: value.to_string(),
        });
    }
    Err(RejectionReason::InvalidCount {
        column: column.to_string(),
        value: value.to_string(),
    })
}
