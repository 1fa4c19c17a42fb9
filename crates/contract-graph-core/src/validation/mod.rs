//! Contract validation
//!
//! Validation runs in stages over a complete record batch:
//!
//! 1. **Parse** (done by the record source): raw text to `serde_json::Value`.
//!    A parse failure becomes a single issue for that file.
//! 2. **Structural** ([`structural`]): each record's shape, in isolation.
//!    Only records without structural issues become typed [`Contract`]s.
//! 3. **Referential** ([`referential`]): the typed contracts checked against
//!    each other (duplicate ids, dependency targets, parts and types).
//!
//! Violations are data, never errors. A batch is valid only when every file
//! is valid, and only a valid batch can be turned into a [`ValidatedBatch`],
//! which is the sole input the graph synchronizer accepts.

pub mod referential;
pub mod structural;

use serde::{Deserialize, Serialize};

use crate::model::Contract;
use crate::source::SourceRecord;
use referential::ContractEntry;

/// A single violation, addressed by a dot/index path inside the record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Offending field, e.g. `dependencies.0.parts.1.type`; empty for the whole record
    pub path: String,
    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Validation status of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileValidation {
    pub file_path: String,
    pub file_name: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
}

/// Validation status of a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff every file is valid
    pub valid: bool,
    /// One entry per record, in source order
    pub files: Vec<FileValidation>,
}

impl ValidationResult {
    /// Number of files carrying at least one issue
    pub fn invalid_count(&self) -> usize {
        self.files.iter().filter(|f| !f.valid).count()
    }

    /// Total number of issues over all files
    pub fn issue_count(&self) -> usize {
        self.files.iter().map(|f| f.errors.len()).sum()
    }
}

/// A contract that passed structural validation, with its source metadata
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub contract: Contract,
    pub content_hash: String,
    pub file_name: String,
    pub file_path: String,
}

/// A batch whose validation produced zero issues
///
/// Can only be obtained from [`BatchValidation::into_validated`].
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    records: Vec<ValidatedRecord>,
}

impl ValidatedBatch {
    pub fn records(&self) -> &[ValidatedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of validating a batch: the report plus the typed contracts
#[derive(Debug, Clone)]
pub struct BatchValidation {
    pub result: ValidationResult,
    records: Vec<ValidatedRecord>,
}

impl BatchValidation {
    pub fn is_valid(&self) -> bool {
        self.result.valid
    }

    /// Unlock the batch for synchronization; an invalid batch hands back its report
    pub fn into_validated(self) -> Result<ValidatedBatch, ValidationResult> {
        if self.result.valid {
            Ok(ValidatedBatch {
                records: self.records,
            })
        } else {
            Err(self.result)
        }
    }
}

/// Validate a complete record batch
///
/// Pure: reads the records, never mutates anything.
pub fn validate_batch(records: &[SourceRecord]) -> BatchValidation {
    let mut issues: Vec<Vec<ValidationIssue>> = vec![Vec::new(); records.len()];
    let mut typed: Vec<Option<Contract>> = vec![None; records.len()];

    for (position, record) in records.iter().enumerate() {
        let value = match &record.parsed {
            Ok(value) => value,
            Err(err) => {
                issues[position].push(ValidationIssue::new(
                    "",
                    format!("Failed to parse {}: {}", record.filename, err),
                ));
                continue;
            }
        };

        let structural = structural::validate_record(value);
        if !structural.is_empty() {
            issues[position] = structural;
            continue;
        }

        match Contract::from_value(value) {
            Ok(contract) => typed[position] = Some(contract),
            Err(err) => issues[position].push(ValidationIssue::new(
                "",
                format!("Failed to read contract: {}", err),
            )),
        }
    }

    let positions: Vec<usize> = (0..records.len()).filter(|&p| typed[p].is_some()).collect();
    let entries: Vec<ContractEntry<'_>> = positions
        .iter()
        .filter_map(|&p| {
            typed[p].as_ref().map(|contract| ContractEntry {
                path: records[p].path.as_str(),
                contract,
            })
        })
        .collect();

    let referential = referential::validate_references(&entries);
    for (&position, found) in positions.iter().zip(referential) {
        issues[position].extend(found);
    }

    let files: Vec<FileValidation> = records
        .iter()
        .zip(issues)
        .map(|(record, errors)| {
            if !errors.is_empty() {
                tracing::debug!(file = %record.path, issues = errors.len(), "Contract has violations");
            }
            FileValidation {
                file_path: record.path.clone(),
                file_name: record.filename.clone(),
                valid: errors.is_empty(),
                errors,
            }
        })
        .collect();

    let valid = files.iter().all(|f| f.valid);
    let validated = records
        .iter()
        .zip(typed)
        .filter_map(|(record, contract)| {
            contract.map(|contract| ValidatedRecord {
                contract,
                content_hash: record.content_hash.clone(),
                file_name: record.filename.clone(),
                file_path: record.path.clone(),
            })
        })
        .collect();

    BatchValidation {
        result: ValidationResult { valid, files },
        records: validated,
    }
}
