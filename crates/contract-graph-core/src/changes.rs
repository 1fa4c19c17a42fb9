//! Hash-based change detection
//!
//! Compares the content hashes of the current batch with the hashes stored on
//! module nodes by the last apply. Matching is by module id, so a module that
//! moved to another file is still recognised. Unchanged modules produce no
//! entry.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::source::SourceRecord;

/// Placeholder file name/path for modules that no longer have a record
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Classification of a changed module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeStatus::Added => write!(f, "added"),
            ChangeStatus::Modified => write!(f, "modified"),
            ChangeStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Hash of one module in the current batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentModuleHash {
    pub module_id: String,
    pub hash: String,
    pub file_name: String,
    pub file_path: String,
}

impl CurrentModuleHash {
    /// Collect hashes for every record that declares a string module id
    pub fn from_records(records: &[SourceRecord]) -> Vec<Self> {
        records
            .iter()
            .filter_map(|record| {
                record.module_id().map(|id| Self {
                    module_id: id.to_string(),
                    hash: record.content_hash.clone(),
                    file_name: record.filename.clone(),
                    file_path: record.path.clone(),
                })
            })
            .collect()
    }
}

/// One changed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleChange {
    pub module_id: String,
    pub file_name: String,
    pub file_path: String,
    /// Empty for removed modules
    pub current_hash: String,
    /// `None` for added modules
    pub stored_hash: Option<String>,
    pub status: ChangeStatus,
}

/// Aggregate change report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCheckResult {
    pub has_changes: bool,
    pub total_changes: usize,
    pub modified_count: usize,
    pub added_count: usize,
    pub removed_count: usize,
    pub changes: Vec<ModuleChange>,
}

impl ChangeCheckResult {
    pub fn from_changes(changes: Vec<ModuleChange>) -> Self {
        let count = |status: ChangeStatus| changes.iter().filter(|c| c.status == status).count();
        let modified_count = count(ChangeStatus::Modified);
        let added_count = count(ChangeStatus::Added);
        let removed_count = count(ChangeStatus::Removed);
        let total_changes = modified_count + added_count + removed_count;

        Self {
            has_changes: total_changes > 0,
            total_changes,
            modified_count,
            added_count,
            removed_count,
            changes,
        }
    }
}

/// Diff the current batch against the stored `module_id -> hash` map
///
/// Every stored entry is consumed at most once; whatever is left after the
/// pass over the current batch is reported as removed, ordered by module id.
pub fn detect_changes(
    current: &[CurrentModuleHash],
    stored: &HashMap<String, String>,
) -> ChangeCheckResult {
    let mut remaining: BTreeSet<&str> = stored.keys().map(String::as_str).collect();
    let mut changes = Vec::new();

    for module in current {
        let stored_hash = stored.get(&module.module_id);
        let consumed = remaining.remove(module.module_id.as_str());

        let status = match stored_hash {
            Some(hash) if consumed && *hash == module.hash => continue,
            Some(_) if consumed => ChangeStatus::Modified,
            _ => ChangeStatus::Added,
        };

        changes.push(ModuleChange {
            module_id: module.module_id.clone(),
            file_name: module.file_name.clone(),
            file_path: module.file_path.clone(),
            current_hash: module.hash.clone(),
            stored_hash: match status {
                ChangeStatus::Modified => stored_hash.cloned(),
                _ => None,
            },
            status,
        });
    }

    for module_id in remaining {
        changes.push(ModuleChange {
            module_id: module_id.to_string(),
            file_name: UNKNOWN_LOCATION.to_string(),
            file_path: UNKNOWN_LOCATION.to_string(),
            current_hash: String::new(),
            stored_hash: stored.get(module_id).cloned(),
            status: ChangeStatus::Removed,
        });
    }

    ChangeCheckResult::from_changes(changes)
}
