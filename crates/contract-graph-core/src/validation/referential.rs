//! Referential validation across a record batch
//!
//! Runs in two phases. [`ContractIndex::build`] collects every declared
//! module id and part over the whole batch first, so a record may reference
//! a module that appears later in the batch. [`check_contract`] then checks
//! each record against that index. Record order inside the batch does not
//! change the outcome.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::ValidationIssue;
use crate::model::{Contract, Part};

/// A structurally valid record taking part in referential checks
#[derive(Debug, Clone, Copy)]
pub struct ContractEntry<'a> {
    /// Record path, used when naming the other side of a duplicate
    pub path: &'a str,
    pub contract: &'a Contract,
}

/// Batch-wide lookup tables built before any record is checked
#[derive(Debug, Default)]
pub struct ContractIndex<'a> {
    module_ids: HashSet<&'a str>,
    /// Parts per module id; a duplicated id contributes every declaration
    module_parts: HashMap<&'a str, Vec<&'a Part>>,
    /// Batch positions declaring each module id
    declarations: HashMap<&'a str, Vec<usize>>,
}

impl<'a> ContractIndex<'a> {
    pub fn build(entries: &[ContractEntry<'a>]) -> Self {
        let mut index = Self::default();
        for (position, entry) in entries.iter().enumerate() {
            let id = entry.contract.id.as_str();
            index.module_ids.insert(id);
            index
                .module_parts
                .entry(id)
                .or_default()
                .extend(entry.contract.parts.iter());
            index.declarations.entry(id).or_default().push(position);
        }
        index
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.module_ids.contains(module_id)
    }

    fn parts_named(&self, module_id: &str, part_id: &str) -> Vec<&'a Part> {
        self.module_parts
            .get(module_id)
            .map(|parts| parts.iter().copied().filter(|p| p.id == part_id).collect())
            .unwrap_or_default()
    }
}

/// Validate every entry; the result is index-aligned with `entries`
pub fn validate_references(entries: &[ContractEntry<'_>]) -> Vec<Vec<ValidationIssue>> {
    let index = ContractIndex::build(entries);
    (0..entries.len())
        .map(|position| check_contract(entries, position, &index))
        .collect()
}

/// Check the entry at `position` against the batch index
pub fn check_contract(
    entries: &[ContractEntry<'_>],
    position: usize,
    index: &ContractIndex<'_>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let contract = entries[position].contract;
    let own_id = contract.id.as_str();

    if let Some(positions) = index.declarations.get(own_id) {
        for &other in positions.iter().filter(|&&p| p != position) {
            issues.push(ValidationIssue::new(
                "id",
                format!(
                    "Duplicate module id \"{}\": also declared in \"{}\"",
                    own_id, entries[other].path
                ),
            ));
        }
    }

    let mut dependency_counts: HashMap<&str, usize> = HashMap::new();
    for dependency in &contract.dependencies {
        *dependency_counts.entry(dependency.module_id.as_str()).or_default() += 1;
    }

    for (dep_index, dependency) in contract.dependencies.iter().enumerate() {
        let target = dependency.module_id.as_str();
        let module_path = format!("dependencies.{}.module_id", dep_index);

        let self_reference = target == own_id;
        if self_reference {
            issues.push(ValidationIssue::new(
                module_path.clone(),
                format!("Module \"{}\" cannot depend on itself", own_id),
            ));
        }

        if dependency_counts.get(target).copied().unwrap_or(0) > 1 {
            issues.push(ValidationIssue::new(
                module_path.clone(),
                format!("Duplicate dependency on module \"{}\"", target),
            ));
        }

        if self_reference {
            continue;
        }

        let mut part_counts: HashMap<&str, usize> = HashMap::new();
        for part in &dependency.parts {
            *part_counts.entry(part.part_id.as_str()).or_default() += 1;
        }
        for (part_index, part) in dependency.parts.iter().enumerate() {
            if part_counts.get(part.part_id.as_str()).copied().unwrap_or(0) > 1 {
                issues.push(ValidationIssue::new(
                    format!("dependencies.{}.parts.{}.part_id", dep_index, part_index),
                    format!(
                        "Duplicate part \"{}\" in dependency on module \"{}\"",
                        part.part_id, target
                    ),
                ));
            }
        }

        if !index.contains(target) {
            issues.push(ValidationIssue::new(
                module_path,
                format!("Module \"{}\" does not exist", target),
            ));
            continue;
        }

        for (part_index, part) in dependency.parts.iter().enumerate() {
            let part_prefix = format!("dependencies.{}.parts.{}", dep_index, part_index);

            let declared = index.parts_named(target, &part.part_id);
            if declared.is_empty() {
                issues.push(ValidationIssue::new(
                    format!("{}.part_id", part_prefix),
                    format!("Part \"{}\" not found in module \"{}\"", part.part_id, target),
                ));
                continue;
            }

            if !declared.iter().any(|d| d.part_type == part.part_type) {
                let expected: BTreeSet<&str> =
                    declared.iter().map(|d| d.part_type.as_str()).collect();
                let expected = expected
                    .iter()
                    .map(|t| format!("\"{}\"", t))
                    .collect::<Vec<_>>()
                    .join(" or ");
                issues.push(ValidationIssue::new(
                    format!("{}.type", part_prefix),
                    format!(
                        "Type mismatch for part \"{}\" of module \"{}\": expected {}, got \"{}\"",
                        part.part_id, target, expected, part.part_type
                    ),
                ));
            }
        }
    }

    issues
}
