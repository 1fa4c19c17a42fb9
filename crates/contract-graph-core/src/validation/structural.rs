//! Structural validation of a single record
//!
//! Works on the untyped intermediate form and reports every shape violation
//! with a dot/index path (`dependencies.0.parts.1.type`). Nothing here looks
//! at other records.

use serde_json::{Map, Value};

use super::ValidationIssue;

const MODULE_FIELDS: [&str; 4] = ["id", "type", "category", "description"];

/// Validate one record's shape; an empty result means the record is well formed
pub fn validate_record(value: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(map) = value.as_object() else {
        issues.push(ValidationIssue::new("", "Contract must be an object"));
        return issues;
    };

    for field in MODULE_FIELDS {
        check_required_string(map, field, "", &mut issues);
    }

    if let Some(parts) = optional_array(map, "parts", "", &mut issues) {
        for (index, part) in parts.iter().enumerate() {
            let prefix = join("parts", &index.to_string());
            check_object(part, &prefix, &mut issues, |obj, prefix, issues| {
                check_required_string(obj, "id", prefix, issues);
                check_required_string(obj, "type", prefix, issues);
            });
        }
    }

    if let Some(dependencies) = optional_array(map, "dependencies", "", &mut issues) {
        for (index, dependency) in dependencies.iter().enumerate() {
            let prefix = join("dependencies", &index.to_string());
            check_object(dependency, &prefix, &mut issues, check_dependency);
        }
    }

    issues
}

fn check_dependency(obj: &Map<String, Value>, prefix: &str, issues: &mut Vec<ValidationIssue>) {
    check_required_string(obj, "module_id", prefix, issues);

    let parts_path = join(prefix, "parts");
    match obj.get("parts") {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::new(parts_path, "is required"));
        }
        Some(Value::Array(parts)) if parts.is_empty() => {
            issues.push(ValidationIssue::new(parts_path, "must contain at least one part"));
        }
        Some(Value::Array(parts)) => {
            for (index, part) in parts.iter().enumerate() {
                let part_prefix = join(&parts_path, &index.to_string());
                check_object(part, &part_prefix, issues, |obj, prefix, issues| {
                    check_required_string(obj, "part_id", prefix, issues);
                    check_required_string(obj, "type", prefix, issues);
                });
            }
        }
        Some(_) => {
            issues.push(ValidationIssue::new(parts_path, "must be an array"));
        }
    }
}

fn check_object<F>(value: &Value, prefix: &str, issues: &mut Vec<ValidationIssue>, check: F)
where
    F: FnOnce(&Map<String, Value>, &str, &mut Vec<ValidationIssue>),
{
    match value.as_object() {
        Some(obj) => check(obj, prefix, issues),
        None => issues.push(ValidationIssue::new(prefix, "must be an object")),
    }
}

fn check_required_string(
    map: &Map<String, Value>,
    key: &str,
    prefix: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let path = join(prefix, key);
    match map.get(key) {
        None | Some(Value::Null) => issues.push(ValidationIssue::new(path, "is required")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            issues.push(ValidationIssue::new(path, "must not be empty"))
        }
        Some(Value::String(_)) => {}
        Some(_) => issues.push(ValidationIssue::new(path, "must be a string")),
    }
}

/// Returns the array under `key` when present; `null` reads as absent
fn optional_array<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    prefix: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a Vec<Value>> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            issues.push(ValidationIssue::new(join(prefix, key), "must be an array"));
            None
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
