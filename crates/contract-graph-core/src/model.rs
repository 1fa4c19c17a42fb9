//! Record model for module contracts
//!
//! A contract describes one module: its identity, the parts it exports and
//! the parts it uses from other modules. These types are only produced after
//! a raw record has passed structural validation (see
//! [`crate::validation::structural`]); before that a record is an untyped
//! `serde_json::Value`.
//!
//! The graph projection types (`ModuleNode`, `PartNode`, `DependencyEdge`)
//! are what the synchronizer writes into a [`crate::store::GraphStore`].

use serde::{Deserialize, Serialize};

/// An exportable unit of a module (function, class, interface, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part identifier, unique within the owning module
    pub id: String,
    /// Declared kind of the part
    #[serde(rename = "type")]
    pub part_type: String,
}

impl Part {
    pub fn new(id: impl Into<String>, part_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            part_type: part_type.into(),
        }
    }
}

/// Reference to a part of another module, asserting identity and type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPart {
    pub part_id: String,
    #[serde(rename = "type")]
    pub part_type: String,
}

impl DependencyPart {
    pub fn new(part_id: impl Into<String>, part_type: impl Into<String>) -> Self {
        Self {
            part_id: part_id.into(),
            part_type: part_type.into(),
        }
    }
}

/// A declared use of specific parts from another module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Referenced module id
    pub module_id: String,
    /// Parts used from the referenced module, in declaration order
    pub parts: Vec<DependencyPart>,
}

impl Dependency {
    pub fn new(module_id: impl Into<String>, parts: Vec<DependencyPart>) -> Self {
        Self {
            module_id: module_id.into(),
            parts,
        }
    }
}

/// A module contract: the root record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Module id, unique across a record batch
    pub id: String,
    /// Module kind (service, library, ...)
    #[serde(rename = "type")]
    pub module_type: String,
    /// Free-form grouping (backend, frontend, ...)
    pub category: String,
    /// Human description, used as the embedding text
    pub description: String,
    /// Exported parts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
    /// Declared dependencies on other modules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl Contract {
    /// Convert a structurally valid record into a typed contract
    ///
    /// `null` for `parts`/`dependencies` is accepted and read as absent.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut value = value.clone();
        if let Some(map) = value.as_object_mut() {
            for key in ["parts", "dependencies"] {
                if map.get(key).map_or(false, serde_json::Value::is_null) {
                    map.remove(key);
                }
            }
        }
        serde_json::from_value(value)
    }

    /// Number of parts declared by this module
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}

/// Module node as stored in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub module_id: String,
    pub module_type: String,
    pub category: String,
    pub description: String,
    /// Content hash of the record this node was built from
    pub contract_file_hash: String,
    /// Normalised description embedding, if one could be generated
    pub embedding: Option<Vec<f32>>,
}

impl ModuleNode {
    pub fn from_contract(contract: &Contract, hash: impl Into<String>) -> Self {
        Self {
            module_id: contract.id.clone(),
            module_type: contract.module_type.clone(),
            category: contract.category.clone(),
            description: contract.description.clone(),
            contract_file_hash: hash.into(),
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// Part node, keyed by `(part_id, module_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartNode {
    pub part_id: String,
    pub module_id: String,
    pub part_type: String,
}

/// Directed dependency edge between two module nodes
///
/// The used parts travel as an opaque JSON blob; they describe the edge and
/// are not queried on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from_module: String,
    pub to_module: String,
    pub parts_blob: String,
}

impl DependencyEdge {
    pub fn new(
        from_module: impl Into<String>,
        to_module: impl Into<String>,
        parts: &[DependencyPart],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            from_module: from_module.into(),
            to_module: to_module.into(),
            parts_blob: serde_json::to_string(parts)?,
        })
    }

    /// Decode the parts blob back into its ordered list
    pub fn parts(&self) -> Result<Vec<DependencyPart>, serde_json::Error> {
        serde_json::from_str(&self.parts_blob)
    }
}
