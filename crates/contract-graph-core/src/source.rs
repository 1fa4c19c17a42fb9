//! Record sources
//!
//! A record source returns the full current batch of contract records. Each
//! record carries its raw text, its content hash and the result of the first
//! parsing stage (raw text to `serde_json::Value`). A parse failure stays
//! attached to its record so the validator can report it alongside the
//! others.
//!
//! Two failure modes are kept apart: no configured location at all
//! ([`SourceError::NotConfigured`]) and a location that does not exist
//! ([`SourceError::MissingDirectory`]). A location that exists but holds no
//! records yields an empty batch, which is valid.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use walkdir::WalkDir;

use crate::hashing::content_hash;

/// Errors raised while loading records
#[derive(Error, Debug)]
pub enum SourceError {
    /// No contracts location configured
    #[error("No contracts directory configured")]
    NotConfigured,

    /// Configured location does not exist
    #[error("Contracts directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    /// Reading a record failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// One record of the current batch
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// File name without directories
    pub filename: String,
    /// Full path (or logical path for in-memory sources)
    pub path: String,
    /// Literal source text
    pub raw_content: String,
    /// First-stage parse result; `Err` holds the parser message
    pub parsed: Result<serde_json::Value, String>,
    /// SHA-256 of `raw_content`
    pub content_hash: String,
}

impl SourceRecord {
    /// Build a record from raw text, parsing according to the file extension
    pub fn parse(
        filename: impl Into<String>,
        path: impl Into<String>,
        raw_content: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        let raw_content = raw_content.into();
        let parsed = parse_content(&filename, &raw_content);
        let content_hash = content_hash(&raw_content);

        Self {
            filename,
            path: path.into(),
            raw_content,
            parsed,
            content_hash,
        }
    }

    /// Module id declared by the record, if it parsed and carries a string id
    pub fn module_id(&self) -> Option<&str> {
        self.parsed
            .as_ref()
            .ok()
            .and_then(|value| value.get("id"))
            .and_then(serde_json::Value::as_str)
    }
}

/// Parse record text into the untyped intermediate form
fn parse_content(filename: &str, content: &str) -> Result<serde_json::Value, String> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => serde_json::from_str(content).map_err(|e| format!("Invalid JSON: {}", e)),
        "yaml" | "yml" => {
            serde_yaml::from_str(content).map_err(|e| format!("Invalid YAML: {}", e))
        }
        "toml" => {
            let value: toml::Value =
                toml::from_str(content).map_err(|e| format!("Invalid TOML: {}", e))?;
            serde_json::to_value(value).map_err(|e| format!("Conversion error: {}", e))
        }
        _ => Err(format!(
            "Unsupported file format: {}. Supported formats: json, yaml, yml, toml",
            extension
        )),
    }
}

/// Provider of the complete current record batch
pub trait RecordSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Load every record, in a stable order
    fn load(&self) -> SourceResult<Vec<SourceRecord>>;
}

/// Loads contract files from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryRecordSource {
    root: Option<PathBuf>,
    extensions: Vec<String>,
}

impl DirectoryRecordSource {
    /// Default file extensions picked up by the walk
    pub const DEFAULT_EXTENSIONS: [&'static str; 4] = ["json", "yaml", "yml", "toml"];

    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            extensions: Self::DEFAULT_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Restrict the walk to the given extensions (without the dot)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

impl RecordSource for DirectoryRecordSource {
    fn name(&self) -> &str {
        "directory"
    }

    fn load(&self) -> SourceResult<Vec<SourceRecord>> {
        let root = self.root.as_ref().ok_or(SourceError::NotConfigured)?;
        if !root.is_dir() {
            return Err(SourceError::MissingDirectory(root.clone()));
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| SourceError::Io(e.to_string()))?;
            if !entry.file_type().is_file() || !self.matches_extension(entry.path()) {
                continue;
            }

            let raw = std::fs::read_to_string(entry.path())?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path().display().to_string();

            let record = SourceRecord::parse(filename, path, raw);
            if let Err(err) = &record.parsed {
                tracing::warn!(path = %record.path, error = %err, "Unparseable contract file");
            }
            records.push(record);
        }

        tracing::debug!(root = %root.display(), records = records.len(), "Loaded contract files");
        Ok(records)
    }
}

/// In-process record source, mostly for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: RwLock<Vec<(String, String)>>,
}

impl MemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record (builder pattern)
    pub fn with_record(self, filename: impl Into<String>, raw: impl Into<String>) -> Self {
        self.set_record(filename, raw);
        self
    }

    /// Insert or replace the record stored under `filename`
    pub fn set_record(&self, filename: impl Into<String>, raw: impl Into<String>) {
        let filename = filename.into();
        let raw = raw.into();
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match records.iter_mut().find(|(name, _)| *name == filename) {
            Some(entry) => entry.1 = raw,
            None => records.push((filename, raw)),
        }
    }

    /// Remove the record stored under `filename`
    pub fn remove_record(&self, filename: &str) {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.retain(|(name, _)| name != filename);
    }
}

impl RecordSource for MemoryRecordSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> SourceResult<Vec<SourceRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| SourceError::Io("record store lock poisoned".to_string()))?;

        Ok(records
            .iter()
            .map(|(filename, raw)| SourceRecord::parse(filename.clone(), filename.clone(), raw.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_not_configured_is_distinct() {
        let source = DirectoryRecordSource::new(None);
        assert!(matches!(source.load(), Err(SourceError::NotConfigured)));
    }

    #[test]
    fn test_missing_directory() {
        let source = DirectoryRecordSource::new(Some(PathBuf::from("/definitely/not/here")));
        assert!(matches!(source.load(), Err(SourceError::MissingDirectory(_))));
    }

    #[test]
    fn test_empty_directory_is_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryRecordSource::new(Some(dir.path().to_path_buf()));
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_walks_nested_directories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"id": "b"}"#).unwrap();
        fs::write(dir.path().join("nested/a.yaml"), "id: a\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectoryRecordSource::new(Some(dir.path().to_path_buf()));
        let records = source.load().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filename, "b.json");
        assert_eq!(records[1].filename, "a.yaml");
        assert_eq!(records[1].module_id(), Some("a"));
    }

    #[test]
    fn test_parse_error_is_attached_to_record() {
        let record = SourceRecord::parse("broken.json", "broken.json", "{ not json");
        assert!(record.parsed.is_err());
        assert!(record.module_id().is_none());
        assert_eq!(record.content_hash.len(), 64);
    }

    #[test]
    fn test_toml_records_convert() {
        let record = SourceRecord::parse("m.toml", "m.toml", "id = \"m\"\ntype = \"library\"\n");
        assert_eq!(record.module_id(), Some("m"));
    }

    #[test]
    fn test_memory_source_replace_and_remove() {
        let source = MemoryRecordSource::new()
            .with_record("a.json", r#"{"id": "a"}"#)
            .with_record("b.json", r#"{"id": "b"}"#);

        source.set_record("a.json", r#"{"id": "a2"}"#);
        source.remove_record("b.json");

        let records = source.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module_id(), Some("a2"));
    }
}
