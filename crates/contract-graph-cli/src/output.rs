//! Output formatting for the contract-graph CLI
//!
//! Every command result renders as JSON, YAML, or a colored human-readable
//! table.

use std::io::{self, Write};

use clap::ValueEnum;
use colored::Colorize;
use contract_graph_core::{
    ApplyResult, ChangeCheckResult, ChangeStatus, EngineStatus, ModuleRelations, RelatedModule,
    SearchResult, ValidationResult,
};
use serde::Serialize;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Human-readable rendering of a command result
pub trait TableOutput {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Render a result to stdout in the requested format
pub fn render<T>(value: &T, format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + TableOutput,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_output(value, format, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Render a result into any writer
pub fn write_output<T>(value: &T, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()>
where
    T: Serialize + TableOutput,
{
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(value)?)?,
        OutputFormat::Table => value.write_table(out)?,
    }
    Ok(())
}

fn header(out: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", title.cyan().bold())?;
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out)
}

fn status_mark(ok: bool) -> colored::ColoredString {
    if ok {
        "+".green()
    } else {
        "x".red()
    }
}

impl TableOutput for ValidationResult {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Contract Validation")?;

        for file in &self.files {
            writeln!(out, "{} {}", status_mark(file.valid), file.file_path)?;
            for issue in &file.errors {
                if issue.path.is_empty() {
                    writeln!(out, "    {}", issue.message.red())?;
                } else {
                    writeln!(out, "    {} {}", issue.path.yellow(), issue.message)?;
                }
            }
        }

        writeln!(out)?;
        let summary = format!(
            "{} files, {} invalid, {} issues",
            self.files.len(),
            self.invalid_count(),
            self.issue_count()
        );
        if self.valid {
            writeln!(out, "{} {}", "+".green(), summary.green())
        } else {
            writeln!(out, "{} {}", "x".red(), summary.red())
        }
    }
}

impl TableOutput for ApplyResult {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Graph Apply")?;
        writeln!(out, "{} {}", status_mark(self.success), self.message)?;
        if self.success {
            writeln!(out, "  Modules: {}", self.modules_processed)?;
            writeln!(out, "  Parts:   {}", self.parts_processed)?;
        }
        Ok(())
    }
}

impl TableOutput for ChangeCheckResult {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Contract Changes")?;

        if !self.has_changes {
            return writeln!(out, "{} Graph is up to date", "+".green());
        }

        for change in &self.changes {
            let label = match change.status {
                ChangeStatus::Added => "added".green(),
                ChangeStatus::Modified => "modified".yellow(),
                ChangeStatus::Removed => "removed".red(),
            };
            writeln!(out, "  {:<10} {} ({})", label, change.module_id.bold(), change.file_path)?;
        }

        writeln!(out)?;
        writeln!(
            out,
            "{} changes: {} added, {} modified, {} removed",
            self.total_changes, self.added_count, self.modified_count, self.removed_count
        )
    }
}

fn write_related(out: &mut dyn Write, title: &str, related: &[RelatedModule]) -> io::Result<()> {
    writeln!(out, "{}", title.cyan().bold())?;
    if related.is_empty() {
        return writeln!(out, "  (none)");
    }
    for module in related {
        let parts: Vec<String> = module
            .parts
            .iter()
            .map(|p| format!("{}: {}", p.part_id, p.part_type))
            .collect();
        writeln!(out, "  {} [{}]", module.module_id.bold(), parts.join(", "))?;
    }
    Ok(())
}

impl TableOutput for ModuleRelations {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, &format!("Relations of {}", self.module_id))?;
        write_related(out, "Depends on:", &self.outgoing_dependencies)?;
        writeln!(out)?;
        write_related(out, "Used by:", &self.incoming_dependencies)
    }
}

impl TableOutput for SearchResult {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        let title = match &self.query {
            Some(query) => format!("Search: \"{}\"", query),
            None => "Search".to_string(),
        };
        header(out, &title)?;

        if self.results.is_empty() {
            return writeln!(out, "No matching modules");
        }
        for (rank, hit) in self.results.iter().enumerate() {
            let module_id = hit.content.get("id").and_then(|v| v.as_str()).unwrap_or("?");
            writeln!(
                out,
                "{:>3}. {} {:.3}  {}",
                rank + 1,
                module_id.bold(),
                hit.similarity,
                hit.file_path.dimmed()
            )?;
        }
        writeln!(out)?;
        writeln!(out, "{} results", self.results_count)
    }
}

impl TableOutput for EngineStatus {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Contract Graph Status")?;
        writeln!(out, "  Source:         {}", self.source)?;
        writeln!(out, "  Store:          {}", self.store)?;
        writeln!(out, "  Stored modules: {}", self.stored_modules)?;
        writeln!(
            out,
            "  Embeddings:     {} {}",
            status_mark(self.embeddings_ready),
            self.embeddings
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_graph_core::{DependencyPart, FileValidation, ValidationIssue};

    fn plain<T: Serialize + TableOutput>(value: &T, format: OutputFormat) -> String {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        write_output(value, format, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn invalid_validation() -> ValidationResult {
        ValidationResult {
            valid: false,
            files: vec![FileValidation {
                file_path: "contracts/api.yaml".to_string(),
                file_name: "api.yaml".to_string(),
                valid: false,
                errors: vec![ValidationIssue::new("dependencies.0.module_id", "Module \"db\" does not exist")],
            }],
        }
    }

    #[test]
    fn test_validation_table() {
        let text = plain(&invalid_validation(), OutputFormat::Table);
        assert!(text.contains("x contracts/api.yaml"));
        assert!(text.contains("dependencies.0.module_id Module \"db\" does not exist"));
        assert!(text.contains("1 files, 1 invalid, 1 issues"));
    }

    #[test]
    fn test_validation_json_uses_wire_names() {
        let text = plain(&invalid_validation(), OutputFormat::Json);
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["files"][0]["filePath"], "contracts/api.yaml");
        assert_eq!(json["files"][0]["errors"][0]["path"], "dependencies.0.module_id");
    }

    #[test]
    fn test_change_table_up_to_date() {
        let text = plain(&ChangeCheckResult::from_changes(vec![]), OutputFormat::Table);
        assert!(text.contains("Graph is up to date"));
    }

    #[test]
    fn test_relations_yaml_and_table() {
        let relations = ModuleRelations {
            module_id: "db".to_string(),
            outgoing_dependencies: vec![],
            incoming_dependencies: vec![RelatedModule {
                module_id: "api".to_string(),
                parts: vec![DependencyPart::new("query", "function")],
            }],
        };

        let yaml = plain(&relations, OutputFormat::Yaml);
        assert!(yaml.contains("module_id: db"));

        let table = plain(&relations, OutputFormat::Table);
        assert!(table.contains("Used by:"));
        assert!(table.contains("api [query: function]"));
        assert!(table.contains("(none)"));
    }
}
