//! CLI command definitions for contract-graph
//!
//! Clap-based definitions for validating contracts, applying them to the
//! graph, detecting changes, and querying relations and similar modules.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use contract_graph_core::config::EngineConfigBuilder;
use contract_graph_core::{ContractGraph, EngineConfig, SearchRequest};

use crate::output::{render, OutputFormat};
use crate::ExitCode;

/// Contract Graph CLI
///
/// Validate module contracts, synchronize them into the contract graph, and
/// search it.
#[derive(Parser, Debug)]
#[command(name = "contract-graph")]
#[command(about = "Contract Graph - validate, apply and search module contracts", long_about = None)]
#[command(version)]
pub struct ContractGraphCli {
    /// Directory holding contract files
    #[arg(long, env = "CONTRACTS_DIR", global = true)]
    pub contracts_dir: Option<PathBuf>,

    /// Graph database location
    #[arg(long, env = "CONTRACT_GRAPH_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Base URL of the embedding service
    #[arg(long, env = "EMBEDDING_ENDPOINT", global = true)]
    pub embedding_endpoint: Option<String>,

    /// TOML configuration file; flags and environment take precedence
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Validate every contract in the contracts directory
    ///
    /// Reports structural and cross-contract violations per file.
    Validate,

    /// Validate and rebuild the graph from the contracts directory
    ///
    /// Nothing is written unless the whole batch is valid.
    Apply,

    /// Show modules added, modified or removed since the last apply
    Check,

    /// Show what a module depends on and what depends on it
    Relations {
        /// Module id
        module_id: String,
    },

    /// Search modules by similarity or by type/category
    Search {
        /// Query text; needs an embedding endpoint
        #[arg(short, long)]
        query: Option<String>,

        /// Exact module type filter
        #[arg(short = 't', long = "type")]
        module_type: Option<String>,

        /// Exact category filter
        #[arg(short, long)]
        category: Option<String>,

        /// Maximum number of results (1-100)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show store and embedding provider status
    Status,
}

/// Resolve the engine configuration: file, then environment, then flags
pub fn build_config(cli: &ContractGraphCli) -> anyhow::Result<EngineConfig> {
    let base = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut builder = EngineConfigBuilder::from_config(base.merge_env()?);
    if let Some(dir) = &cli.contracts_dir {
        builder = builder.contracts_dir(dir);
    }
    if let Some(db) = &cli.db {
        builder = builder.graph_path(db);
    }
    if let Some(endpoint) = &cli.embedding_endpoint {
        builder = builder.embedding_endpoint(endpoint);
    }
    Ok(builder.build()?)
}

/// Run one command against the engine
pub async fn execute(
    engine: &ContractGraph,
    command: &Commands,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Validate => {
            let result = engine.validate().await?;
            render(&result, format)?;
            Ok(if result.valid {
                ExitCode::Success
            } else {
                ExitCode::ValidationFailed
            })
        }
        Commands::Apply => {
            engine.await_embeddings().await;
            let result = engine.apply().await?;
            render(&result, format)?;
            Ok(if result.success {
                ExitCode::Success
            } else {
                ExitCode::ValidationFailed
            })
        }
        Commands::Check => {
            let result = engine.check_modified().await?;
            render(&result, format)?;
            Ok(if result.has_changes {
                ExitCode::ChangesDetected
            } else {
                ExitCode::Success
            })
        }
        Commands::Relations { module_id } => {
            let relations = engine.relations(module_id).await?;
            render(&relations, format)?;
            Ok(ExitCode::Success)
        }
        Commands::Search {
            query,
            module_type,
            category,
            limit,
        } => {
            let request = SearchRequest {
                query: query.clone(),
                module_type: module_type.clone(),
                category: category.clone(),
                limit: *limit,
            };
            if request.is_semantic() {
                engine.await_embeddings().await;
            }
            let result = engine.search(&request).await?;
            render(&result, format)?;
            Ok(ExitCode::Success)
        }
        Commands::Status => {
            engine.await_embeddings().await;
            let status = engine.status().await?;
            render(&status, format)?;
            Ok(ExitCode::Success)
        }
    }
}
