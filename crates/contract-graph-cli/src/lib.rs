//! CLI for the contract graph engine
//!
//! Validates module contracts, applies them to the graph, reports changes
//! since the last apply, and queries relations and similar modules.

pub mod commands;
pub mod output;

pub use commands::{build_config, execute, Commands, ContractGraphCli};
pub use output::{render, OutputFormat, TableOutput};

use contract_graph_core::{ConfigError, ContractGraph, EngineError, MetricsRegistry};
use tracing_subscriber::EnvFilter;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command succeeded
    Success = 0,
    /// Contracts failed validation, or the apply did not go through
    ValidationFailed = 1,
    /// `check` found modules that differ from the graph
    ChangesDetected = 2,
    /// Bad request, e.g. an empty module id or an out-of-range limit
    InvalidInput = 3,
    /// Missing contracts directory or rejected configuration
    ConfigError = 4,
    /// Module not found in the graph
    NotFound = 5,
    /// Store, embedding or I/O failure
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Map a command failure to its exit code
    pub fn from_error(error: &anyhow::Error) -> Self {
        if let Some(engine) = error.downcast_ref::<EngineError>() {
            if engine.is_not_found() {
                ExitCode::NotFound
            } else if engine.is_configuration() {
                ExitCode::ConfigError
            } else if engine.is_user_error() {
                ExitCode::InvalidInput
            } else {
                ExitCode::InternalError
            }
        } else if error.downcast_ref::<ConfigError>().is_some() {
            ExitCode::ConfigError
        } else {
            ExitCode::InternalError
        }
    }
}

/// Install the global tracing subscriber
///
/// Logs go to stderr so that stdout only carries command output. `RUST_LOG`
/// wins over `-v`.
pub fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    // A second init (e.g. in tests) is not an error worth reporting
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Run one CLI invocation to completion
pub async fn run(cli: ContractGraphCli) -> anyhow::Result<ExitCode> {
    let config = build_config(&cli)?;
    tracing::debug!(?config, "Resolved configuration");

    let mut engine = ContractGraph::from_config(&config)?;
    let registry = if cli.metrics {
        let registry = MetricsRegistry::new()?;
        engine = engine.with_metrics(registry.engine());
        Some(registry)
    } else {
        None
    };

    let outcome = execute(&engine, &cli.command, cli.format).await;

    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "Failed to close graph store");
    }
    if let Some(registry) = registry {
        eprint!("{}", registry.encode_text()?);
    }

    outcome
}

/// Run the CLI and return the process exit code
pub fn run_cli(cli: ContractGraphCli) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::InternalError;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use contract_graph_core::{SearchError, SourceError};
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::ValidationFailed), 1);
        assert_eq!(i32::from(ExitCode::ChangesDetected), 2);
        assert_eq!(i32::from(ExitCode::NotFound), 5);
        assert_eq!(i32::from(ExitCode::InternalError), 10);
    }

    #[test]
    fn test_exit_code_from_error() {
        let not_found = anyhow::Error::new(EngineError::not_found("ghost"));
        assert_eq!(ExitCode::from_error(&not_found), ExitCode::NotFound);

        let unconfigured = anyhow::Error::new(EngineError::Source(SourceError::NotConfigured));
        assert_eq!(ExitCode::from_error(&unconfigured), ExitCode::ConfigError);

        let not_ready = anyhow::Error::new(EngineError::Search(SearchError::ProviderNotReady));
        assert_eq!(ExitCode::from_error(&not_ready), ExitCode::InvalidInput);

        let config = anyhow::Error::new(ConfigError::InvalidValue {
            key: "max_sessions".to_string(),
            message: "must be at least 1".to_string(),
        });
        assert_eq!(ExitCode::from_error(&config), ExitCode::ConfigError);

        let other = anyhow::anyhow!("disk on fire");
        assert_eq!(ExitCode::from_error(&other), ExitCode::InternalError);
    }

    fn write_contract(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn cli_for(contracts: &std::path::Path, db: &std::path::Path, args: &[&str]) -> ContractGraphCli {
        let mut argv = vec![
            "contract-graph".to_string(),
            "--contracts-dir".to_string(),
            contracts.display().to_string(),
            "--db".to_string(),
            db.display().to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        ContractGraphCli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_run_validate_apply_check() {
        let contracts = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let db = data.path().join("graph");
        write_contract(
            contracts.path(),
            "db.yaml",
            "id: db\ntype: library\ncategory: storage\ndescription: Database access\nparts:\n  - id: query\n    type: function\n",
        );
        write_contract(
            contracts.path(),
            "api.yaml",
            "id: api\ntype: service\ncategory: backend\ndescription: Public API\ndependencies:\n  - module_id: db\n    parts:\n      - part_id: query\n        type: function\n",
        );

        let code = run(cli_for(contracts.path(), &db, &["validate"])).await.unwrap();
        assert_eq!(code, ExitCode::Success);

        let code = run(cli_for(contracts.path(), &db, &["check"])).await.unwrap();
        assert_eq!(code, ExitCode::ChangesDetected);

        let code = run(cli_for(contracts.path(), &db, &["apply"])).await.unwrap();
        assert_eq!(code, ExitCode::Success);

        let code = run(cli_for(contracts.path(), &db, &["check"])).await.unwrap();
        assert_eq!(code, ExitCode::Success);

        let code = run(cli_for(contracts.path(), &db, &["relations", "db"])).await.unwrap();
        assert_eq!(code, ExitCode::Success);
    }

    #[tokio::test]
    async fn test_run_reports_invalid_and_missing() {
        let contracts = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let db = data.path().join("graph");
        write_contract(
            contracts.path(),
            "api.yaml",
            "id: api\ntype: service\ncategory: backend\ndescription: Public API\ndependencies:\n  - module_id: ghost\n",
        );

        let code = run(cli_for(contracts.path(), &db, &["validate"])).await.unwrap();
        assert_eq!(code, ExitCode::ValidationFailed);

        let code = run(cli_for(contracts.path(), &db, &["apply"])).await.unwrap();
        assert_eq!(code, ExitCode::ValidationFailed);

        let err = run(cli_for(contracts.path(), &db, &["relations", "ghost"])).await.unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }

    #[tokio::test]
    async fn test_run_missing_contracts_dir() {
        let data = tempfile::tempdir().unwrap();
        let missing = PathBuf::from(data.path()).join("nope");
        let err = run(cli_for(&missing, &data.path().join("graph"), &["validate"]))
            .await
            .unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
    }
}
