//! Contract Graph CLI
//!
//! # Usage
//!
//! ```bash
//! # Validate every contract under ./contracts
//! contract-graph --contracts-dir contracts validate
//!
//! # Rebuild the graph, embedding descriptions through a local service
//! contract-graph --contracts-dir contracts --embedding-endpoint http://localhost:8080 apply
//!
//! # Which modules changed since the last apply?
//! contract-graph --contracts-dir contracts check --format json
//!
//! # Dependency neighbourhood and search
//! contract-graph relations billing
//! contract-graph search --query "payment processing" --limit 5
//! contract-graph search --type service --category backend
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Validation failed or apply rejected
//! - 2: Changes detected by `check`
//! - 3: Invalid input
//! - 4: Configuration error or missing contracts directory
//! - 5: Module not found
//! - 10: Internal error

use clap::Parser;
use contract_graph_cli::{init_tracing, run_cli, ContractGraphCli};

fn main() {
    let cli = ContractGraphCli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
