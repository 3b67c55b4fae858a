//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;

/// Query facts about the local machine, or about a scripted fixture.
///
/// Each QUERY has the form `resource[(key=value, ...)].field`, for example
/// `platform.name`, `sshd.config.params` or `file(path=/etc/hosts).content`.
#[derive(Debug, Parser)]
#[command(name = "factgraph")]
#[command(about = "Query operating-system facts through a lazily computed resource graph")]
#[command(version)]
pub struct Cli {
    /// Serve commands and files from a JSON fixture instead of the local machine
    #[arg(long, value_name = "FILE", env = "FACTGRAPH_MOCK")]
    pub mock: Option<PathBuf>,

    /// Prefix of the watcher ids the queries subscribe with
    #[arg(long, default_value = "factgraph")]
    pub watcher: String,

    /// How long a query waits for a field computed by another query, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Print the resource schema as JSON and exit
    #[arg(long)]
    pub schema: bool,

    /// Include private resources and fields in `--schema`
    #[arg(long, requires = "schema")]
    pub include_private: bool,

    /// Log protocol steps to stderr (`RUST_LOG` takes precedence)
    #[arg(short, long)]
    pub verbose: bool,

    /// Fields to query
    #[arg(value_name = "QUERY")]
    pub queries: Vec<String>,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}
