use anyhow::bail;
use clap::Parser;
use factgraph::cli::Cli;
use factgraph::config::Fixture;
use factgraph::lifecycle::Session;
use factgraph_core::tracing::setup_tracing;
use factgraph_core::Provider;
use factgraph_os::LocalProvider;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    setup_tracing(cli.log_filter());

    let provider: Arc<dyn Provider> = match &cli.mock {
        Some(path) => Arc::new(Fixture::load(path)?.into_provider()),
        None => Arc::new(LocalProvider::new()),
    };
    let session = Session::new(provider)?;

    if cli.schema {
        let schema = session.schema(cli.include_private);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(ExitCode::SUCCESS);
    }
    if cli.queries.is_empty() {
        bail!("no queries given (try `factgraph platform.name` or `factgraph --schema`)");
    }

    let timeout = Duration::from_millis(cli.timeout_ms);
    let results = session.run(&cli.queries, &cli.watcher, timeout).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    let failed = results.values().filter(|o| o.is_error()).count();
    info!(queries = results.len(), failed, "queries evaluated");
    session.shutdown();

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
