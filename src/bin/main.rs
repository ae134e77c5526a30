use clap::Parser;
use std::future::Future;
use std::process::ExitCode;
use stock_deep_research::{ticker_query, DeepResearcher, ResearchConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stock-research")]
#[command(about = "Deep research for stock price analysis", long_about = None)]
struct Cli {
    /// Research query about stock prices
    query: String,

    /// Stock ticker symbol to focus research on
    #[arg(long)]
    ticker: Option<String>,

    /// Maximum number of research steps (defaults to MAX_STEPS)
    #[arg(long)]
    max_steps: Option<usize>,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

async fn run(cli: Cli) -> ExitCode {
    let query = ticker_query(&cli.query, cli.ticker.as_deref());
    let max_steps = cli.max_steps;

    // Local embedding models load synchronously
    let setup = tokio::task::spawn_blocking(move || {
        ResearchConfig::from_env()
            .map(|config| match max_steps {
                Some(max_steps) => config.with_max_steps(max_steps),
                None => config,
            })
            .and_then(DeepResearcher::from_config)
    });
    let mut researcher = match setup.await {
        Ok(Ok(researcher)) => researcher,
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Researching: {}", query);
    println!("{}", "-".repeat(50));

    match researcher.research(&query).await {
        Ok(answer) => {
            println!("\nResearch Results:");
            println!("{}", "=".repeat(50));
            println!("{}", answer);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Research failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Drives `flow` to completion unless `interrupt` resolves first
async fn until_interrupted(
    flow: impl Future<Output = ExitCode>,
    interrupt: impl Future,
) -> ExitCode {
    tokio::select! {
        code = flow => code,
        _ = interrupt => {
            info!("Interrupted");
            eprintln!("\nResearch interrupted by user.");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // RUST_LOG overrides the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    until_interrupted(run(cli), tokio::signal::ctrl_c()).await
}
