use clap::Parser;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use stock_deep_research::{DeepResearcher, ResearchConfig};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXAMPLE_QUERIES: [&str; 5] = [
    "What are the recent developments and future outlook for NVIDIA stock?",
    "What factors might affect Apple's stock price in the next quarter?",
    "How might interest rate changes impact bank stocks?",
    "What are the growth prospects for AI-related stocks?",
    "How are EV stocks performing and what is their outlook?",
];

#[derive(Parser)]
#[command(name = "stock-research-interactive")]
#[command(about = "Pick an example stock question and research it", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// What the user picked from the menu
#[derive(Debug, PartialEq)]
enum Selection {
    Custom,
    Example(&'static str),
    Invalid,
}

fn select(input: &str) -> Selection {
    match input.trim().parse::<usize>() {
        Ok(0) => Selection::Custom,
        Ok(n) if (1..=EXAMPLE_QUERIES.len()).contains(&n) => {
            Selection::Example(EXAMPLE_QUERIES[n - 1])
        }
        _ => Selection::Invalid,
    }
}

fn prompt_line(stdin: &mut impl BufRead, prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    stdin.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_query() -> io::Result<String> {
    println!("Stock Price Reasoner with Deep Research");
    println!("{}", "=".repeat(50));
    println!("\nAvailable example queries:");
    for (i, query) in EXAMPLE_QUERIES.iter().enumerate() {
        println!("{}. {}", i + 1, query);
    }

    let mut stdin = io::stdin().lock();
    let choice = prompt_line(
        &mut stdin,
        "\nSelect a query (1-5) or enter 0 to input your own: ",
    )?;

    let query = match select(&choice) {
        Selection::Custom => prompt_line(&mut stdin, "\nEnter your research query: ")?,
        Selection::Example(query) => query.to_string(),
        Selection::Invalid => {
            println!("Invalid choice. Using the first example query.");
            EXAMPLE_QUERIES[0].to_string()
        }
    };

    Ok(query)
}

/// Reads the query on a detached thread so an interrupt never waits on stdin
async fn read_query_detached() -> io::Result<String> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(read_query());
    });
    rx.await
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "query reader stopped"))?
}

async fn run() -> ExitCode {
    let query = match read_query_detached().await {
        Ok(query) => query,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Local embedding models load synchronously
    let setup = tokio::task::spawn_blocking(|| {
        ResearchConfig::from_env().and_then(DeepResearcher::from_config)
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

    println!("\nResearching: {}", query);
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

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    until_interrupted(run(), tokio::signal::ctrl_c()).await
}
