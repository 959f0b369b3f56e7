use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use flowgate::loadgen::{run_load, write_results, LoadConfig, OutputFormat};
use flowgate::observability::logging;

#[derive(Parser)]
#[command(name = "flowgate-load")]
#[command(about = "Async load generator for the FlowGate proxy", long_about = None)]
struct Cli {
    /// Target URL on the proxy, e.g. http://127.0.0.1:8080/api/resource
    #[arg(long)]
    url: String,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 100)]
    requests: usize,

    /// Maximum requests in flight
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Maximum retries per request on transport error or 5xx
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Initial retry backoff in ms, doubled per retry
    #[arg(long, default_value_t = 100)]
    retry_backoff_ms: u64,

    /// Generate an X-Trace-Id per request
    #[arg(long)]
    client_trace: bool,

    #[arg(short, long, default_value = "results.json")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Csv => OutputFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&Default::default())?;

    let config = LoadConfig {
        url: cli.url,
        requests: cli.requests,
        concurrency: cli.concurrency,
        max_retries: cli.retries,
        retry_backoff_ms: cli.retry_backoff_ms,
        client_trace: cli.client_trace,
        ..LoadConfig::default()
    };

    let client = reqwest::Client::new();
    let results = run_load(&client, &config).await?;

    let file = File::create(&cli.output)?;
    write_results(&results, cli.format.into(), BufWriter::new(file))?;

    println!("Wrote {} results to {}", results.len(), cli.output.display());
    Ok(())
}
