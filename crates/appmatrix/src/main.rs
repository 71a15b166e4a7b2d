use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use appmatrix_core::{MatrixProcessor, ProcessorConfig};

#[derive(Parser)]
#[command(name = "appmatrix", about = "Product application matrix pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a matrix file and write its entities and relationships to
    /// the knowledge graph.
    Process {
        /// Path to the application matrix CSV.
        file: PathBuf,

        /// Scraped product records (JSON) for match statistics.
        #[arg(long)]
        products: Option<PathBuf>,

        /// Graph instance id. Falls back to APPMATRIX_INSTANCE.
        #[arg(long)]
        instance: Option<String>,

        /// Graph API base URL. Falls back to APPMATRIX_API_URL.
        #[arg(long)]
        api_url: Option<String>,

        /// Graph API key. Falls back to APPMATRIX_API_KEY.
        #[arg(long)]
        api_key: Option<String>,

        /// Fuzzy match threshold in [0, 1].
        #[arg(long, default_value_t = appmatrix_core::matrix::DEFAULT_MATCH_THRESHOLD)]
        threshold: f64,

        /// Parse and report counts without writing to the graph.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a summary of what a matrix file contains.
    Preview {
        /// Path to the application matrix CSV.
        file: PathBuf,
    },
}

fn env_fallback(flag: Option<String>, var: &str) -> Option<String> {
    flag.or_else(|| std::env::var(var).ok())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            file,
            products,
            instance,
            api_url,
            api_key,
            threshold,
            dry_run,
        } => {
            let config = ProcessorConfig {
                matrix_file: file,
                scraped_products: products,
                instance_id: env_fallback(instance, "APPMATRIX_INSTANCE"),
                api_url: env_fallback(api_url, "APPMATRIX_API_URL"),
                api_key: env_fallback(api_key, "APPMATRIX_API_KEY"),
                match_threshold: threshold,
                dry_run,
            };

            let result = MatrixProcessor::new(config).process().await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if result.success {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Preview { file } => {
            let preview = MatrixProcessor::new(ProcessorConfig::new(file))
                .preview()
                .await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
