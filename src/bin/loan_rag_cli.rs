use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loan_rag::{
    config,
    logging::{self, LogOutput},
    processing::{Document, QueryRequest, RagApi, RagService},
};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "loan-rag-cli",
    about = "Index loan documents and query them from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a loan's documents, from a JSON file or the configured document source.
    Index {
        #[arg(long)]
        loan: String,
        /// JSON file holding one document or an array of documents.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Retrieve context for a question about a loan.
    Query {
        #[arg(long)]
        loan: String,
        #[arg(long)]
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print only the assembled context string.
        #[arg(long)]
        context_only: bool,
    },
    /// Show how many vectors are indexed for a loan.
    Status {
        #[arg(long)]
        loan: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing(LogOutput::Stderr);
    let config = config::Config::from_env().context("failed to load configuration")?;
    let service = RagService::from_config(&config)
        .await
        .context("failed to initialize pipeline")?;

    match cli.command {
        Command::Index { loan, file } => {
            let outcome = match file {
                Some(path) => {
                    let documents = read_documents(&path)?;
                    service.index_documents(&loan, documents).await?
                }
                None => service.index_loan(&loan).await?,
            };
            print_json(&outcome)
        }
        Command::Query {
            loan,
            query,
            top_k,
            context_only,
        } => {
            let outcome = service
                .query(QueryRequest {
                    loan_id: loan,
                    query,
                    top_k,
                })
                .await?;
            if context_only {
                println!("{}", outcome.context_string);
                Ok(())
            } else {
                print_json(&outcome)
            }
        }
        Command::Status { loan } => {
            let indexed_vectors = service.indexed_vector_count(&loan).await?;
            print_json(&serde_json::json!({
                "loanId": loan,
                "indexedVectors": indexed_vectors,
            }))
        }
    }
}

fn read_documents(path: &PathBuf) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if content.trim_start().starts_with('[') {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse documents in {}", path.display()))
    } else {
        let document: Document = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse document in {}", path.display()))?;
        Ok(vec![document])
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
