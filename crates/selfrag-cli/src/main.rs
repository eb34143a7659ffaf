//! Self-RAG CLI - Command-line interface
//!
//! Usage:
//!   selfrag query <question> [--config selfrag.toml] [--json] [--top-k 3]
//!   selfrag config [--config selfrag.toml]

use anyhow::Context;
use clap::{Parser, Subcommand};
use selfrag_core::{AppConfig, Completer, LoggingConfig};
use selfrag_engine::{create_grader_client, create_llm_client, RunOutcome, SelfRagOrchestrator};
use selfrag_vector::{create_embedding_client, QdrantRetriever};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "selfrag")]
#[command(about = "Quality-gated retrieval-augmented question answering")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables take precedence)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from the indexed documents
    Query {
        /// Question to ask
        question: String,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,

        /// Override the number of passages retrieved
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    init_tracing(&config.logging);

    match cli.command {
        Commands::Query {
            question,
            json,
            top_k,
        } => {
            if let Some(top_k) = top_k {
                config.self_rag.top_k = top_k;
            }
            config.validate()?;

            let rag = build_orchestrator(&config)?;
            let outcome = rag.run(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }

            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Commands::Config => {
            if config.llm.openai_api_key.is_some() {
                config.llm.openai_api_key = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "selfrag={0},selfrag_engine={0},selfrag_vector={0}",
            logging.level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_orchestrator(config: &AppConfig) -> anyhow::Result<SelfRagOrchestrator> {
    let embedder = create_embedding_client(&config.llm)?;
    let retriever = Arc::new(QdrantRetriever::new(&config.vector, embedder)?);
    let generator = create_llm_client(&config.llm)?;
    let grader = create_grader_client(&config.llm)?;

    tracing::info!(
        generator = generator.model(),
        grader = grader.model(),
        collection = %config.vector.collection,
        "Self-RAG pipeline ready"
    );

    Ok(SelfRagOrchestrator::with_grader(
        retriever,
        generator,
        grader,
        config.self_rag.clone(),
    ))
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Success {
            answer,
            context,
            diagnostics,
        } => {
            println!("{answer}");
            println!();
            println!("Sources:");
            for (i, passage) in context.iter().enumerate() {
                let source = passage.metadata_str("source").unwrap_or("unknown");
                let preview: String = passage.content.chars().take(80).collect();
                println!("  [{}] {source}: {preview}", i + 1);
            }
            if diagnostics.attempts.rewrites > 0 {
                println!();
                println!("Answered as: {}", diagnostics.final_query);
            }
        }
        RunOutcome::Unanswerable {
            reason,
            diagnostics,
        } => {
            println!("No answer: {reason}");
            println!(
                "({} steps, {} generations, {} rewrites)",
                diagnostics.attempts.steps,
                diagnostics.attempts.generations,
                diagnostics.attempts.rewrites
            );
        }
    }
}
