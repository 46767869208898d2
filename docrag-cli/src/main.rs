//! docrag - index a document corpus and answer questions from it.
//!
//! # Usage
//!
//! ```bash
//! # Build or refresh the index from ./docs
//! docrag index
//! docrag index --rebuild
//!
//! # Ask a question
//! docrag query "how long should brisket rest?" -k 5
//!
//! # Serve POST /api/rag and GET /health on port 5000
//! docrag serve --index-on-start
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docrag::{DocumentHandle, IndexReport, QueryRequest, RagEngine};
use docrag_cli::{Cli, Command, ServerConfig, init_logging, output, run_server};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let settings = cli.engine_settings().context("invalid configuration")?;
    let engine = RagEngine::open(settings)
        .await
        .with_context(|| format!("failed to open index at {}", cli.store.display()))?;

    match &cli.command {
        Command::Index { rebuild, json } => {
            let report = build_index(&engine, &cli, *rebuild).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", output::format_report(&report));
            }
        }
        Command::Query { question, k, json } => {
            let mut request = QueryRequest::new(question.clone());
            request.top_k = *k;
            let answer = engine.query(&request).await.context("query failed")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", output::format_answer(&answer));
            }
        }
        Command::Status { json } => {
            let status = engine.status().await.context("failed to read index status")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", output::format_status(&status));
            }
        }
        Command::Serve { host, port, index_on_start } => {
            if *index_on_start {
                let report = build_index(&engine, &cli, false).await?;
                info!(
                    indexed = report.indexed,
                    skipped = report.skipped,
                    failed = report.errors.len(),
                    "startup indexing finished"
                );
            }
            let config = ServerConfig { host: host.clone(), port: *port };
            run_server(config, Arc::new(engine)).await?;
        }
    }

    Ok(())
}

async fn build_index(engine: &RagEngine, cli: &Cli, rebuild: bool) -> Result<IndexReport> {
    let documents: Vec<DocumentHandle> = docrag::discover_documents(&cli.docs);
    if documents.is_empty() {
        warn!(docs = %cli.docs.display(), "no supported documents found");
    }

    let report = if rebuild {
        engine.rebuild(&documents).await
    } else {
        engine.index(&documents).await
    };
    report.context("indexing failed")
}
