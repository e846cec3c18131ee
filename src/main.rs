//! # Report Analyst CLI (`analyst`)
//!
//! ## Usage
//!
//! ```bash
//! analyst --config ./config/analyst.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyst init` | Create the SQLite database and upload directory |
//! | `analyst serve` | Start the HTTP API and background workers |
//! | `analyst analyze <file>` | Run the full analysis in the foreground |
//! | `analyst search <file> "<query>" [--tool]` | Show the report segments retrieved for a query |
//! | `analyst extract <file>` | Print extracted page text (or table rows) |
//! | `analyst status [id]` | Show one request, or the most recent ones |
//!
//! A missing config file means built-in defaults: hashing embeddings, the
//! extractive model and `./data/analyst.sqlite`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use report_analyst::agents::DEFAULT_QUERY;
use report_analyst::config;
use report_analyst::extract::extract_tables;
use report_analyst::migrate;
use report_analyst::models::format_ts_iso;
use report_analyst::pipeline::{self, AnalysisServices};
use report_analyst::retriever::{ReportSearchTool, Retriever};
use report_analyst::server;
use report_analyst::store::ResultStore;

/// Blood test report analyser: PDF retrieval plus sequential specialist
/// agents.
#[derive(Parser)]
#[command(
    name = "analyst",
    about = "Analyse blood test reports with retrieval-augmented specialist agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/analyst.toml`; built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/analyst.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Start the HTTP server and job workers.
    Serve,

    /// Analyse a report in the foreground and print the narrative.
    Analyze {
        /// Path to the PDF report.
        file: PathBuf,

        /// Question to answer.
        #[arg(long, default_value = DEFAULT_QUERY)]
        query: String,
    },

    /// Print the segments retrieved for a query.
    Search {
        /// Path to the PDF report.
        file: PathBuf,

        /// The search query string.
        query: String,

        /// Number of segments (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Print the search tool output exactly as agent steps receive it.
        /// Accepts batch queries (`"A" OR "B"`).
        #[arg(long)]
        tool: bool,
    },

    /// Print the text extracted from a report.
    Extract {
        /// Path to the PDF report.
        file: PathBuf,

        /// Print table rows (cells separated by ` | `) instead of page text.
        #[arg(long)]
        tables: bool,
    },

    /// Show the status of an analysis request.
    Status {
        /// Request id; omit to list the most recent requests.
        id: Option<String>,

        /// Number of requests to list.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            std::fs::create_dir_all(&cfg.server.upload_dir)?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Analyze { file, query } => {
            let services = AnalysisServices::from_config(&cfg)?;
            let report = pipeline::analyze(&services, &query, &file)
                .await
                .map_err(|e| anyhow::anyhow!(e.report()))?;
            println!("{}", report.render());
        }
        Commands::Search { file, query, k, tool } => {
            let services = AnalysisServices::from_config(&cfg)?;
            let retriever =
                pipeline::build_retriever(&file, Arc::clone(&services.embedder), &services.settings)
                    .await
                    .map_err(|e| anyhow::anyhow!(e.report()))?;
            let k = k.unwrap_or(services.settings.top_k);
            if tool {
                let tool = ReportSearchTool::new(Arc::new(retriever), k);
                println!("{}", tool.search(&query).await?);
                return Ok(());
            }
            let hits = retriever.retrieve(&query, k).await?;

            if hits.is_empty() {
                println!("No results.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [score: {:.3}] page {} segment {}",
                    rank + 1,
                    hit.score,
                    hit.page,
                    hit.index
                );
                for line in hit.text.lines() {
                    println!("    {}", line);
                }
                println!();
            }
        }
        Commands::Extract { file, tables } => {
            let doc = pipeline::load_document(&file)
                .await
                .map_err(|e| anyhow::anyhow!("LoadError: {}", e))?;
            if tables {
                for row in extract_tables(&doc) {
                    println!("p{}\t{}", row.page, row.cells.join(" | "));
                }
            } else {
                for page in &doc.pages {
                    println!("--- page {} ---", page.number);
                    println!("{}", page.text);
                }
            }
        }
        Commands::Status { id, limit } => {
            let store = ResultStore::open(&cfg).await?;
            match id {
                Some(id) => {
                    let request = store
                        .get_request(&id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("request not found: {}", id))?;
                    println!("id:         {}", request.id);
                    println!("status:     {}", request.status);
                    println!("query:      {}", request.query);
                    println!("file:       {}", request.file_path);
                    println!("created_at: {}", format_ts_iso(request.created_at));
                    if let Some(error) = &request.error {
                        println!("error:      {}", error);
                    }
                    if let Some(result) = store.get_result(&id).await? {
                        println!();
                        println!("{}", result.content);
                    }
                }
                None => {
                    let requests = store.list_requests(limit).await?;
                    if requests.is_empty() {
                        println!("No analysis requests.");
                    }
                    for r in requests {
                        println!(
                            "{}  {:<10}  {}  {}",
                            r.id,
                            r.status.as_str(),
                            format_ts_iso(r.created_at),
                            r.query
                        );
                    }
                }
            }
            store.pool().close().await;
        }
    }

    Ok(())
}
