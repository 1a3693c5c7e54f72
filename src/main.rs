//! # ragweave CLI (`weave`)
//!
//! The `weave` binary drives ragweave from the command line: registering
//! documents, indexing them into the vector store, asking questions,
//! keeping a chat log, projecting documents into the knowledge graph, and
//! starting the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! weave --config ./config/weave.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `weave init` | Create the SQLite database and schema |
//! | `weave doc add <path>` | Register one file |
//! | `weave doc import <dir>` | Register every `.txt`/`.md` file under a directory |
//! | `weave doc list` | Page through registered documents |
//! | `weave doc get <id>` | Show one document |
//! | `weave doc delete <id>` | Delete a document with its chunks and entities |
//! | `weave doc process <id>` | Chunk, embed and index one document |
//! | `weave sync` | Index every document still pending |
//! | `weave query "<text>"` | Answer a question from indexed chunks |
//! | `weave chat add <role> <content>` | Append a chat message |
//! | `weave chat list` | List chat messages, newest first |
//! | `weave chat delete <id>` | Delete a chat message |
//! | `weave chat search "<text>"` | Find similar chat messages |
//! | `weave graph sync <id>` | Project a document into the knowledge graph |
//! | `weave graph entities <id>` | Entities linked to a document |
//! | `weave graph related <id>` | Related and similar documents |
//! | `weave status` | Counts and sync progress |
//! | `weave serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! weave init --config ./config/weave.toml
//!
//! # Register and index a folder of notes
//! weave doc import ./notes
//! weave sync
//!
//! # Ask a question
//! weave query "How is the cache invalidated?" --top-k 3
//! ```

mod app;
mod chat_cmd;
mod config;
mod db;
mod doc_cmd;
mod embedding;
mod graph_cmd;
mod llm;
mod migrate;
mod query_cmd;
mod server;
mod sqlite_graph;
mod sqlite_store;
mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ragweave: a local-first retrieval-augmented generation service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/weave.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "weave",
    about = "ragweave: local-first retrieval-augmented generation with a document registry and knowledge graph",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/weave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Safe to run more than once.
    Init,

    /// Manage registered documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Index documents whose vector state is still pending.
    Sync {
        /// Maximum number of documents to process.
        #[arg(long, default_value = "100")]
        limit: i64,
    },

    /// Answer a question from the indexed documents.
    Query {
        /// The question.
        query: String,

        /// Number of chunks to retrieve (overrides `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<i64>,

        /// Print the full answer object as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage the chat log.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Knowledge-graph operations.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Show document, chunk, chat and graph counts.
    Status,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum DocAction {
    /// Register a file.
    Add {
        path: PathBuf,

        /// Display name (defaults to the file name).
        #[arg(long)]
        name: Option<String>,

        /// Index the document right away.
        #[arg(long)]
        process: bool,
    },
    /// Register every `.txt`, `.md` and `.markdown` file under a directory.
    Import {
        dir: PathBuf,

        /// Index newly registered documents right away.
        #[arg(long)]
        process: bool,
    },
    /// List registered documents, newest first.
    List {
        #[arg(long, default_value = "1")]
        page: i64,

        #[arg(long, default_value = "20")]
        per_page: i64,
    },
    /// Show one document.
    Get { id: String },
    /// Delete a document with its chunks and entities.
    Delete { id: String },
    /// Chunk, embed and index one document.
    Process { id: String },
}

#[derive(Subcommand)]
enum ChatAction {
    /// Append a message (`user`, `assistant` or `system`).
    Add {
        role: String,
        content: String,

        /// Metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// List messages, newest first.
    List {
        /// Only messages with this role.
        #[arg(long)]
        role: Option<String>,

        #[arg(long, default_value = "20")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Delete a message.
    Delete { id: i64 },
    /// Find messages similar to a query (requires embeddings).
    Search {
        query: String,

        #[arg(long, default_value = "5")]
        top_k: i64,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Project a document and its entities into the graph.
    Sync { id: String },
    /// Entities linked to a document.
    Entities { id: String },
    /// Documents related to a document.
    Related {
        id: String,

        #[arg(long, default_value = "2")]
        depth: u32,

        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Doc { action } => match action {
            DocAction::Add { path, name, process } => {
                doc_cmd::run_add(&cfg, &path, name.as_deref(), process).await?;
            }
            DocAction::Import { dir, process } => {
                doc_cmd::run_import(&cfg, &dir, process).await?;
            }
            DocAction::List { page, per_page } => {
                doc_cmd::run_list(&cfg, page, per_page).await?;
            }
            DocAction::Get { id } => {
                doc_cmd::run_get(&cfg, &id).await?;
            }
            DocAction::Delete { id } => {
                doc_cmd::run_delete(&cfg, &id).await?;
            }
            DocAction::Process { id } => {
                doc_cmd::run_process(&cfg, &id).await?;
            }
        },
        Commands::Sync { limit } => {
            doc_cmd::run_sync(&cfg, limit).await?;
        }
        Commands::Query { query, top_k, json } => {
            query_cmd::run_query(&cfg, &query, top_k, json).await?;
        }
        Commands::Chat { action } => match action {
            ChatAction::Add {
                role,
                content,
                metadata,
            } => {
                chat_cmd::run_add(&cfg, &role, &content, metadata.as_deref()).await?;
            }
            ChatAction::List { role, limit, offset } => {
                chat_cmd::run_list(&cfg, role.as_deref(), limit, offset).await?;
            }
            ChatAction::Delete { id } => {
                chat_cmd::run_delete(&cfg, id).await?;
            }
            ChatAction::Search { query, top_k } => {
                chat_cmd::run_search(&cfg, &query, top_k).await?;
            }
        },
        Commands::Graph { action } => match action {
            GraphAction::Sync { id } => {
                graph_cmd::run_sync(&cfg, &id).await?;
            }
            GraphAction::Entities { id } => {
                graph_cmd::run_entities(&cfg, &id).await?;
            }
            GraphAction::Related { id, depth, limit } => {
                graph_cmd::run_related(&cfg, &id, depth, limit).await?;
            }
        },
        Commands::Status => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
