//! # Lecture Summarizer CLI (`lsum`)
//!
//! ## Usage
//!
//! ```bash
//! lsum --config ./config/lsum.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lsum init` | Create the SQLite database and run schema migrations |
//! | `lsum collection create <name>` | Create a collection |
//! | `lsum collection list` | List collections of the configured account |
//! | `lsum collection delete <name>` | Delete a collection and its files |
//! | `lsum ingest <collection> <path>` | Ingest a file or directory |
//! | `lsum files <collection>` | List the files of a collection |
//! | `lsum summarize <collection> <file>` | Print the key points of one file |
//! | `lsum serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! lsum init
//! lsum ingest thermo ./lectures/thermodynamics
//! lsum summarize thermo week2/entropy.pdf
//! lsum summarize thermo week2/entropy.pdf --topic "carnot cycle"
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lecture_summarizer::{config, ingest, library, migrate, server, summarize};

/// Lecture Summarizer: bullet-point summaries of ingested lecture files.
#[derive(Parser)]
#[command(
    name = "lsum",
    about = "Bullet-point summaries of ingested lecture files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lsum.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage collections.
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Ingest a file or directory into a collection, creating it if needed.
    Ingest {
        collection: String,
        path: PathBuf,
    },

    /// List the files stored in a collection.
    Files { collection: String },

    /// Summarize one file of a collection into key points.
    Summarize {
        collection: String,
        file: String,

        /// Only summarize segments matching this topic.
        #[arg(long)]
        topic: Option<String>,

        /// Print the points as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CollectionAction {
    Create { name: String },
    List,
    Delete { name: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Collection { action } => match action {
            CollectionAction::Create { name } => library::run_create(&cfg, &name).await?,
            CollectionAction::List => library::run_list(&cfg).await?,
            CollectionAction::Delete { name } => library::run_delete(&cfg, &name).await?,
        },
        Commands::Ingest { collection, path } => {
            ingest::run_ingest(&cfg, &collection, &path).await?;
        }
        Commands::Files { collection } => {
            library::run_files(&cfg, &collection).await?;
        }
        Commands::Summarize {
            collection,
            file,
            topic,
            json,
        } => {
            summarize::run_summarize(&cfg, &collection, &file, topic.as_deref(), json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
