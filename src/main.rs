use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tower_lsp::lsp_types::{ClientCapabilities, Position, Url};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use compose_lsp::{
    completion::get_completions,
    config::Settings,
    document::{DocumentStore, InMemoryDocuments},
    hover::hover,
    server,
};

/// Language server for Compose files
#[derive(Parser)]
#[command(name = "compose-lsp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the language server over stdin/stdout (default)
    Serve,

    /// Print the completions at a position as JSON
    Complete {
        file: PathBuf,
        /// 0-based line
        line: u32,
        /// 0-based character
        character: u32,
    },

    /// Print the hover at a position as JSON
    Hover {
        file: PathBuf,
        /// 0-based line
        line: u32,
        /// 0-based character
        character: u32,
    },
}

/// Loads `file` and everything it refers to, with settings from its directory.
fn open(file: &Path) -> Result<(InMemoryDocuments, Url, Settings)> {
    let path = file
        .canonicalize()
        .with_context(|| format!("cannot open {}", file.display()))?;
    let text = std::fs::read_to_string(&path)?;
    let uri = Url::from_file_path(&path).map_err(|_| anyhow!("not a file path: {}", path.display()))?;
    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;

    let settings = Settings::new(directory, &ClientCapabilities::default())?;
    let mut store = InMemoryDocuments::new();
    store.write(uri.clone(), &text);
    if settings.load_related_files {
        server::load_related_files(&mut store, &uri);
    }
    Ok((store, uri, settings))
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON-RPC, logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!("starting compose-lsp");
            server::run().await;
            tracing::info!("compose-lsp stopped");
        }
        Commands::Complete {
            file,
            line,
            character,
        } => {
            let (store, uri, settings) = open(&file)?;
            let schema = server::load_schema(&settings);
            let document = store
                .get_document(&uri)
                .ok_or_else(|| anyhow!("{uri} is not loaded"))?;
            let completions = get_completions(
                document,
                &store,
                schema.as_ref(),
                Position { line, character },
                &settings,
            );
            println!("{}", serde_json::to_string_pretty(&completions)?);
        }
        Commands::Hover {
            file,
            line,
            character,
        } => {
            let (store, uri, settings) = open(&file)?;
            let schema = server::load_schema(&settings);
            let document = store
                .get_document(&uri)
                .ok_or_else(|| anyhow!("{uri} is not loaded"))?;
            let result = hover(
                document,
                schema.as_ref(),
                Position { line, character },
                &settings,
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
