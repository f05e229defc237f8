use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use docportal::{
    config::{self, Config},
    ingest::{IngestOptions, IngestionService, QueryOptions},
    logging,
    session::prune_sessions,
    storage::{FileStore, UploadedFile, extension_of},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docportal-cli",
    about = "Ingest documents, query indexes, and prune old sessions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files (directories are walked recursively) into a session index.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        #[arg(long)]
        k: Option<usize>,
    },
    /// Print the top-k chunks for a question as JSON.
    Query {
        question: String,
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        k: Option<usize>,
    },
    /// Keep only the newest N session directories under the upload and index bases.
    PruneSessions {
        #[arg(long, default_value_t = 5)]
        keep: usize,
    },
}

#[derive(Args)]
struct Scope {
    /// Session to read or write; generated for ingestion when omitted.
    #[arg(long)]
    session_id: Option<String>,
    /// Use the shared base directories instead of per-session ones.
    #[arg(long)]
    shared: bool,
}

impl Scope {
    fn use_session_dirs(&self, config: &Config) -> bool {
        config.use_session_dirs && !self.shared
    }
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
    logging::init_cli_tracing();
    let config = Arc::new(config::load().context("Invalid configuration")?);

    match cli.command {
        Command::Ingest {
            paths,
            scope,
            chunk_size,
            chunk_overlap,
            k,
        } => {
            let mut options = IngestOptions::from_config(&config);
            options.session_id = scope.session_id.clone();
            options.use_session_dirs = scope.use_session_dirs(&config);
            options.chunking.chunk_size = chunk_size.unwrap_or(options.chunking.chunk_size);
            options.chunking.chunk_overlap =
                chunk_overlap.unwrap_or(options.chunking.chunk_overlap);
            options.k = k.unwrap_or(options.k);

            let store = FileStore::new().with_markdown(config.allow_markdown);
            let files = collect_uploads(&paths, &store)?;
            if files.is_empty() {
                bail!("no supported files found under the given paths");
            }

            let service = IngestionService::new(Arc::clone(&config))?;
            let outcome = service.build_retriever(files, options).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
        }
        Command::Query { question, scope, k } => {
            let mut options = QueryOptions::from_config(&config);
            options.session_id = scope.session_id.clone();
            options.use_session_dirs = scope.use_session_dirs(&config);
            options.k = k.unwrap_or(options.k);

            let service = IngestionService::new(Arc::clone(&config))?;
            let answer = service.query(&question, &options).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::PruneSessions { keep } => {
            for base in [&config.upload_base_dir, &config.index_base_dir] {
                let removed = prune_sessions(base, keep)
                    .with_context(|| format!("failed to prune {}", base.display()))?;
                for path in removed {
                    println!("removed {}", path.display());
                }
            }
        }
    }

    Ok(())
}

fn collect_uploads(paths: &[PathBuf], store: &FileStore) -> Result<Vec<UploadedFile>> {
    let mut uploads = Vec::new();
    for root in paths {
        if !root.exists() {
            bail!("path does not exist: {}", root.display());
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() || !is_supported(entry.path(), store) {
                continue;
            }
            let content = std::fs::read(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            uploads.push(UploadedFile::new(name, content));
        }
    }
    Ok(uploads)
}

fn is_supported(path: &Path, store: &FileStore) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(extension_of)
        .is_some_and(|extension| store.supports(&extension))
}
