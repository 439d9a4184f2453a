//! docindex CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docindex::{
    commands::{
        cmd_create_index, cmd_delete, cmd_delete_indices, cmd_index, cmd_init, cmd_list_files,
        cmd_list_indices, cmd_query, cmd_status, print_batch_report, print_delete_report,
        print_files, print_indices, print_init_report, print_query_results, print_status,
        IndexOptions, IndexSelector, InitOptions, QueryOptions, StoreHandles,
    },
    catalog::CatalogDb,
    config::Config,
    embed::create_embedder,
    error::{Error, Result},
    progress::{BatchProgress, LogWriterFactory},
    store::{QdrantVectorStore, RetrievalMode},
};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docindex")]
#[command(version, about = "Multi-store document index with scoped hybrid retrieval", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Index to operate on, by name
    #[arg(long, global = true, conflicts_with = "index_id")]
    index: Option<String>,

    /// Index to operate on, by numeric id
    #[arg(long, global = true)]
    index_id: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create config, catalog, document store and the default index
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Index a folder or a list of files
    Index {
        /// One folder, or one or more files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Re-index files that are already indexed
        #[arg(long)]
        reindex: bool,

        /// Owner of the indexed files
        #[arg(long)]
        user: Option<String>,
    },

    /// Delete indexed files by id or name
    Delete {
        /// File ids or file names
        #[arg(required = true)]
        targets: Vec<String>,

        /// Owner of the files
        #[arg(long)]
        user: Option<String>,
    },

    /// List indexed files
    Files {
        /// Only files owned by this user
        #[arg(long)]
        user: Option<String>,

        /// Output only file ids (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,
    },

    /// Query indexed files
    Query {
        /// The search query
        query: String,

        /// File ids (or JSON lists of ids) to search; defaults to every file of the index
        #[arg(long, num_args = 1..)]
        scope: Vec<String>,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Retrieval mode: vector, text or hybrid
        #[arg(long)]
        mode: Option<RetrievalMode>,

        /// Diversify first-round results with MMR
        #[arg(long)]
        mmr: bool,

        /// Owner whose files form the default scope
        #[arg(long)]
        user: Option<String>,
    },

    /// Show catalog counts and vector store status
    Status,

    /// Manage indices
    Indices {
        #[command(subcommand)]
        action: IndicesAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum IndicesAction {
    /// List indices
    List,

    /// Create an index
    Create {
        /// Index name
        name: String,

        /// Accepted file types, e.g. ".pdf, .txt"
        #[arg(long)]
        file_types: Option<String>,
    },

    /// Delete index rows by id (files and stored chunks are kept)
    Delete {
        /// Index ids, space or comma separated
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        ids: Vec<i64>,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docindex", &mut std::io::stdout());
        return Ok(());
    }

    if let Commands::Init { force } = cli.command {
        let (base_dir, config_path) = init_locations(cli.config.as_deref());
        let report = cmd_init(InitOptions {
            base_dir,
            config_path,
            force,
        })
        .await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_init_report(&report);
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let selector = IndexSelector {
        name: cli.index.clone(),
        id: cli.index_id,
    };

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Index {
            paths,
            reindex,
            user,
        } => {
            let stores = StoreHandles::open(&config).await?;
            let progress = if cli.json {
                BatchProgress::hidden()
            } else {
                BatchProgress::new()
            };
            let on_file = |current: usize, total: usize, path: &Path| {
                progress.update(current, total, path)
            };

            let options = IndexOptions {
                paths,
                reindex,
                user,
                index: selector,
            };
            let report = cmd_index(&config, &stores, options, Some(&on_file)).await;
            progress.finish();
            let report = report?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_batch_report(&report);
            }
        }

        Commands::Delete { targets, user } => {
            let stores = StoreHandles::open(&config).await?;
            let report = cmd_delete(&config, &stores, &selector, &targets, user).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_delete_report(&report);
            }
        }

        Commands::Files { user, ids_only } => {
            let stores = StoreHandles::open(&config).await?;
            let files = cmd_list_files(&config, &stores, &selector, user).await?;

            if ids_only {
                for file in &files {
                    println!("{}", file.id);
                }
            } else if cli.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                print_files(&files);
            }
        }

        Commands::Query {
            query,
            scope,
            top_k,
            mode,
            mmr,
            user,
        } => {
            let stores = StoreHandles::open(&config).await?;
            let options = QueryOptions {
                scope,
                top_k,
                mode,
                mmr,
                user,
                index: selector,
            };
            let result = cmd_query(&config, &stores, &query, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_query_results(&result);
            }
        }

        Commands::Status => {
            let catalog = CatalogDb::new(&config.paths.db_file).await?;
            let embedder = create_embedder(&config.embedding)?;
            let vectors = QdrantVectorStore::connect(&config, embedder).await?;
            let status = cmd_status(&config, &catalog, &vectors).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Indices { action } => {
            let catalog = CatalogDb::new(&config.paths.db_file).await?;
            match action {
                IndicesAction::List => {
                    let indices = cmd_list_indices(&catalog).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&indices)?);
                    } else {
                        print_indices(&indices);
                    }
                }
                IndicesAction::Create { name, file_types } => {
                    let index = cmd_create_index(&config, &catalog, &name, file_types).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&index)?);
                    } else {
                        println!("✓ Created index '{}' (id {})", index.name, index.id);
                    }
                }
                IndicesAction::Delete { ids, yes } => {
                    let removed = cmd_delete_indices(&catalog, &ids, yes).await?;
                    if cli.json {
                        println!(r#"{{"deleted": {}}}"#, removed);
                    } else {
                        println!("✓ Deleted {} indices", removed);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Base directory and config path for `init`: a `.toml` path names the
/// config file itself, any other path a directory to create it in
fn init_locations(path: Option<&Path>) -> (PathBuf, PathBuf) {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path.to_path_buf())
        }
        Some(dir) => (dir.to_path_buf(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
