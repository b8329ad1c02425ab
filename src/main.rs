use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use treestore::blob::FsBlobStore;
use treestore::config::ServerConfig;
use treestore::notify::{BroadcastBus, ContentSync, HttpContentSync, NoopContentSync, Notifier};
use treestore::server::{AppState, create_router};
use treestore::store::{SqliteStore, Store};
use treestore::tree::FileTree;

#[derive(Parser)]
#[command(name = "treestore")]
#[command(about = "Project tree store for a collaborative document editor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file; flags below override its values
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database and blobs
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Base URL of the document content service
        #[arg(long)]
        content_sync_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the data directory and database
    Init {
        /// Data directory for the database and blobs
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Reclaim abandoned uploads and purge expired deleted projects
    Gc {
        /// Data directory for the database and blobs
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Age in seconds after which an unconfirmed upload is reclaimed
        #[arg(long)]
        grace_secs: Option<u64>,

        /// Age in days after which a deleted project is purged
        #[arg(long)]
        retention_days: Option<u64>,
    },
}

fn run_init(data_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)?;

    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    let db_path = config.db_path();
    let existed = db_path.exists();

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    if existed {
        println!("Database already initialized at {}", db_path.display());
    } else {
        println!("Initialized database at {}", db_path.display());
    }
    Ok(())
}

fn open_store(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!("Server not initialized. Run 'treestore admin init' first to create the database.");
    }
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(store)
}

fn build_tree(config: &ServerConfig) -> anyhow::Result<FileTree> {
    let store = open_store(config)?;

    let content: Arc<dyn ContentSync> = match &config.content_sync_url {
        Some(url) => {
            info!("Forwarding tree changes to {}", url);
            Arc::new(HttpContentSync::new(url, config.notification_timeout())?)
        }
        None => Arc::new(NoopContentSync),
    };
    let notifier = Notifier::new(
        Arc::new(BroadcastBus::default()),
        content,
        config.notification_timeout(),
    );

    Ok(FileTree::new(
        Arc::new(store),
        Arc::new(FsBlobStore::new(&config.data_dir)),
        notifier,
    ))
}

async fn run_gc(
    data_dir: PathBuf,
    grace_secs: Option<u64>,
    retention_days: Option<u64>,
) -> anyhow::Result<()> {
    let defaults = ServerConfig::default();
    let config = ServerConfig {
        data_dir,
        pending_file_grace_secs: grace_secs.unwrap_or(defaults.pending_file_grace_secs),
        deleted_project_retention_days: retention_days
            .unwrap_or(defaults.deleted_project_retention_days),
        ..defaults
    };

    let tree = build_tree(&config)?;
    let report = tree
        .collect_garbage(config.pending_file_grace(), config.deleted_project_retention())
        .await?;

    println!(
        "Reclaimed {} pending files, purged {} projects, deleted {} blobs",
        report.pending_files, report.purged_projects, report.blobs_deleted
    );
    Ok(())
}

fn spawn_gc_loop(state: Arc<AppState>, config: &ServerConfig) {
    let Some(interval) = config.gc_interval() else {
        return;
    };
    let grace = config.pending_file_grace();
    let retention = config.deleted_project_retention();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = state.tree.collect_garbage(grace, retention).await {
                tracing::warn!("garbage collection failed: {e}");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("treestore=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => {
                run_init(&data_dir)?;
            }
            AdminCommands::Gc {
                data_dir,
                grace_secs,
                retention_days,
            } => {
                run_gc(data_dir, grace_secs, retention_days).await?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            content_sync_url,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if content_sync_url.is_some() {
                config.content_sync_url = content_sync_url;
            }

            let state = Arc::new(AppState::new(build_tree(&config)?));
            spawn_gc_loop(Arc::clone(&state), &config);

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
