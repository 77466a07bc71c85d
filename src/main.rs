use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use snapvault::blob::FsBlobStore;
use snapvault::cli::{ApiClient, PushOptions, init_store, run_init, run_push};
use snapvault::config::ServerConfig;
use snapvault::server::{AppState, create_router};

#[derive(Parser)]
#[command(name = "snapvault")]
#[command(about = "A content-addressed snapshot store for project files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database and blob store
    Init {
        /// Data directory for the database and blobs
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
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
    },

    /// Upload a directory as one new snapshot
    Push {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// Project id
        #[arg(long)]
        project: String,

        /// User id recorded as the snapshot author
        #[arg(long)]
        user: String,

        /// Branch to point at the new snapshot
        #[arg(long, short)]
        branch: Option<String>,

        /// Snapshot title
        #[arg(long, short)]
        title: Option<String>,

        /// Snapshot description
        #[arg(long, short)]
        message: Option<String>,

        /// Directory to upload
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let store = init_store(&config)?;
    let blobs = FsBlobStore::new(&config.blob_dir());
    let addr = config.socket_addr()?;

    info!("Data directory: {}", config.data_dir.display());

    let state = Arc::new(AppState::new(Arc::new(store), Arc::new(blobs), config));
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("snapvault=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => {
            let config = run_init(&data_dir)?;
            println!("Initialized data directory at {}", config.data_dir.display());
            println!("  database: {}", config.db_path().display());
            println!("  blobs:    {}", config.blob_dir().display());
        }
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            let mut server_config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(data_dir) = data_dir {
                server_config.data_dir = data_dir;
            }

            serve(server_config).await?;
        }
        Commands::Push {
            server,
            project,
            user,
            branch,
            title,
            message,
            dir,
        } => {
            let client = ApiClient::new(&server)?;
            let opts = PushOptions {
                project_id: project,
                user_id: user,
                branch,
                title,
                message,
            };
            run_push(&client, &dir, &opts).await?;
        }
    }

    Ok(())
}
