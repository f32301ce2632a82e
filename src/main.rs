use anyhow::{Context, Result};
use clap::Parser;
use media_catalog::{
    auth::AdminToken,
    config::{self, Args, Command},
    publish,
    routes::routes::AppState,
    services::{
        catalog::SqliteCatalogStore, gateway::GatewayService, object_store::S3ObjectStore,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = Args::parse();
    if let Some(Command::Publish(publish_args)) = args.command.take() {
        let record = publish::run(publish_args).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args(&args)?;
    tracing::info!("Starting media-catalog with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    if !db_url.contains(":memory:") {
        let db_path = db_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL `{}`", db_url))?
        .create_if_missing(true);
    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    let catalog = SqliteCatalogStore::new(db.clone());
    catalog.migrate().await?;

    // --- Handle migration mode ---
    if args.migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let store = S3ObjectStore::new(&cfg.s3).await?;
    let state = AppState {
        gateway: GatewayService::new(Arc::new(store), cfg.gateway.clone()),
        catalog: Arc::new(catalog),
        admin: AdminToken::new(cfg.admin_token.expose()),
    };

    // --- Build router ---
    let app = media_catalog::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
