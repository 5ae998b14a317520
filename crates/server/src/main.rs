mod api;
mod config;
mod range;
mod state;
mod utils;

use std::sync::Arc;

use assets::AssetManager;
use axum::Router;
use catalog::Catalog;
use parking_lot::RwLock;
use storage::{FileStore, FolderTreeStore, LocalFileStore, MemoryFolderApi};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use api::api_router;
use config::{config_path_from_env, load_or_create_config, resolve_path, StorageBackend};
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let catalog_path = resolve_path(&config_path, &config.catalog_path);
    if let Some(parent) = catalog_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let catalog = Catalog::open(&catalog_path)?;
    let stats = catalog.stats()?;
    info!(
        "Catalog {:?}: {} songs, {} collections, {} files",
        catalog_path, stats.songs, stats.collections, stats.files
    );

    let store: Arc<dyn FileStore> = match config.storage_backend {
        StorageBackend::Local => {
            let root = resolve_path(&config_path, &config.uploads_dir);
            info!("Storing uploads under {:?}", root);
            Arc::new(LocalFileStore::new(root)?)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory folder storage; uploads are lost on exit.");
            Arc::new(FolderTreeStore::new(MemoryFolderApi::new()))
        }
    };

    let assets = AssetManager::new(catalog, store, config.asset_options());
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        assets: Arc::new(assets),
        config: Arc::new(RwLock::new(config)),
    };

    let app = Router::new()
        .nest("/api", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
