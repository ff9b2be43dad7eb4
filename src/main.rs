//! Switchboard - multi-agent chat backend
//!
//! Routes user questions to a supervisor graph that delegates to specialist
//! responders, streams progress and the answer back, and keeps per-user
//! conversation history.

mod api;
mod config;
mod db;
mod images;
mod supervisor;
mod turn;

use api::{create_router, AppState, TokenSigner};
use config::{Catalog, CheckpointBackend, ServerConfig};
use db::Database;
use images::{DiskImageStore, ImageStore};
use std::net::SocketAddr;
use std::sync::Arc;
use supervisor::{CheckpointStore, HttpSupervisor, MemoryCheckpointStore};
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turn::TurnServices;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = ServerConfig::from_env()?;
    let catalog = Catalog::load(config.catalog_path.as_deref())?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let checkpoints: Arc<dyn CheckpointStore> = match config.checkpoints {
        CheckpointBackend::Sqlite => Arc::new(db.clone()),
        CheckpointBackend::Memory => {
            tracing::warn!("Checkpoints kept in memory; conversation state is lost on restart");
            Arc::new(MemoryCheckpointStore::new())
        }
    };

    let image_store = DiskImageStore::new(&config.upload_dir)?;
    let image_dir = image_store.dir().to_path_buf();
    let images: Arc<dyn ImageStore> = Arc::new(image_store);

    tracing::info!(
        url = %config.supervisor_url,
        assistant = %config.assistant_id,
        responders = catalog.responders.responders.len(),
        "Supervisor configured"
    );
    let source = HttpSupervisor::new(
        &config.supervisor_url,
        &config.assistant_id,
        Arc::clone(&checkpoints),
    )?;

    let turns = Arc::new(TurnServices {
        source: Arc::new(source),
        images,
        store: Arc::new(db.clone()),
        checkpoints,
        responders: catalog.responders,
        notices: catalog.notices,
    });

    // Create application state
    let state = AppState::new(
        db,
        turns,
        TokenSigner::new(&config.app_secret, &config.login_key),
    );

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Live turn output is plain text and must reach the client unbuffered
    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true)
        .compress_when(DefaultPredicate::new().and(NotForContentType::const_new("text/plain")));

    let app = create_router(state)
        .nest_service("/images", ServeDir::new(image_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Switchboard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
