//! rollcall-sync service entry point

use anyhow::Context;
use rollcall_common::config::{resolve_root_folder, EngineConfig, RootFolder};
use std::sync::Arc;

use rollcall_sync::affect::HttpAffectClassifier;
use rollcall_sync::detector::HttpFaceDetector;
use rollcall_sync::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_sync=info,rollcall_common=info".into()),
        )
        .init();

    let cli_root = std::env::args().nth(1);
    let root_path = resolve_root_folder(cli_root.as_deref(), "ROLLCALL_ROOT");
    let root = RootFolder::new(root_path);
    root.ensure_directories()
        .context("Failed to create root folder layout")?;
    tracing::info!("Root folder: {}", root.path().display());

    let config = EngineConfig::load(root.path()).context("Failed to load configuration")?;

    let db = rollcall_common::db::init_database_pool(&root.database_path())
        .await
        .context("Failed to initialize database")?;

    let detector = Arc::new(
        HttpFaceDetector::new(config.detector_url.clone())
            .context("Failed to create face detector client")?,
    );
    let classifier = Arc::new(
        HttpAffectClassifier::new(config.classifier_url.clone(), config.classifier_timeout_ms)
            .context("Failed to create affect classifier client")?,
    );

    let bind_address = config.bind_address.clone();
    let state = AppState::new(db, config, root, detector, classifier);

    let identities = state.index.reload(&state.db).await?;
    tracing::info!(identities, "Identity index preloaded");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!("rollcall-sync listening on {bind_address}");

    axum::serve(listener, app).await?;
    Ok(())
}
