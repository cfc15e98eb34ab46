//! Zone sync server - authoritative multiplayer session over WebSocket
//!
//! Hosts one session: players connect on `/ws`, ready up, race the rail
//! ahead of the closing zone and shoot each other with lag-compensated
//! hit-scan. `/health` reports the session state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zone_sync::app::AppState;
use zone_sync::config::{Config, TrackSource};
use zone_sync::game::physics::SphereWorld;
use zone_sync::game::presentation::TracingPresentation;
use zone_sync::game::track::{RailTrack, TrackGeometry};
use zone_sync::game::GameMatch;
use zone_sync::http::build_router;
use zone_sync::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);

    init_server_time();

    info!("Starting zone sync server");
    info!("Server address: {}", config.server_addr);

    let track = load_track(&config.track)?;
    let world = SphereWorld::new(config.session.hitbox_radius);
    let (game, handle) = GameMatch::new(
        config.session.clone(),
        track,
        world,
        Box::new(TracingPresentation::new("server")),
    );

    tokio::spawn(game.run());

    let state = AppState::new(config.clone(), handle);
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Build the rail the session races on
fn load_track(source: &TrackSource) -> anyhow::Result<Option<Arc<dyn TrackGeometry>>> {
    let track = match source {
        TrackSource::File(path) => RailTrack::from_json_file(path)
            .with_context(|| format!("loading rail from {}", path.display()))?,
        TrackSource::Ring { radius, points } => {
            RailTrack::ring(*radius, *points).context("generating ring rail")?
        }
        TrackSource::None => {
            warn!("No track configured, zone elimination disabled");
            return Ok(None);
        }
    };

    info!(
        points = track.points().len(),
        length = track.length(),
        "Track loaded"
    );
    Ok(Some(Arc::new(track)))
}

/// Initialize tracing/logging; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
