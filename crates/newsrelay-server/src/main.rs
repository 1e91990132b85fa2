//! newsrelay server binary.
//!
//! Starts the bridge, its background tasks and the axum HTTP server with
//! structured logging and graceful shutdown on SIGTERM/SIGINT.

use newsrelay_db::{open_database, DbRuntimeSettings, SqliteEntityStore};
use newsrelay_identity::Secp256k1Signer;
use newsrelay_server::{
    app, background,
    bridge::Bridge,
    config,
    feed_cache::FeedCache,
    feeds::HttpFeedSource,
    host::{ChannelHost, RelayHost, DEFAULT_CHANNEL_CAPACITY},
    http::build_http_client,
    metadata_cache::MetadataCache,
    AppState,
};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("NEWSRELAY_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    config.validate().expect("invalid configuration");

    // Initialize database
    let pool = open_database(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to open database, check database.path in config");

    // Build the bridge
    let http = build_http_client(config.bridge.fetch_timeout());
    let capacity = NonZeroUsize::new(config.bridge.feed_cache_capacity)
        .expect("feed cache capacity is validated as non-zero");
    let feeds = FeedCache::new(
        Arc::new(HttpFeedSource::new(http.clone())),
        capacity,
        config.bridge.feed_cache_ttl(),
    );
    let bridge = Arc::new(Bridge::new(
        config.bridge.secret.as_bytes(),
        http.clone(),
        feeds,
        Arc::new(SqliteEntityStore::new(pool)),
        Arc::new(Secp256k1Signer),
    ));

    // Background tasks
    let (host, rx) = ChannelHost::new(DEFAULT_CHANNEL_CAPACITY);
    let host: Arc<dyn RelayHost> = Arc::new(host);

    tokio::spawn(background::seed_feeds(
        Arc::clone(&bridge),
        config.feeds.clone(),
    ));
    tokio::spawn(background::start_poll_task(
        Arc::clone(&bridge),
        host,
        config.bridge.poll_interval(),
    ));
    tokio::spawn(background::drain_events(rx));

    // Build application
    let state = AppState {
        bridge,
        metadata_cache: MetadataCache::new(config.bridge.metadata_ttl()),
        http,
        og_prefix: config.server.og_prefix.clone(),
    };
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting newsrelay server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("newsrelay server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
