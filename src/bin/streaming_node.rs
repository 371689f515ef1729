use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use syncwatch::{
    config::ConfigStore,
    keyspace::{Keyspace, RedisKeyspace},
    logging::{init_tracing, Logging, TraceLayerExt},
    node::{self, heartbeat, AppState, NodeConfig, SessionRegistry},
    Shutdown,
};

/// Streaming node: terminates viewer WebSockets, fans out host state
/// updates, and proxies the read-only HLS surface.
#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "node.toml")]
    config: PathBuf,

    /// Overrides the configured logging level for this run only.
    #[arg(long)]
    log_level: Option<Logging>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let shutdown = Shutdown::new();

    let config_store = ConfigStore::<NodeConfig>::load(args.config, shutdown.clone()).await;
    let config = config_store.current();
    let logging = args.log_level.unwrap_or(config.logging);
    init_tracing("syncwatch_node", logging);

    let keyspace: Arc<dyn Keyspace> = match RedisKeyspace::connect(&config.keyspace_url).await {
        Ok(keyspace) => Arc::new(keyspace),
        Err(err) => {
            error!("failed to connect to keyspace at {}: {err:?}", config.keyspace_url);
            return;
        }
    };

    let sessions = SessionRegistry::new(keyspace.clone());
    tokio::spawn(sessions.clone().run_idle_sweep(shutdown.clone()));

    let state = AppState::new(
        keyspace,
        sessions,
        config.manifest.to_manifest(),
        config.object_store_base_url.clone(),
        config.node_id.clone(),
        config.capacity,
        config.clock_skew_guard,
        shutdown.clone(),
    );

    tokio::spawn(heartbeat::run(
        state.clone(),
        config.public_url.clone(),
        config.director_url.clone(),
        shutdown.clone(),
    ));

    let app = node::routes()
        .tracing_layer(logging)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind to {addr}: {err}"));

    info!("streaming node {} listening on {addr}", config.node_id);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait_for_signal())
        .await
        .expect("server failed");

    info!("streaming node shut down");
}
