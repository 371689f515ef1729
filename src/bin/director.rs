use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use syncwatch::{
    config::ConfigStore,
    director::{registry::NodeRegistry, routes, AppState, DirectorConfig},
    keyspace::{Keyspace, RedisKeyspace},
    logging::{init_tracing, Logging, TraceLayerExt},
    Shutdown,
};

/// Session director: issues sessions, validates joins, and tracks the
/// streaming-node fleet.
#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "director.toml")]
    config: PathBuf,

    /// Overrides the configured logging level for this run only.
    #[arg(long)]
    log_level: Option<Logging>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let shutdown = Shutdown::new();

    let config_store = ConfigStore::<DirectorConfig>::load(args.config, shutdown.clone()).await;
    let config = config_store.current();
    let logging = args.log_level.unwrap_or(config.logging);
    init_tracing("syncwatch_director", logging);

    let keyspace: Arc<dyn Keyspace> = match RedisKeyspace::connect(&config.keyspace_url).await {
        Ok(keyspace) => Arc::new(keyspace),
        Err(err) => {
            error!("failed to connect to keyspace at {}: {err:?}", config.keyspace_url);
            return;
        }
    };

    let registry = NodeRegistry::new();
    tokio::spawn(registry.clone().run_expiry_sweep(shutdown.clone()));

    let state = AppState::new(keyspace, registry);
    let app = routes::routes()
        .tracing_layer(logging)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind to {addr}: {err}"));

    info!("director listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait_for_signal())
        .await
        .expect("server failed");

    info!("director shut down");
}
