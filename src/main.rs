use log::{error, info};
use oauth2_sandbox::kv::Kv;
use oauth2_sandbox::{config, create_app, AppState};
use std::net::SocketAddr;
use std::path::Path;

const SERVER_CONFIG_PATH: &str = "server.json";
const POLICY_PATHS: [&str; 2] = ["policy.json", "policy.csv"];

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let app_config = match config::AppConfig::load(SERVER_CONFIG_PATH) {
        Ok(app_config) => app_config,
        Err(err) => {
            error!("Configuration error: {err}");
            std::process::exit(1);
        }
    };

    let policies = match config::policy::load_policies(policy_path()) {
        Ok(policies) => policies,
        Err(err) => {
            error!("Rate policy error: {err}");
            std::process::exit(1);
        }
    };

    let redis_url = config::redis_url();
    info!("Redis server: {redis_url}");
    let kv = match Kv::connect(&redis_url).await {
        Ok(kv) => kv,
        Err(err) => {
            error!("Failed to connect to Redis: {err}");
            std::process::exit(1);
        }
    };

    let state = match AppState::new(app_config, kv, policies) {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize application state: {err}");
            std::process::exit(1);
        }
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config::listen_port()));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind to {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!("OAuth 2.0 server has started on {addr}, press Ctrl+C to stop");
    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;
    if let Err(err) = serve {
        error!("Server error: {err}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

fn policy_path() -> &'static str {
    POLICY_PATHS
        .iter()
        .find(|path| Path::new(path).exists())
        .copied()
        .unwrap_or(POLICY_PATHS[0])
}

// Simple signal handler that works on all platforms
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
