use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use discorgeous::logging;
use discorgeous::relay::{RelayClient, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from the environment
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    logging::init(&config.log_level, &config.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "starting ntfy-relay");

    if config.bearer_token.is_empty() {
        warn!("DISCORGEOUS_BEARER_TOKEN is not set, requests may fail if the announcer requires auth");
    }

    info!(
        ntfy_server = %config.ntfy_server,
        ntfy_topics = ?config.ntfy_topics,
        api_url = %config.api_url,
        prefix = %config.prefix,
        interrupt = config.interrupt,
        dedupe_window = ?config.dedupe_window,
        max_text_length = config.max_text_length,
        "configuration loaded"
    );

    // Graceful shutdown: SIGINT/SIGTERM cancel the process token
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let client = match RelayClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(error = %err, "failed to create relay client");
            std::process::exit(1);
        }
    };

    info!("starting relay client");
    client.run(shutdown).await;

    info!("shutdown complete");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to install interrupt handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    error!(error = %err, "failed to install terminate handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received shutdown signal"),
            _ = terminate => info!("received terminate signal"),
        }

        token.cancel();
    });
}
