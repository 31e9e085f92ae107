use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use discorgeous::audio::AudioConverter;
use discorgeous::config::ServerConfig;
use discorgeous::playback::{Player, PlaybackError};
use discorgeous::queue::SpeakQueue;
use discorgeous::state::AppState;
use discorgeous::tts::{PiperConfig, PiperEngine, Registry};
use discorgeous::voice::{VoiceManager, VoiceSession, VoiceTiming};
use discorgeous::{logging, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from the environment
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    logging::init(&config.log_level, &config.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "starting discorgeous");

    if config.auth_disabled() {
        warn!("HTTP bearer authentication is disabled (BEARER_TOKEN is empty)");
    }

    info!(
        log_level = %config.log_level,
        log_format = %config.log_format,
        http_port = config.http_port,
        auto_leave_idle = ?config.auto_leave_idle,
        max_text_length = config.max_text_length,
        queue_capacity = config.queue_capacity,
        "configuration loaded"
    );

    // Graceful shutdown: SIGINT/SIGTERM cancel the process token
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // TTS engine registry
    let registry = Arc::new(Registry::new());
    if config.piper_model.is_empty() {
        warn!("no Piper model configured, TTS will not work");
    } else {
        let piper = PiperEngine::new(PiperConfig {
            binary_path: config.piper_path.clone(),
            model_path: config.piper_model.clone(),
            default_voice: config.default_voice.clone(),
        });
        match piper {
            Ok(engine) => match registry.register(Arc::new(engine)) {
                Ok(()) => info!(model = %config.piper_model, "Piper TTS engine registered"),
                Err(err) => warn!(error = %err, "failed to register Piper TTS"),
            },
            Err(err) => warn!(error = %err, "failed to initialize Piper TTS"),
        }
    }

    // Audio converter
    let converter = match AudioConverter::new().await {
        Ok(converter) => Some(Arc::new(converter)),
        Err(err) => {
            warn!(error = %err, "ffmpeg not available, audio conversion will fail");
            None
        }
    };

    // Voice attachment. The platform session library is an external
    // collaborator behind voice::VoiceSession; embedders supply one through
    // the library API. Without it (or without credentials) the server runs
    // with the log-only playback handler below.
    let voice_manager = build_voice_manager(&config, None);
    if let Some(voice) = &voice_manager {
        if let Err(err) = voice.open().await {
            error!(error = %err, "failed to open voice session");
            std::process::exit(1);
        }
        info!("voice session opened");
    }

    // The speech queue and its callbacks
    let queue = Arc::new(SpeakQueue::new(
        config.queue_capacity,
        config.auto_leave_idle,
    ));

    {
        let voice = voice_manager.clone();
        queue.set_idle_callback(Arc::new(move || {
            info!("queue idle, disconnecting from voice channel");
            if let Some(voice) = voice.clone() {
                tokio::spawn(async move {
                    if let Err(err) = voice.disconnect().await {
                        error!(error = %err, "failed to disconnect from voice");
                    }
                });
            }
        }));
    }

    {
        let voice = voice_manager.clone();
        queue.set_shutdown_callback(Arc::new(move || {
            info!("shutdown: disconnecting from voice channel if connected");
            if let Some(voice) = voice.clone() {
                tokio::spawn(async move {
                    if let Err(err) = voice.disconnect().await {
                        error!(error = %err, "failed to disconnect from voice during shutdown");
                    }
                });
            }
        }));
    }

    // Playback handler: the full pipeline when every component is present,
    // otherwise a log-only fallback
    match (voice_manager.clone(), converter.clone()) {
        (Some(voice), Some(converter)) if registry.default_engine().is_ok() => {
            let player = Arc::new(Player::new(registry.clone(), converter, voice));
            queue.set_playback_handler(player.into_handler());
            info!("audio pipeline ready");
        }
        _ => {
            queue.set_playback_handler(Arc::new(|_token, job| {
                Box::pin(async move {
                    info!(
                        job_id = %job.id,
                        text = %job.text,
                        voice = %job.voice,
                        "would play speech (audio pipeline not configured)"
                    );
                    Ok::<(), PlaybackError>(())
                })
            }));
        }
    }

    queue.start();

    // HTTP ingress
    let state = AppState::new(config.clone(), queue.clone());
    let app = routes::create_router(state);

    let address = config.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(addr = %address, "starting HTTP server");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await
        .context("http server error")?;

    // Stop the worker (fires the shutdown callback after it exits), then
    // tear down the platform session
    queue.stop().await;
    if let Some(voice) = voice_manager {
        if let Err(err) = voice.close().await {
            error!(error = %err, "failed to close voice session");
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Build the voice manager when credentials and a platform session are both
/// available.
fn build_voice_manager(
    config: &ServerConfig,
    session: Option<Arc<dyn VoiceSession>>,
) -> Option<Arc<VoiceManager>> {
    if config.discord_token.is_empty()
        || config.guild_id.is_empty()
        || config.default_voice_channel_id.is_empty()
    {
        warn!("Discord credentials not configured, voice will not work");
        return None;
    }

    let Some(session) = session else {
        warn!("no voice platform session supplied, voice will not work");
        return None;
    };

    match VoiceManager::new(
        session,
        config.guild_id.clone(),
        config.default_voice_channel_id.clone(),
        VoiceTiming::default(),
    ) {
        Ok(manager) => Some(Arc::new(manager)),
        Err(err) => {
            error!(error = %err, "failed to create voice manager");
            std::process::exit(1);
        }
    }
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
