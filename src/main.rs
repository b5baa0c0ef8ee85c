use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_session::{
    create_router, AlwaysGranted, AppState, Config, NatsRecognizerFactory, RecognizerFactory,
    SessionCallbacks, SessionConfig, VoiceRecognition,
};

#[derive(Parser)]
#[command(name = "voice-session", version, about = "Speech recognition session controller")]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/voice-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API
    Serve,

    /// Run one session against the NATS recognizer until Ctrl-C
    Listen {
        /// Keep listening across utterances
        #[arg(long)]
        continuous: bool,

        /// Recognition locale (overrides config)
        #[arg(long)]
        locale: Option<String>,

        /// Silence timeout in milliseconds (overrides config)
        #[arg(long)]
        max_silence_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Voice Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(&cfg).await,
        Command::Listen {
            continuous,
            locale,
            max_silence_ms,
        } => {
            let mut session = SessionConfig::from(&cfg.session);
            session.continuous |= continuous;
            if let Some(locale) = locale {
                session.locale = locale;
            }
            if let Some(ms) = max_silence_ms {
                session.max_silence_duration = Duration::from_millis(ms);
            }
            listen(&cfg, session).await
        }
    }
}

async fn serve(cfg: &Config) -> Result<()> {
    let state = AppState::new(
        Arc::new(NatsRecognizerFactory::new(cfg.nats.url.clone())),
        Arc::new(AlwaysGranted),
        SessionConfig::from(&cfg.session),
    );
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down HTTP server");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn listen(cfg: &Config, session: SessionConfig) -> Result<()> {
    let factory = NatsRecognizerFactory::new(cfg.nats.url.clone());
    let recognizer = factory.create(&session.session_id).await?;

    let callbacks = SessionCallbacks::new()
        .on_start(|| info!("Listening..."))
        .on_partial_result(|text| info!("[PARTIAL] {}", text))
        .on_result(|text| info!("[FINAL] {}", text))
        .on_error(|message| warn!("Error: {}", message))
        .on_stop(|| info!("Stopped"));

    let voice = VoiceRecognition::with_callbacks(
        session,
        recognizer,
        Arc::new(AlwaysGranted),
        callbacks,
    )?;
    voice.start().await?;

    info!("Session {} running, press Ctrl-C to stop", voice.session_id());

    let mut updates = voice.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stop requested");
                if let Err(e) = voice.stop().await {
                    warn!("Stop failed: {}", e);
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if !snapshot.state.is_active() {
                    info!("Session ended ({})", snapshot.state.description());
                    break;
                }
            }
        }
    }

    let stats = voice.stats();
    info!(
        "Transcript ({} utterances, {} restarts, {}ms): {}",
        stats.utterance_count,
        stats.restart_count,
        stats.duration_ms,
        voice.transcript()
    );

    Ok(())
}
