use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use model_core::{HostedDescriber, HostedStoryGenerator, InferenceConfig, ModelRegistry};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tts_core::HostedSynthesizer;

use server::config::{speech_config, ServerConfig};
use server::{build_router, AppState, SpeechStatus, StoryPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting image-to-story server...");

    let inference = InferenceConfig::from_env().context("Invalid inference configuration")?;
    let config = ServerConfig::from_env().fit_to_inference(&inference);

    let client = reqwest::Client::builder()
        .user_agent(concat!("image-to-story/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    info!(
        caption = %inference.caption_model,
        story = %inference.story_model,
        "Loading models..."
    );
    let registry = Arc::new(ModelRegistry::new(client.clone(), inference.clone()));
    registry
        .warm_up()
        .await
        .context("Failed to load models")?;

    let speech = speech_config(&inference, config.speech_lenient);
    if config.speech_lenient {
        warn!("SPEECH_LENIENT is set: speech responses are written without validation");
    }
    let speech_status = SpeechStatus::from(&speech);

    let pipeline = StoryPipeline::new(
        Arc::new(HostedDescriber::new(registry.clone())),
        Arc::new(HostedStoryGenerator::new(registry.clone())),
        Arc::new(HostedSynthesizer::new(client, speech)),
    );

    let state = AppState::new(pipeline, registry, speech_status, config.clone());
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, max_upload={} bytes",
        config.port, config.rate_limit_per_minute, config.max_upload_bytes
    );

    let app = build_router(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
