use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use visual_deconstructor::{build_app, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("visual_deconstructor=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let app = build_app(&config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!("🚀 Server running on http://{}", config.bind_addr);
    info!(
        vision = %config.qwen_model,
        chat = %config.deepseek_model,
        "📸 Open in your browser to start deconstructing"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
