//! Visual deconstructor: upload an image, get a cold physical description
//! from a vision model, then turn it into stylized captions with a chat
//! model, keeping a per-session history.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;

pub mod choices;
pub mod config;
pub mod history;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod synth;
pub mod upload;
pub mod vision;
pub mod web;

use config::Config;
use pipeline::Pipeline;
use prompts::PromptSet;
use session::SessionRegistry;
use synth::ChatSynthesizer;
use vision::QwenVision;
use web::AppState;

/// Wires the configured endpoints, prompts and session registry into the
/// router.
pub fn build_app(config: &Config) -> Result<Router> {
    let prompts = PromptSet::load(config.prompt_dir.as_deref()).context("loading prompts")?;
    let client = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;

    let describer = QwenVision::new(
        client.clone(),
        &config.qwen_base_url,
        &config.qwen_key,
        &config.qwen_model,
        prompts.vision.clone(),
    );
    let synthesizer = ChatSynthesizer::new(
        client,
        &config.deepseek_base_url,
        &config.deepseek_key,
        &config.deepseek_model,
    );

    let pipeline = Pipeline::new(Arc::new(describer), Arc::new(synthesizer), Arc::new(prompts));
    let state = AppState::new(
        pipeline,
        SessionRegistry::new(config.session_idle),
        config.max_upload_bytes,
    );

    Ok(web::router(Arc::new(state)))
}
