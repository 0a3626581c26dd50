//! The generate path: describe, then synthesize, then record.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::choices::{Mode, Mood, Weather};
use crate::history::{CaptionRecord, HistoryStore};
use crate::prompts::PromptSet;
use crate::synth::{compose_user_message, CaptionSynthesizer, SynthesisError};
use crate::upload::UploadedImage;
use crate::vision::VisionDescriber;

/// The user's selector values for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub mode: Mode,
    pub weather: Weather,
    pub mood: Mood,
}

/// How a generation ended, short of a synthesis failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Both calls succeeded; the record is already at the head of history.
    Captioned(CaptionRecord),
    /// The vision call produced nothing; synthesis was never attempted.
    NoDescription,
    /// Synthesis answered with blank text; nothing recorded.
    EmptyCaption,
}

#[derive(Clone)]
pub struct Pipeline {
    describer: Arc<dyn VisionDescriber>,
    synthesizer: Arc<dyn CaptionSynthesizer>,
    prompts: Arc<PromptSet>,
}

impl Pipeline {
    pub fn new(
        describer: Arc<dyn VisionDescriber>,
        synthesizer: Arc<dyn CaptionSynthesizer>,
        prompts: Arc<PromptSet>,
    ) -> Self {
        Self {
            describer,
            synthesizer,
            prompts,
        }
    }

    /// Runs both calls in order. History only changes on full success.
    pub async fn run(
        &self,
        image: &UploadedImage,
        settings: Settings,
        history: &mut HistoryStore,
    ) -> Result<Generation, SynthesisError> {
        let description = match self.describer.describe(image).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "no physical description, skipping synthesis");
                return Ok(Generation::NoDescription);
            }
        };

        let user_message = compose_user_message(&description, settings.weather, settings.mood);
        let system_prompt = self.prompts.template(settings.mode);
        let content = self
            .synthesizer
            .synthesize(system_prompt, &user_message)
            .await?;

        if content.trim().is_empty() {
            warn!(mode = ?settings.mode, "synthesis returned blank text");
            return Ok(Generation::EmptyCaption);
        }

        let record = CaptionRecord {
            mode: settings.mode,
            content,
        };
        history.record(record.clone());
        info!(mode = ?settings.mode, history = history.len(), "caption recorded");

        Ok(Generation::Captioned(record))
    }
}
