//! Prompt resources.
//!
//! The vision instruction and the two style templates ship as files under
//! `prompts/` and are compiled in. A prompt directory given at startup may
//! override any of them: `vision.md`, `master.md`, `blogger.md`. Missing
//! files fall back to the compiled-in text.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::choices::Mode;

const VISION_INSTRUCTION: &str = include_str!("../prompts/vision.md");
const MASTER_FILTER: &str = include_str!("../prompts/master.md");
const BLOGGER_FILTER: &str = include_str!("../prompts/blogger.md");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("prompt {0} is empty")]
    Empty(PathBuf),
}

/// Process-wide prompt texts, immutable after startup.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub vision: String,
    pub master: String,
    pub blogger: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            vision: VISION_INSTRUCTION.to_string(),
            master: MASTER_FILTER.to_string(),
            blogger: BLOGGER_FILTER.to_string(),
        }
    }
}

impl PromptSet {
    /// Compiled-in prompts, overridden by whatever `dir` provides.
    pub fn load(dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut set = Self::default();
        let Some(dir) = dir else {
            return Ok(set);
        };

        for (file, slot) in [
            ("vision.md", &mut set.vision),
            ("master.md", &mut set.master),
            ("blogger.md", &mut set.blogger),
        ] {
            let path = dir.join(file);
            match std::fs::read_to_string(&path) {
                Ok(text) if text.trim().is_empty() => return Err(PromptError::Empty(path)),
                Ok(text) => {
                    info!(path = %path.display(), "using prompt override");
                    *slot = text;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(PromptError::Read { path, source }),
            }
        }

        Ok(set)
    }

    /// The system prompt for a caption mode.
    pub fn template(&self, mode: Mode) -> &str {
        match mode {
            Mode::Master => &self.master,
            Mode::Blogger => &self.blogger,
        }
    }
}
