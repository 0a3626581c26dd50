//! The three user-selectable enumerations: caption mode, weather and mood.
//!
//! Variants travel over the wire by their English name (`"Blogger"`,
//! `"Rain"`); the Chinese label is what the UI shows and what goes into the
//! prompt text.

use serde::{Deserialize, Serialize};

/// Which style template drives the caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Master,
    Blogger,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Master, Mode::Blogger];

    pub fn label(self) -> &'static str {
        match self {
            Mode::Master => "大师滤镜",
            Mode::Blogger => "顶级博主",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Rain,
    Overcast,
    Snow,
    Dusk,
}

impl Weather {
    pub const ALL: [Weather; 5] = [
        Weather::Clear,
        Weather::Rain,
        Weather::Overcast,
        Weather::Snow,
        Weather::Dusk,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Weather::Clear => "晴",
            Weather::Rain => "雨",
            Weather::Overcast => "阴",
            Weather::Snow => "雪",
            Weather::Dusk => "黄昏",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Relaxed,
    Weary,
    Detached,
    Aloof,
}

impl Mood {
    pub const ALL: [Mood; 4] = [Mood::Relaxed, Mood::Weary, Mood::Detached, Mood::Aloof];

    pub fn label(self) -> &'static str {
        match self {
            Mood::Relaxed => "松弛",
            Mood::Weary => "倦怠",
            Mood::Detached => "游离",
            Mood::Aloof => "傲慢",
        }
    }
}

/// One entry of a selector as the page renders it.
#[derive(Debug, Clone, Serialize)]
pub struct Choice<T> {
    pub value: T,
    pub label: &'static str,
}

/// Every selector's options, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct Options {
    pub modes: Vec<Choice<Mode>>,
    pub weathers: Vec<Choice<Weather>>,
    pub moods: Vec<Choice<Mood>>,
}

impl Options {
    pub fn all() -> Self {
        Self {
            modes: Mode::ALL
                .iter()
                .map(|&value| Choice { value, label: value.label() })
                .collect(),
            weathers: Weather::ALL
                .iter()
                .map(|&value| Choice { value, label: value.label() })
                .collect(),
            moods: Mood::ALL
                .iter()
                .map(|&value| Choice { value, label: value.label() })
                .collect(),
        }
    }
}
