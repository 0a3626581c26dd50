use serde::Serialize;

use crate::choices::Mode;

/// One successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionRecord {
    pub mode: Mode,
    pub content: String,
}

/// Session-scoped captions, most recent first. Unbounded, never persisted.
#[derive(Debug, Default)]
pub struct HistoryStore {
    records: Vec<CaptionRecord>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: CaptionRecord) {
        self.records.insert(0, entry);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn all(&self) -> &[CaptionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
