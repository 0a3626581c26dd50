//! Per-browser session state: the current upload and the caption history.
//!
//! Each session sits behind its own async mutex, held for a whole user
//! action, so actions of one session run one at a time. The registry lock is
//! only held to look a session up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::history::HistoryStore;
use crate::upload::UploadedImage;

#[derive(Debug, Default)]
pub struct Session {
    pub image: Option<UploadedImage>,
    pub history: HistoryStore,
}

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

struct Slot {
    session: SessionHandle,
    last_seen: Instant,
}

pub struct SessionRegistry {
    slots: Mutex<HashMap<Uuid, Slot>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Returns the live session for `id`, or a fresh one under a new id when
    /// `id` is missing, unknown or expired. The flag is true for fresh ones.
    pub fn resolve(&self, id: Option<Uuid>) -> (Uuid, SessionHandle, bool) {
        let now = Instant::now();
        let mut slots = self.lock();
        let ttl = self.idle_ttl;
        slots.retain(|_, slot| now.duration_since(slot.last_seen) < ttl);

        if let Some(id) = id {
            if let Some(slot) = slots.get_mut(&id) {
                slot.last_seen = now;
                return (id, slot.session.clone(), false);
            }
        }

        let id = Uuid::new_v4();
        let session = SessionHandle::default();
        slots.insert(
            id,
            Slot {
                session: session.clone(),
                last_seen: now,
            },
        );
        debug!(%id, live = slots.len(), "session started");
        (id, session, true)
    }

    /// Drops a session. Its image and history go with it.
    pub fn end(&self, id: Uuid) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(%id, "session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Slot>> {
        // Slots hold no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
