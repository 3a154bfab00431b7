//! Shared overlay state
//!
//! One `OverlayState` exists per controller. The caller-facing side mutates
//! it; the UI-owning context only reads the status and text while painting.
//! Every access goes through the same mutex and critical sections stay short.

use crate::status::StatusKind;
use crate::ui::{Action, ActionSink};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

pub type SharedState = Arc<Mutex<OverlayState>>;

/// Lock, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct OverlayState {
    pub(crate) status: StatusKind,
    pub(crate) text: String,
    pub(crate) visible: bool,
    pub(crate) initialized: bool,
    pub(crate) queue: Option<Box<dyn ActionSink>>,
}

/// What the paint routine needs, copied out of the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub status: StatusKind,
    pub text: String,
}

impl OverlayState {
    pub fn new_shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn status(&self) -> StatusKind {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn content(&self) -> Content {
        Content {
            status: self.status,
            text: self.text.clone(),
        }
    }

    /// Queue an action for the UI-owning context.
    ///
    /// Called with the lock held so queue order matches the order of state
    /// changes across racing callers.
    pub(crate) fn submit(&self, action: Action) -> bool {
        let Some(queue) = &self.queue else {
            return false;
        };

        let sent = queue.submit(action);
        if !sent {
            warn!(?action, "UI context is gone; dropping action");
        }
        sent
    }

    /// Forget everything from the current session
    pub(crate) fn reset(&mut self) {
        self.status = StatusKind::default();
        self.text = String::new();
        self.visible = false;
        self.initialized = false;
        self.queue = None;
    }
}
