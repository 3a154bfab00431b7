//! Caller-facing overlay controller
//!
//! `StatusOverlay` may be called from any thread. State changes happen under
//! the shared lock and the matching UI actions are queued before the lock is
//! released, so the UI-owning context sees actions in the same order as the
//! state changes that caused them. Rapid updates may be coalesced: a repaint
//! always paints whatever state is current when it runs.

use crate::error::InitError;
use crate::state::{OverlayState, SharedState, lock};
use crate::status::StatusKind;
use crate::ui::{Action, Startup, UiContext};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{debug, error};

struct Lifecycle<C> {
    context: C,
    // A start was handed off and its caller is waiting outside the lock
    starting: bool,
}

pub struct StatusOverlay<C> {
    // Serializes init/cleanup and is held across the teardown join. Never
    // held by show/hide, nor while init waits on another context.
    lifecycle: Mutex<Lifecycle<C>>,
    settled: Condvar,
    state: SharedState,
}

impl<C: UiContext> StatusOverlay<C> {
    pub fn new(context: C) -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle {
                context,
                starting: false,
            }),
            settled: Condvar::new(),
            state: OverlayState::new_shared(),
        }
    }

    /// Bring up the UI context and create the hidden window.
    ///
    /// Idempotent: returns `Ok` without doing anything while initialized. A
    /// call that overlaps an init in progress waits for that one instead of
    /// starting a second window.
    pub fn init(&self) -> Result<(), InitError> {
        let mut life = lock(&self.lifecycle);
        while life.starting {
            life.context.run_pending();
            life = self
                .settled
                .wait(life)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if lock(&self.state).initialized {
            return Ok(());
        }

        let queue = match life.context.start(Arc::clone(&self.state)) {
            Ok(Startup::Ready(queue)) => Ok(queue),
            Ok(Startup::Pending(pending)) => {
                life.starting = true;
                drop(life);

                let result = pending.wait();

                life = lock(&self.lifecycle);
                life.starting = false;
                result
            }
            Err(e) => Err(e),
        };

        let result = queue
            .inspect_err(|e| error!("status overlay init failed: {e}"))
            .map(|queue| {
                let mut state = lock(&self.state);
                state.initialized = true;
                state.visible = false;
                state.queue = Some(queue);
                debug!("status overlay initialized");
            });

        // Still under the lifecycle lock: overlapping callers wake to a
        // settled state
        self.settled.notify_all();
        drop(life);
        result
    }

    /// Update the badge and make sure it is on screen.
    ///
    /// `text` is copied; the caller keeps ownership of its buffer.
    pub fn show(&self, status: StatusKind, text: &str) {
        let mut state = lock(&self.state);
        if !state.initialized {
            return;
        }

        state.status = status;
        state.text.clear();
        state.text.push_str(text);

        state.submit(Action::Repaint);
        if !state.visible {
            state.visible = true;
            state.submit(Action::Show);
        }
    }

    pub fn hide(&self) {
        let mut state = lock(&self.state);
        if !state.initialized || !state.visible {
            return;
        }

        state.visible = false;
        state.submit(Action::Hide);
    }

    /// Destroy the window and wait for the UI context to wind down.
    ///
    /// Safe to call at any time, including without a prior `init`.
    pub fn cleanup(&self) {
        let mut life = lock(&self.lifecycle);
        {
            let mut state = lock(&self.state);
            if !state.initialized {
                return;
            }
            state.submit(Action::Destroy);
            state.reset();
        }

        // State lock released: the UI side may still paint while draining
        life.context.join();
        debug!("status overlay cleaned up");
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    pub fn is_visible(&self) -> bool {
        lock(&self.state).visible
    }

    /// Status and text the next repaint will draw
    pub fn current(&self) -> (StatusKind, String) {
        let state = lock(&self.state);
        (state.status(), state.text().to_string())
    }
}
