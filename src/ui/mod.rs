//! UI-owning execution context
//!
//! Windowing work must happen on exactly one thread or event loop. The
//! controller never touches a window; it queues [`Action`]s through an
//! [`ActionSink`] handed out by a [`UiContext`]. On the UI side a [`Driver`]
//! interprets those actions against a platform [`OverlayWindow`].
//!
//! Two context strategies exist:
//! - [`thread::DedicatedThread`]: a background thread runs its own message loop
//! - [`embedded::Embedded`]: actions are scheduled onto a loop the host drives

pub mod embedded;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::OverlayConfig;
use crate::error::InitError;
use crate::font::Font;
use crate::geometry::{Placement, WorkArea, position};
use crate::render;
use crate::state::{SharedState, lock};
use std::ops::ControlFlow;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

/// Deferred work for the UI-owning context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Paint the current status/text into the window
    Repaint,
    /// Position the window and make it visible without taking focus
    Show,
    /// Make the window invisible, keeping it for later shows
    Hide,
    /// Release the window and stop the context
    Destroy,
}

/// Submit-and-forget queue into the UI-owning context
pub trait ActionSink: Send {
    /// Returns false if the context can no longer receive actions
    fn submit(&self, action: Action) -> bool;
}

/// Strategy for owning the UI context
pub trait UiContext: Send {
    /// Begin bringing the context up and creating the overlay window
    /// (hidden).
    ///
    /// Runs inline and returns [`Startup::Ready`] when the caller already
    /// owns the context. Otherwise it only hands the work off; the bounded
    /// wait happens in [`PendingStart::wait`], outside the controller's
    /// lifecycle lock.
    fn start(&mut self, state: SharedState) -> Result<Startup, InitError>;

    /// Run a hand-off that is waiting on the calling thread, if any.
    ///
    /// Called when `init` finds another start in flight, so the thread that
    /// owns the context makes progress instead of waiting on itself.
    fn run_pending(&mut self) {}

    /// Wait until a context torn down by `Action::Destroy` has fully exited
    fn join(&mut self);
}

type Waiter = Box<dyn FnOnce() -> Result<Box<dyn ActionSink>, InitError> + Send>;

/// Outcome of [`UiContext::start`]
pub enum Startup {
    Ready(Box<dyn ActionSink>),
    Pending(PendingStart),
}

/// Start handed to another context; `wait` blocks until it reports in
pub struct PendingStart {
    waiter: Waiter,
}

impl PendingStart {
    pub fn new<F>(waiter: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn ActionSink>, InitError> + Send + 'static,
    {
        Self {
            waiter: Box::new(waiter),
        }
    }

    pub fn wait(self) -> Result<Box<dyn ActionSink>, InitError> {
        (self.waiter)()
    }
}

/// Where the badge goes, and the work area it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub area: WorkArea,
    pub placement: Placement,
}

impl Target {
    pub fn for_area(area: WorkArea) -> Self {
        Self {
            area,
            placement: position(&area),
        }
    }
}

/// Platform surface driven from the UI-owning context
pub trait OverlayWindow {
    /// Current work area of the primary display, if the platform knows it
    fn work_area(&self) -> Option<WorkArea>;

    /// Replace the window contents. `target` is set while the badge is
    /// visible so the backend can follow monitor changes.
    fn present(&mut self, frame: &Pixmap, target: Option<Target>) -> anyhow::Result<()>;

    /// Move to `target` and become visible without activating
    fn show(&mut self, target: Option<Target>) -> anyhow::Result<()>;

    fn hide(&mut self);

    /// Release the window and its graphics resources
    fn destroy(&mut self);
}

impl<W: OverlayWindow + ?Sized> OverlayWindow for Box<W> {
    fn work_area(&self) -> Option<WorkArea> {
        (**self).work_area()
    }

    fn present(&mut self, frame: &Pixmap, target: Option<Target>) -> anyhow::Result<()> {
        (**self).present(frame, target)
    }

    fn show(&mut self, target: Option<Target>) -> anyhow::Result<()> {
        (**self).show(target)
    }

    fn hide(&mut self) {
        (**self).hide()
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }
}

enum FontSlot {
    Unloaded,
    Loaded(Option<Font>),
}

/// Applies queued actions to a window. Lives on the UI-owning context.
pub struct Driver {
    state: SharedState,
    font: FontSlot,
    shown: bool,
    // Last placement derived from a real work area
    last_target: Option<Target>,
}

impl Driver {
    pub fn new(state: SharedState, config: &OverlayConfig) -> Self {
        let font = if config.render_text {
            FontSlot::Unloaded
        } else {
            FontSlot::Loaded(None)
        };

        Self {
            state,
            font,
            shown: false,
            last_target: None,
        }
    }

    /// Whether the last show/hide applied left the window visible
    #[cfg(test)]
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    fn font(&mut self) -> Option<&Font> {
        if let FontSlot::Unloaded = self.font {
            // Font discovery scans the system; do it once, on first paint
            self.font = FontSlot::Loaded(Font::system_default());
        }

        match &self.font {
            FontSlot::Loaded(font) => font.as_ref(),
            FontSlot::Unloaded => None,
        }
    }

    /// Placement from the current work area. Falls back to the last known
    /// placement only when the platform cannot report one right now.
    fn target<W: OverlayWindow + ?Sized>(&mut self, window: &W) -> Option<Target> {
        match window.work_area().map(Target::for_area) {
            Some(target) => {
                self.last_target = Some(target);
                Some(target)
            }
            None => {
                if self.last_target.is_some() {
                    debug!("work area unavailable; keeping the previous placement");
                }
                self.last_target
            }
        }
    }

    /// Run one action. `Break` means the window is gone and the context
    /// should stop.
    pub fn apply<W: OverlayWindow + ?Sized>(
        &mut self,
        window: &mut W,
        action: Action,
    ) -> ControlFlow<()> {
        debug!(?action, "applying overlay action");

        match action {
            Action::Repaint => {
                let content = lock(&self.state).content();
                let target = if self.shown { self.target(window) } else { None };

                let Some(frame) = render::paint(content.status, &content.text, self.font()) else {
                    warn!("failed to allocate badge frame; skipping repaint");
                    return ControlFlow::Continue(());
                };

                if let Err(e) = window.present(&frame, target) {
                    warn!("failed to present badge frame: {e:#}");
                }
            }
            Action::Show => {
                let target = self.target(window);
                match window.show(target) {
                    Ok(()) => self.shown = true,
                    Err(e) => warn!("failed to show badge: {e:#}"),
                }
            }
            Action::Hide => {
                window.hide();
                self.shown = false;
            }
            Action::Destroy => {
                window.destroy();
                self.shown = false;
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}

enum Readiness<T> {
    Pending,
    Ready(T),
    Failed(String),
    Abandoned,
}

/// One-shot readiness signal from the UI-owning context to a blocked `init`
pub(crate) struct Handshake<T> {
    slot: Mutex<Readiness<T>>,
    signal: Condvar,
}

impl<T> Handshake<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Readiness::Pending),
            signal: Condvar::new(),
        }
    }

    /// Publish the outcome of window creation. Returns false if the waiter
    /// already gave up, in which case the caller must tear down what it built.
    pub(crate) fn complete(&self, result: Result<T, String>) -> bool {
        let mut slot = lock(&self.slot);
        if let Readiness::Abandoned = *slot {
            return false;
        }

        *slot = match result {
            Ok(value) => Readiness::Ready(value),
            Err(message) => Readiness::Failed(message),
        };
        self.signal.notify_all();
        true
    }

    /// Block until the context reports in or `timeout` elapses
    pub(crate) fn wait(&self, timeout: Duration) -> Result<T, InitError> {
        let slot = lock(&self.slot);
        let (mut slot, _) = self
            .signal
            .wait_timeout_while(slot, timeout, |r| matches!(r, Readiness::Pending))
            .unwrap_or_else(PoisonError::into_inner);

        match std::mem::replace(&mut *slot, Readiness::Abandoned) {
            Readiness::Ready(value) => Ok(value),
            Readiness::Failed(message) => Err(InitError::Window(message)),
            Readiness::Pending => Err(InitError::Timeout(timeout)),
            Readiness::Abandoned => Err(InitError::Disconnected),
        }
    }
}
