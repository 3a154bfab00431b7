//! Dedicated-thread UI context
//!
//! A background thread opens the platform window, reports readiness through a
//! [`Handshake`], then runs the platform message loop until a
//! [`Action::Destroy`](super::Action::Destroy) stops it.

use super::{ActionSink, Handshake, PendingStart, Startup, UiContext};
use crate::config::OverlayConfig;
use crate::error::InitError;
use crate::state::{SharedState, lock};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Windowing backend that runs on the dedicated thread
pub trait Platform: Send + Sync + 'static {
    type Sink: ActionSink + 'static;
    type Loop: MessageLoop;

    /// Create the hidden overlay window. Runs on the dedicated thread.
    fn open(
        &self,
        config: &OverlayConfig,
        state: SharedState,
    ) -> anyhow::Result<(Self::Sink, Self::Loop)>;
}

/// Blocking message loop; dropping it must release the window
pub trait MessageLoop {
    /// Service actions and platform messages until the window is destroyed
    fn run(self);
}

pub struct DedicatedThread<P> {
    platform: Arc<P>,
    config: OverlayConfig,
    // Filled once the thread reports ready; taken by `join`
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<P: Platform> DedicatedThread<P> {
    pub fn new(platform: P, config: OverlayConfig) -> Self {
        Self {
            platform: Arc::new(platform),
            config,
            handle: Arc::new(Mutex::new(None)),
        }
    }
}

impl<P: Platform> UiContext for DedicatedThread<P> {
    fn start(&mut self, state: SharedState) -> Result<Startup, InitError> {
        // A previous session that was never joined must not linger
        self.join();

        let handshake = Arc::new(Handshake::<P::Sink>::new());
        let platform = Arc::clone(&self.platform);
        let config = self.config.clone();
        let ready = Arc::clone(&handshake);

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                debug!("UI thread started");
                match platform.open(&config, state) {
                    Ok((sink, message_loop)) => {
                        if ready.complete(Ok(sink)) {
                            message_loop.run();
                        } else {
                            warn!("init gave up before the window was ready; closing it");
                        }
                    }
                    Err(e) => {
                        error!("failed to open overlay window: {e:#}");
                        ready.complete(Err(format!("{e:#}")));
                    }
                }
                debug!("UI thread exiting");
            })?;

        let slot = Arc::clone(&self.handle);
        let timeout = self.config.init_timeout;

        Ok(Startup::Pending(PendingStart::new(move || {
            match handshake.wait(timeout) {
                Ok(sink) => {
                    *lock(&slot) = Some(handle);
                    Ok(Box::new(sink) as Box<dyn ActionSink>)
                }
                Err(InitError::Timeout(_)) if handle.is_finished() => {
                    // Thread died without reporting (panic inside the backend)
                    let _ = handle.join();
                    Err(InitError::Disconnected)
                }
                Err(e @ InitError::Timeout(_)) => {
                    warn!("UI thread is unresponsive; detaching it");
                    Err(e)
                }
                Err(e) => {
                    let _ = handle.join();
                    Err(e)
                }
            }
        })))
    }

    fn join(&mut self) {
        let Some(handle) = lock(&self.handle).take() else {
            return;
        };

        if handle.join().is_err() {
            warn!("UI thread panicked during teardown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StatusOverlay;
    use crate::status::StatusKind;
    use crate::ui::Driver;
    use crate::ui::testing::{RecordingWindow, WindowEvent, WindowLog};
    use crate::ui::Action;
    use std::sync::mpsc::{Receiver, Sender, channel};
    use std::time::Duration;

    struct ChannelSink(Mutex<Sender<Action>>);

    impl ActionSink for ChannelSink {
        fn submit(&self, action: Action) -> bool {
            crate::state::lock(&self.0).send(action).is_ok()
        }
    }

    struct ChannelLoop {
        actions: Receiver<Action>,
        driver: Driver,
        window: RecordingWindow,
    }

    impl MessageLoop for ChannelLoop {
        fn run(mut self) {
            while let Ok(action) = self.actions.recv() {
                if self.driver.apply(&mut self.window, action).is_break() {
                    break;
                }
            }
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Normal,
        Fail,
        Stall(Duration),
    }

    struct FakePlatform {
        log: WindowLog,
        behaviour: Behaviour,
    }

    impl Platform for FakePlatform {
        type Sink = ChannelSink;
        type Loop = ChannelLoop;

        fn open(
            &self,
            config: &OverlayConfig,
            state: SharedState,
        ) -> anyhow::Result<(Self::Sink, Self::Loop)> {
            match self.behaviour {
                Behaviour::Normal => {}
                Behaviour::Fail => anyhow::bail!("no display"),
                Behaviour::Stall(delay) => thread::sleep(delay),
            }

            let (tx, rx) = channel();
            let window = RecordingWindow::with_log(self.log.clone());
            Ok((
                ChannelSink(Mutex::new(tx)),
                ChannelLoop {
                    actions: rx,
                    driver: Driver::new(state, config),
                    window,
                },
            ))
        }
    }

    fn overlay(behaviour: Behaviour) -> (StatusOverlay<DedicatedThread<FakePlatform>>, WindowLog) {
        let log = WindowLog::new();
        let config = OverlayConfig {
            init_timeout: Duration::from_millis(500),
            render_text: false,
            ..Default::default()
        };
        let platform = FakePlatform {
            log: log.clone(),
            behaviour,
        };
        (StatusOverlay::new(DedicatedThread::new(platform, config)), log)
    }

    #[test]
    fn test_init_creates_one_window() {
        let (overlay, log) = overlay(Behaviour::Normal);
        overlay.init().unwrap();
        overlay.init().unwrap();
        assert_eq!(log.created(), 1);
        overlay.cleanup();
        assert_eq!(log.destroyed(), 1);
    }

    #[test]
    fn test_show_hide_drained_on_cleanup() {
        let (overlay, log) = overlay(Behaviour::Normal);
        overlay.init().unwrap();

        overlay.show(StatusKind::Recording, "Recording...");
        overlay.show(StatusKind::Transcribing, "Transcribing...");
        overlay.hide();
        overlay.show(StatusKind::Completed, "Done");
        overlay.cleanup();

        let events = log.events();
        let shows = events
            .iter()
            .filter(|e| matches!(e, WindowEvent::Show { .. }))
            .count();
        assert_eq!(shows, 2);
        assert!(matches!(events[events.len() - 2], WindowEvent::Show { .. }));
        assert_eq!(events.last(), Some(&WindowEvent::Destroy));
    }

    #[test]
    fn test_reinit_after_cleanup_spawns_fresh_window() {
        let (overlay, log) = overlay(Behaviour::Normal);
        overlay.init().unwrap();
        overlay.cleanup();
        overlay.init().unwrap();
        assert!(overlay.is_initialized());
        assert_eq!(log.created(), 2);
        overlay.cleanup();
        assert_eq!(log.destroyed(), 2);
    }

    #[test]
    fn test_open_failure_reports_window_error() {
        let (overlay, log) = overlay(Behaviour::Fail);
        let err = overlay.init().unwrap_err();
        assert!(matches!(err, InitError::Window(_)));
        assert!(!overlay.is_initialized());
        assert_eq!(log.created(), 0);

        // Everything after a failed init is a no-op
        overlay.show(StatusKind::Error, "ignored");
        overlay.hide();
        overlay.cleanup();
    }

    #[test]
    fn test_stalled_thread_times_out() {
        let (overlay, log) = overlay(Behaviour::Stall(Duration::from_secs(2)));
        let err = overlay.init().unwrap_err();
        assert!(matches!(err, InitError::Timeout(_)));
        assert!(!overlay.is_initialized());
        // The late window is never handed out
        overlay.show(StatusKind::Recording, "ignored");
        assert!(log.events().is_empty());
    }
}
