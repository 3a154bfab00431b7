//! Embedded UI context: the host already drives the UI event loop
//!
//! Actions become zero-argument tasks handed to a [`Scheduler`] that runs
//! them on the host's loop. The window lives in a thread-local slot on that
//! loop's thread, so only one embedded overlay may exist per UI thread.

use super::{
    Action, ActionSink, Driver, Handshake, OverlayWindow, PendingStart, Startup, UiContext,
};
use crate::config::OverlayConfig;
use crate::error::InitError;
use crate::state::{SharedState, lock};
use anyhow::anyhow;
use calloop::LoopHandle;
use calloop::channel::{self, Event, Sender};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Creates the platform window; always called on the UI thread
pub type WindowFactory = dyn Fn() -> anyhow::Result<Box<dyn OverlayWindow>> + Send + Sync;

/// "Run this when the loop is next idle"
pub trait Scheduler: Send + Sync + 'static {
    /// True when called from the thread that runs scheduled tasks
    fn is_owner(&self) -> bool;

    /// Queue `task`; returns false if the loop no longer accepts work
    fn schedule(&self, task: Task) -> bool;
}

struct Session {
    generation: u64,
    driver: Driver,
    window: Box<dyn OverlayWindow>,
}

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
}

// Tags each init so actions queued by an earlier session never reach a
// later window
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn open_session(
    generation: u64,
    factory: &WindowFactory,
    state: SharedState,
    config: &OverlayConfig,
) -> anyhow::Result<()> {
    let window = factory()?;
    let session = Session {
        generation,
        driver: Driver::new(state, config),
        window,
    };

    SESSION.with(|slot| {
        if let Some(mut stale) = slot.borrow_mut().replace(session) {
            // Its queued destroy is now stale and will be dropped
            debug!(
                generation = stale.generation,
                "closing previous embedded overlay window"
            );
            stale.window.destroy();
        }
    });
    debug!(generation, "embedded overlay window created");
    Ok(())
}

fn close_session(generation: u64) {
    SESSION.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            if let Some(mut session) = slot.take() {
                session.window.destroy();
            }
        }
    });
}

fn run_action(generation: u64, action: Action) {
    SESSION.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(session) = slot.as_mut().filter(|s| s.generation == generation) else {
            debug!(?action, generation, "overlay session is gone; ignoring");
            return;
        };

        if session.driver.apply(&mut session.window, action).is_break() {
            *slot = None;
        }
    });
}

pub struct Embedded<S> {
    scheduler: Arc<S>,
    factory: Arc<WindowFactory>,
    config: OverlayConfig,
    // Window creation handed to the loop but not yet run
    pending: Arc<Mutex<Option<Task>>>,
}

impl<S: Scheduler> Embedded<S> {
    pub fn new<F>(scheduler: S, factory: F, config: OverlayConfig) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn OverlayWindow>> + Send + Sync + 'static,
    {
        Self {
            scheduler: Arc::new(scheduler),
            factory: Arc::new(factory),
            config,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn sink(&self, generation: u64) -> Box<dyn ActionSink> {
        Box::new(ScheduledSink {
            scheduler: Arc::clone(&self.scheduler),
            generation,
        })
    }
}

fn take_and_run(pending: &Mutex<Option<Task>>) {
    let task = lock(pending).take();
    if let Some(task) = task {
        task();
    }
}

struct ScheduledSink<S> {
    scheduler: Arc<S>,
    generation: u64,
}

impl<S: Scheduler> ActionSink for ScheduledSink<S> {
    fn submit(&self, action: Action) -> bool {
        let generation = self.generation;
        self.scheduler
            .schedule(Box::new(move || run_action(generation, action)))
    }
}

impl<S: Scheduler> UiContext for Embedded<S> {
    fn start(&mut self, state: SharedState) -> Result<Startup, InitError> {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        // A hand-off that timed out must never run after a newer start
        lock(&self.pending).take();

        if self.scheduler.is_owner() {
            open_session(generation, &*self.factory, state, &self.config)
                .map_err(|e| InitError::Window(format!("{e:#}")))?;
            return Ok(Startup::Ready(self.sink(generation)));
        }

        let handshake = Arc::new(Handshake::<()>::new());
        let ready = Arc::clone(&handshake);
        let factory = Arc::clone(&self.factory);
        let config = self.config.clone();

        let open: Task = Box::new(move || {
            let result =
                open_session(generation, &*factory, state, &config).map_err(|e| format!("{e:#}"));
            let opened = result.is_ok();
            if !ready.complete(result) && opened {
                warn!("init gave up before the window was ready; closing it");
                close_session(generation);
            }
        });
        *lock(&self.pending) = Some(open);

        let pending = Arc::clone(&self.pending);
        if !self.scheduler.schedule(Box::new(move || take_and_run(&pending))) {
            lock(&self.pending).take();
            return Err(InitError::Disconnected);
        }

        let sink = self.sink(generation);
        let timeout = self.config.init_timeout;
        let pending = Arc::clone(&self.pending);
        Ok(Startup::Pending(PendingStart::new(move || {
            if let Err(e) = handshake.wait(timeout) {
                lock(&pending).take();
                return Err(e);
            }
            Ok(sink)
        })))
    }

    fn run_pending(&mut self) {
        if self.scheduler.is_owner() {
            take_and_run(&self.pending);
        }
    }

    fn join(&mut self) {
        // No thread of our own; the host loop applies the queued destroy
    }
}

/// Scheduler backed by a calloop event loop the host dispatches
pub struct LoopScheduler {
    sender: Mutex<Sender<Task>>,
    owner: ThreadId,
}

impl LoopScheduler {
    /// Register a task channel on `handle`. Must be called on the thread
    /// that dispatches the loop.
    pub fn insert<D>(handle: &LoopHandle<'_, D>) -> anyhow::Result<Self> {
        let (sender, tasks) = channel::channel::<Task>();
        handle
            .insert_source(tasks, |event, _, _| {
                if let Event::Msg(task) = event {
                    task();
                }
            })
            .map_err(|e| anyhow!("failed to register overlay task source: {}", e.error))?;

        Ok(Self {
            sender: Mutex::new(sender),
            owner: thread::current().id(),
        })
    }
}

impl Scheduler for LoopScheduler {
    fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn schedule(&self, task: Task) -> bool {
        lock(&self.sender).send(task).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StatusOverlay;
    use crate::status::StatusKind;
    use crate::ui::testing::{RecordingWindow, WindowEvent, WindowLog};
    use calloop::EventLoop;
    use std::time::{Duration, Instant};

    fn config() -> OverlayConfig {
        OverlayConfig {
            init_timeout: Duration::from_secs(2),
            render_text: false,
            ..Default::default()
        }
    }

    fn overlay(
        event_loop: &EventLoop<'static, ()>,
    ) -> (StatusOverlay<Embedded<LoopScheduler>>, WindowLog) {
        let log = WindowLog::new();
        let scheduler = LoopScheduler::insert(&event_loop.handle()).unwrap();
        let factory_log = log.clone();
        let factory = move || {
            Ok(Box::new(RecordingWindow::with_log(factory_log.clone())) as Box<dyn OverlayWindow>)
        };
        (StatusOverlay::new(Embedded::new(scheduler, factory, config())), log)
    }

    fn drain(event_loop: &mut EventLoop<'static, ()>) {
        event_loop.dispatch(Duration::ZERO, &mut ()).unwrap();
    }

    #[test]
    fn test_init_on_owner_thread_runs_inline() {
        let event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);

        overlay.init().unwrap();
        assert_eq!(log.created(), 1);
        overlay.init().unwrap();
        assert_eq!(log.created(), 1);
    }

    #[test]
    fn test_actions_run_when_loop_dispatches() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        overlay.init().unwrap();

        overlay.show(StatusKind::Recording, "Recording");
        assert!(log.events().is_empty());

        drain(&mut event_loop);
        let events = log.events();
        assert!(matches!(events[0], WindowEvent::Present { target: None }));
        assert!(matches!(events[1], WindowEvent::Show { target: Some(_) }));
        assert!(log.visible());
    }

    #[test]
    fn test_last_intent_wins_after_drain() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        overlay.init().unwrap();

        overlay.show(StatusKind::Recording, "a");
        overlay.hide();
        overlay.show(StatusKind::Transcribing, "b");
        overlay.hide();
        drain(&mut event_loop);
        assert!(!log.visible());
        assert_eq!(log.visible(), overlay.is_visible());

        overlay.show(StatusKind::Completed, "c");
        drain(&mut event_loop);
        assert!(log.visible());
        assert_eq!(log.visible(), overlay.is_visible());
    }

    #[test]
    fn test_cleanup_destroys_on_next_dispatch() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        overlay.init().unwrap();
        overlay.show(StatusKind::Recording, "Recording");

        overlay.cleanup();
        drain(&mut event_loop);
        assert_eq!(log.destroyed(), 1);

        overlay.init().unwrap();
        assert_eq!(log.created(), 2);
    }

    #[test]
    fn test_reinit_before_dispatch_gets_fresh_window() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        overlay.init().unwrap();
        overlay.show(StatusKind::Recording, "Recording");
        overlay.cleanup();

        // The old session's actions are still queued when the new one opens
        overlay.init().unwrap();
        overlay.show(StatusKind::Completed, "Done");
        drain(&mut event_loop);
        drain(&mut event_loop);

        assert_eq!(log.created(), 2);
        assert_eq!(log.destroyed(), 1);
        assert!(matches!(log.events().last(), Some(WindowEvent::Show { .. })));
        assert!(log.visible());
        assert_eq!(log.visible(), overlay.is_visible());

        overlay.hide();
        drain(&mut event_loop);
        assert!(!log.visible());
        assert_eq!(log.visible(), overlay.is_visible());
    }

    #[test]
    fn test_owner_cleanup_does_not_wait_on_foreign_init() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        let overlay = Arc::new(overlay);

        let caller = {
            let overlay = Arc::clone(&overlay);
            thread::spawn(move || overlay.init())
        };
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        overlay.cleanup();
        assert!(started.elapsed() < Duration::from_millis(500));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !caller.is_finished() && Instant::now() < deadline {
            event_loop
                .dispatch(Duration::from_millis(10), &mut ())
                .unwrap();
        }
        assert!(caller.join().unwrap().is_ok());
        assert!(overlay.is_initialized());
        assert_eq!(log.created(), 1);
    }

    #[test]
    fn test_owner_init_completes_foreign_init() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        let overlay = Arc::new(overlay);

        let caller = {
            let overlay = Arc::clone(&overlay);
            thread::spawn(move || overlay.init())
        };
        thread::sleep(Duration::from_millis(100));

        // Never dispatches: the owner opens the window itself
        let started = Instant::now();
        overlay.init().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(caller.join().unwrap().is_ok());
        assert_eq!(log.created(), 1);

        overlay.show(StatusKind::Transcribing, "Transcribing");
        drain(&mut event_loop);
        assert!(log.visible());
    }

    #[test]
    fn test_init_from_other_thread_waits_for_loop() {
        let mut event_loop = EventLoop::try_new().unwrap();
        let (overlay, log) = overlay(&event_loop);
        let overlay = Arc::new(overlay);

        let caller = {
            let overlay = Arc::clone(&overlay);
            thread::spawn(move || overlay.init())
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !caller.is_finished() && Instant::now() < deadline {
            event_loop
                .dispatch(Duration::from_millis(10), &mut ())
                .unwrap();
        }

        assert!(caller.join().unwrap().is_ok());
        assert_eq!(log.created(), 1);
        assert!(overlay.is_initialized());
    }

    #[test]
    fn test_init_times_out_when_loop_is_idle() {
        let event_loop: EventLoop<'static, ()> = EventLoop::try_new().unwrap();
        let log = WindowLog::new();
        let scheduler = LoopScheduler::insert(&event_loop.handle()).unwrap();
        let factory_log = log.clone();
        let factory = move || {
            Ok(Box::new(RecordingWindow::with_log(factory_log.clone())) as Box<dyn OverlayWindow>)
        };
        let config = OverlayConfig {
            init_timeout: Duration::from_millis(50),
            ..config()
        };
        let overlay = Arc::new(StatusOverlay::new(Embedded::new(scheduler, factory, config)));

        let caller = {
            let overlay = Arc::clone(&overlay);
            thread::spawn(move || overlay.init())
        };
        let result = caller.join().unwrap();

        assert!(matches!(result, Err(InitError::Timeout(_))));
        assert!(!overlay.is_initialized());
        assert_eq!(log.created(), 0);
    }
}
