//! In-memory window used to observe what the UI side does

use super::{OverlayWindow, Target};
use crate::geometry::WorkArea;
use crate::state::lock;
use std::sync::{Arc, Mutex};
use tiny_skia::Pixmap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    Present { target: Option<Target> },
    Show { target: Option<Target> },
    Hide,
    Destroy,
}

struct LogInner {
    created: usize,
    events: Vec<WindowEvent>,
    last_frame: Option<Pixmap>,
    work_area: Option<WorkArea>,
    fail_show: bool,
}

/// Shared record of every window created against it
#[derive(Clone)]
pub struct WindowLog {
    inner: Arc<Mutex<LogInner>>,
}

impl WindowLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                created: 0,
                events: Vec::new(),
                last_frame: None,
                work_area: Some(WorkArea::new(0, 0, 1920, 1040)),
                fail_show: false,
            })),
        }
    }

    pub fn created(&self) -> usize {
        lock(&self.inner).created
    }

    pub fn events(&self) -> Vec<WindowEvent> {
        lock(&self.inner).events.clone()
    }

    /// Visibility implied by the last show/hide the window received
    pub fn visible(&self) -> bool {
        lock(&self.inner)
            .events
            .iter()
            .rev()
            .find_map(|event| match event {
                WindowEvent::Show { .. } => Some(true),
                WindowEvent::Hide | WindowEvent::Destroy => Some(false),
                WindowEvent::Present { .. } => None,
            })
            .unwrap_or(false)
    }

    pub fn destroyed(&self) -> usize {
        lock(&self.inner)
            .events
            .iter()
            .filter(|event| **event == WindowEvent::Destroy)
            .count()
    }

    fn push(&self, event: WindowEvent) {
        lock(&self.inner).events.push(event);
    }
}

pub struct RecordingWindow {
    log: WindowLog,
}

impl RecordingWindow {
    pub fn new() -> Self {
        Self::with_log(WindowLog::new())
    }

    pub fn with_log(log: WindowLog) -> Self {
        lock(&log.inner).created += 1;
        Self { log }
    }

    pub fn events(&self) -> Vec<WindowEvent> {
        self.log.events()
    }

    pub fn last_frame(&self) -> Option<Pixmap> {
        lock(&self.log.inner).last_frame.clone()
    }

    pub fn set_work_area(&mut self, area: Option<WorkArea>) {
        lock(&self.log.inner).work_area = area;
    }

    pub fn fail_show(&mut self, fail: bool) {
        lock(&self.log.inner).fail_show = fail;
    }
}

impl OverlayWindow for RecordingWindow {
    fn work_area(&self) -> Option<WorkArea> {
        lock(&self.log.inner).work_area
    }

    fn present(&mut self, frame: &Pixmap, target: Option<Target>) -> anyhow::Result<()> {
        lock(&self.log.inner).last_frame = Some(frame.clone());
        self.log.push(WindowEvent::Present { target });
        Ok(())
    }

    fn show(&mut self, target: Option<Target>) -> anyhow::Result<()> {
        if lock(&self.log.inner).fail_show {
            anyhow::bail!("show refused");
        }
        self.log.push(WindowEvent::Show { target });
        Ok(())
    }

    fn hide(&mut self) {
        self.log.push(WindowEvent::Hide);
    }

    fn destroy(&mut self) {
        self.log.push(WindowEvent::Destroy);
    }
}
