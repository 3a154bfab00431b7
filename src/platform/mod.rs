//! Backend selection
//!
//! Each supported platform runs the overlay on a dedicated UI thread. Other
//! targets still build, but `init` reports [`InitError::Unsupported`].

#[cfg(target_os = "linux")]
mod wayland;
#[cfg(windows)]
mod win32;

use crate::config::OverlayConfig;
use crate::error::InitError;
use crate::state::SharedState;
use crate::ui::{Startup, UiContext};

#[cfg(target_os = "linux")]
pub use wayland::Wayland;
#[cfg(windows)]
pub use win32::Win32;

#[cfg(target_os = "linux")]
pub type PlatformContext = crate::ui::thread::DedicatedThread<Wayland>;

#[cfg(windows)]
pub type PlatformContext = crate::ui::thread::DedicatedThread<Win32>;

#[cfg(not(any(target_os = "linux", windows)))]
pub type PlatformContext = Unsupported;

/// UI context for the platform this crate was built for
#[cfg(target_os = "linux")]
pub fn context(config: OverlayConfig) -> PlatformContext {
    PlatformContext::new(Wayland, config)
}

#[cfg(windows)]
pub fn context(config: OverlayConfig) -> PlatformContext {
    PlatformContext::new(Win32, config)
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn context(_config: OverlayConfig) -> PlatformContext {
    Unsupported
}

/// Context for targets without a windowing backend
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl UiContext for Unsupported {
    fn start(&mut self, _state: SharedState) -> Result<Startup, InitError> {
        Err(InitError::Unsupported)
    }

    fn join(&mut self) {}
}
