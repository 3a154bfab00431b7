//! Runtime knobs for the overlay
//!
//! Visual constants live in [`crate::geometry`] and are fixed; only the
//! plumbing around the UI context is adjustable.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Upper bound on how long `init` waits for the UI context
    pub init_timeout: Duration,
    /// Name of the dedicated UI thread
    pub thread_name: String,
    /// Layer-shell namespace (Wayland)
    pub namespace: String,
    /// Window class name (Win32)
    pub class_name: String,
    /// Load a system font and draw the label text
    pub render_text: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(5),
            thread_name: "status-overlay".to_string(),
            namespace: "status-overlay".to_string(),
            class_name: "StatusOverlayWindow".to_string(),
            render_text: true,
        }
    }
}
