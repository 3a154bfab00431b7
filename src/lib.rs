//! Click-through status badge overlay
//!
//! A small pill at the bottom center of the screen that reports what a
//! dictation pipeline is doing: recording, transcribing, completed or error.
//! The badge never takes focus or input, stays above other windows and is
//! safe to drive from any thread.
//!
//! Rust hosts use [`StatusOverlay`] directly; C hosts link the library and
//! call the `status_overlay_*` functions declared in
//! `include/status_overlay.h`.

pub mod config;
pub mod controller;
pub mod error;
pub mod ffi;
pub mod font;
pub mod geometry;
pub mod platform;
pub mod render;
pub mod state;
pub mod status;
pub mod ui;

pub use config::OverlayConfig;
pub use controller::StatusOverlay;
pub use error::InitError;
pub use geometry::{Placement, WorkArea, position};
pub use platform::PlatformContext;
pub use status::{Rgb, StatusKind, UnknownStatus};

/// Overlay running on this platform's dedicated UI thread
pub fn platform_overlay(config: OverlayConfig) -> StatusOverlay<PlatformContext> {
    StatusOverlay::new(platform::context(config))
}
