//! C interface
//!
//! One process-wide overlay backs these functions. Every entry point is safe
//! to call from any thread and never unwinds into the caller. See
//! `include/status_overlay.h` for the matching declarations.

use crate::config::OverlayConfig;
use crate::controller::StatusOverlay;
use crate::platform::{self, PlatformContext};
use crate::status::StatusKind;
use std::any::Any;
use std::ffi::{CStr, c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;
use tracing::{error, warn};

static OVERLAY: LazyLock<StatusOverlay<PlatformContext>> =
    LazyLock::new(|| StatusOverlay::new(platform::context(OverlayConfig::default())));

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f`, turning a panic into `fallback`
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            error!(call = name, "panic in status overlay: {}", panic_message(&*payload));
            fallback
        }
    }
}

/// Copy a caller-owned C string. Null reads as empty; invalid UTF-8 is
/// replaced rather than rejected.
///
/// # Safety
///
/// `text` must be null or point to a NUL-terminated string valid for reads.
unsafe fn text_arg(text: *const c_char) -> String {
    if text.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
}

fn status_arg(status: c_int) -> Option<StatusKind> {
    match StatusKind::try_from(status) {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("ignoring show request: {e}");
            None
        }
    }
}

/// Create the overlay window (hidden). Returns 0 on success, non-zero on
/// failure. Calling it again while initialized returns 0.
#[unsafe(no_mangle)]
pub extern "C" fn status_overlay_init() -> c_int {
    guarded("init", -1, || match OVERLAY.init() {
        Ok(()) => 0,
        Err(e) => e.code(),
    })
}

/// Show the badge with `status` (0..=3) and `text`. No effect before init.
///
/// # Safety
///
/// `text` must be null or a NUL-terminated string valid for the duration of
/// the call. The string is copied; the caller keeps ownership.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn status_overlay_show(status: c_int, text: *const c_char) {
    // Copy before anything else so the caller's buffer is not touched later
    let text = guarded("show", None, || Some(unsafe { text_arg(text) }));
    let Some(text) = text else {
        return;
    };

    guarded("show", (), || {
        if let Some(status) = status_arg(status) {
            OVERLAY.show(status, &text);
        }
    });
}

/// Hide the badge. No effect before init or while hidden.
#[unsafe(no_mangle)]
pub extern "C" fn status_overlay_hide() {
    guarded("hide", (), || OVERLAY.hide());
}

/// Destroy the window and stop the UI context. Safe to call at any time.
#[unsafe(no_mangle)]
pub extern "C" fn status_overlay_cleanup() {
    guarded("cleanup", (), || OVERLAY.cleanup());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_null_text_is_empty() {
        assert_eq!(unsafe { text_arg(std::ptr::null()) }, "");
    }

    #[test]
    fn test_text_is_copied() {
        let text = CString::new("Transcribing…").unwrap();
        assert_eq!(unsafe { text_arg(text.as_ptr()) }, "Transcribing…");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let text = CString::new(vec![b'o', b'k', 0xff]).unwrap();
        assert_eq!(unsafe { text_arg(text.as_ptr()) }, "ok\u{fffd}");
    }

    #[test]
    fn test_status_range() {
        assert_eq!(status_arg(0), Some(StatusKind::Recording));
        assert_eq!(status_arg(3), Some(StatusKind::Error));
        assert_eq!(status_arg(4), None);
        assert_eq!(status_arg(-1), None);
    }

    #[test]
    fn test_guarded_catches_panics() {
        let value = guarded("test", 7, || -> i32 { panic!("boom") });
        assert_eq!(value, 7);
    }

    #[test]
    fn test_calls_before_init_are_ignored() {
        // Never initialized in this process: all of these are no-ops
        unsafe { status_overlay_show(1, std::ptr::null()) };
        status_overlay_hide();
        status_overlay_cleanup();
        assert!(!OVERLAY.is_initialized());
    }
}
