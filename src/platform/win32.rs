//! Win32 layered-window integration

use crate::config::OverlayConfig;
use crate::geometry::{BADGE_HEIGHT, BADGE_WIDTH, WINDOW_ALPHA, WorkArea};
use crate::render;
use crate::state::SharedState;
use crate::ui::thread::{MessageLoop, Platform};
use crate::ui::{Action, ActionSink, Driver, OverlayWindow, Target};
use anyhow::{Context, Result, anyhow};
use std::ffi::c_void;
use std::ptr;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use tiny_skia::Pixmap;
use tracing::{debug, error, warn};
use windows::Win32::Foundation::{
    COLORREF, HANDLE, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, SIZE, WPARAM,
};
use windows::Win32::Graphics::Gdi::{
    AC_SRC_ALPHA, AC_SRC_OVER, BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BLENDFUNCTION,
    CreateCompatibleDC, CreateDIBSection, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, HBITMAP,
    HDC, HGDIOBJ, ReleaseDC, SelectObject,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, HMENU,
    HWND_TOPMOST, MA_NOACTIVATE, MSG, PM_NOREMOVE, PeekMessageW, PostThreadMessageW,
    RegisterClassW, SPI_GETWORKAREA, SW_HIDE, SW_SHOWNOACTIVATE, SWP_NOACTIVATE, SWP_NOMOVE,
    SWP_NOSIZE, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, SetWindowPos, ShowWindow,
    SystemParametersInfoW, TranslateMessage, ULW_ALPHA, UnregisterClassW, UpdateLayeredWindow,
    WM_APP, WM_MOUSEACTIVATE, WNDCLASSW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
    WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP,
};
use windows::core::PCWSTR;

/// Wakes the message loop; the action itself travels over the channel
const WM_OVERLAY_ACTION: u32 = WM_APP + 1;

/// Layered popup window on its own message loop
pub struct Win32;

pub struct Win32Sink {
    sender: Sender<Action>,
    thread_id: u32,
}

impl ActionSink for Win32Sink {
    fn submit(&self, action: Action) -> bool {
        if self.sender.send(action).is_err() {
            return false;
        }

        unsafe {
            PostThreadMessageW(self.thread_id, WM_OVERLAY_ACTION, WPARAM(0), LPARAM(0)).is_ok()
        }
    }
}

pub struct Win32Loop {
    window: LayeredWindow,
    driver: Driver,
    actions: Receiver<Action>,
}

impl Platform for Win32 {
    type Sink = Win32Sink;
    type Loop = Win32Loop;

    fn open(&self, config: &OverlayConfig, state: SharedState) -> Result<(Win32Sink, Win32Loop)> {
        // Make sure this thread has a message queue before anyone posts to it
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        }
        let thread_id = unsafe { GetCurrentThreadId() };

        let window = LayeredWindow::create(&config.class_name)?;
        debug!(thread_id, "layered window created");

        let (sender, actions) = channel();
        Ok((
            Win32Sink { sender, thread_id },
            Win32Loop {
                window,
                driver: Driver::new(state, config),
                actions,
            },
        ))
    }
}

impl Win32Loop {
    /// Apply everything queued so far. Returns false once the window is gone.
    fn drain(&mut self) -> bool {
        loop {
            match self.actions.try_recv() {
                Ok(action) => {
                    if self.driver.apply(&mut self.window, action).is_break() {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    debug!("action channel closed");
                    return false;
                }
            }
        }
    }
}

impl MessageLoop for Win32Loop {
    fn run(mut self) {
        let mut msg = MSG::default();
        loop {
            let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            if r.0 == -1 {
                error!("GetMessageW failed: {}", windows::core::Error::from_win32());
                break;
            }
            if r.0 == 0 {
                break;
            }

            // Thread messages have no window to dispatch to
            if msg.message == WM_OVERLAY_ACTION && msg.hwnd.0.is_null() {
                if !self.drain() {
                    break;
                }
                continue;
            }

            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

unsafe extern "system" fn wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_MOUSEACTIVATE {
        return LRESULT(MA_NOACTIVATE as isize);
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

fn widestring(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Popup window plus the DIB section that holds its pixels
struct LayeredWindow {
    hwnd: Option<HWND>,
    hinstance: HINSTANCE,
    class_name: Vec<u16>,
    mem_dc: HDC,
    dib: HBITMAP,
    old_bitmap: HGDIOBJ,
    bits: *mut u8,
    // None until a work area has been seen; never guess (0, 0)
    origin: Option<POINT>,
}

impl LayeredWindow {
    fn create(class_name: &str) -> Result<Self> {
        let class_name = widestring(class_name);
        let hinstance: HINSTANCE = unsafe { GetModuleHandleW(None) }
            .context("GetModuleHandleW failed")?
            .into();

        let wc = WNDCLASSW {
            lpfnWndProc: Some(wndproc),
            hInstance: hinstance,
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        // Zero means the class exists already, which CreateWindowExW tolerates
        if unsafe { RegisterClassW(&wc) } == 0 {
            debug!("RegisterClassW: {}", windows::core::Error::from_win32());
        }

        let hwnd = unsafe {
            CreateWindowExW(
                WS_EX_LAYERED
                    | WS_EX_TRANSPARENT
                    | WS_EX_TOPMOST
                    | WS_EX_TOOLWINDOW
                    | WS_EX_NOACTIVATE,
                wc.lpszClassName,
                PCWSTR::null(),
                WS_POPUP,
                0,
                0,
                BADGE_WIDTH as i32,
                BADGE_HEIGHT as i32,
                None,
                HMENU::default(),
                hinstance,
                None,
            )
        }
        .context("CreateWindowExW failed")?;

        let mem_dc = unsafe { CreateCompatibleDC(HDC::default()) };
        if mem_dc.0.is_null() {
            unsafe {
                let _ = DestroyWindow(hwnd);
                let _ = UnregisterClassW(wc.lpszClassName, hinstance);
            }
            return Err(anyhow!("CreateCompatibleDC failed"));
        }

        let mut bmi = BITMAPINFO::default();
        bmi.bmiHeader = BITMAPINFOHEADER {
            biSize: size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: BADGE_WIDTH as i32,
            biHeight: -(BADGE_HEIGHT as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        };

        let mut bits: *mut c_void = ptr::null_mut();
        let dib = unsafe {
            CreateDIBSection(mem_dc, &bmi, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
        };
        let dib = match dib {
            Ok(dib) if !bits.is_null() => dib,
            result => {
                unsafe {
                    if let Ok(dib) = result {
                        let _ = DeleteObject(dib);
                    }
                    let _ = DeleteDC(mem_dc);
                    let _ = DestroyWindow(hwnd);
                    let _ = UnregisterClassW(wc.lpszClassName, hinstance);
                }
                return Err(anyhow!("CreateDIBSection failed"));
            }
        };
        let old_bitmap = unsafe { SelectObject(mem_dc, dib) };

        Ok(Self {
            hwnd: Some(hwnd),
            hinstance,
            class_name,
            mem_dc,
            dib,
            old_bitmap,
            bits: bits as *mut u8,
            origin: None,
        })
    }

    fn pixels(&mut self) -> &mut [u8] {
        let len = (BADGE_WIDTH * BADGE_HEIGHT * 4) as usize;
        // The DIB section stays selected and alive for as long as self does
        unsafe { std::slice::from_raw_parts_mut(self.bits, len) }
    }

    fn move_to(&mut self, target: Option<Target>) {
        if let Some(target) = target {
            self.origin = Some(POINT {
                x: target.placement.x,
                y: target.placement.y,
            });
        }
    }

    /// Push the DIB contents and position to the compositor
    fn update(&self) -> Result<()> {
        let Some(hwnd) = self.hwnd else {
            return Ok(());
        };

        let size = SIZE {
            cx: BADGE_WIDTH as i32,
            cy: BADGE_HEIGHT as i32,
        };
        let src = POINT { x: 0, y: 0 };
        let blend = BLENDFUNCTION {
            BlendOp: AC_SRC_OVER as u8,
            BlendFlags: 0,
            SourceConstantAlpha: WINDOW_ALPHA,
            AlphaFormat: AC_SRC_ALPHA as u8,
        };

        unsafe {
            let screen = GetDC(None);
            let result = UpdateLayeredWindow(
                hwnd,
                screen,
                self.origin.as_ref().map(|p| p as *const POINT),
                Some(&size),
                self.mem_dc,
                Some(&src),
                COLORREF(0),
                Some(&blend),
                ULW_ALPHA,
            );
            ReleaseDC(None, screen);
            result.context("UpdateLayeredWindow failed")
        }
    }
}

impl OverlayWindow for LayeredWindow {
    fn work_area(&self) -> Option<WorkArea> {
        let mut rect = RECT::default();
        let result = unsafe {
            SystemParametersInfoW(
                SPI_GETWORKAREA,
                0,
                Some(&mut rect as *mut RECT as *mut c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        };

        match result {
            Ok(()) => Some(WorkArea::from_edges(
                rect.left,
                rect.top,
                rect.right,
                rect.bottom,
            )),
            Err(e) => {
                warn!("failed to query work area: {}", e);
                None
            }
        }
    }

    fn present(&mut self, frame: &Pixmap, target: Option<Target>) -> Result<()> {
        if self.hwnd.is_none() {
            return Ok(());
        }

        // Opacity is applied by the blend function, not baked into pixels
        render::write_bgra(frame, self.pixels(), u8::MAX);
        self.move_to(target);
        self.update()
    }

    fn show(&mut self, target: Option<Target>) -> Result<()> {
        let Some(hwnd) = self.hwnd else {
            return Err(anyhow!("window already destroyed"));
        };

        self.move_to(target);
        if self.origin.is_none() {
            return Err(anyhow!("no work area known to place the badge"));
        }
        self.update()?;
        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);
            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
            .context("SetWindowPos failed")?;
        }
        Ok(())
    }

    fn hide(&mut self) {
        if let Some(hwnd) = self.hwnd {
            unsafe {
                let _ = ShowWindow(hwnd, SW_HIDE);
            }
        }
    }

    fn destroy(&mut self) {
        let Some(hwnd) = self.hwnd.take() else {
            return;
        };

        unsafe {
            let _ = SelectObject(self.mem_dc, self.old_bitmap);
            let _ = DeleteObject(self.dib);
            let _ = DeleteDC(self.mem_dc);
            if let Err(e) = DestroyWindow(hwnd) {
                warn!("DestroyWindow failed: {}", e);
            }
            if let Err(e) = UnregisterClassW(PCWSTR(self.class_name.as_ptr()), self.hinstance) {
                debug!("UnregisterClassW failed: {}", e);
            }
        }
        self.bits = ptr::null_mut();
    }
}

impl Drop for LayeredWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}
