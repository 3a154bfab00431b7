//! Badge geometry and on-screen placement
//!
//! The badge is a fixed-size pill anchored horizontally centered, a fixed
//! margin above the bottom of the display's work area. Placement is always
//! derived from the work area the backend reports at the time of the call.

/// Badge width in logical units
pub const BADGE_WIDTH: u32 = 200;
/// Badge height in logical units
pub const BADGE_HEIGHT: u32 = 36;
/// Corner radius (half the height, so the badge is a pill)
pub const CORNER_RADIUS: f32 = 18.0;
/// Gap between the badge and the bottom of the work area
pub const BOTTOM_MARGIN: i32 = 48;
/// Window opacity as a byte (230/255 ~ 0.90)
pub const WINDOW_ALPHA: u8 = 230;
/// Text size in pixels
pub const FONT_SIZE: f32 = 13.0;

/// Usable display rectangle, excluding reserved regions such as a taskbar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkArea {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl WorkArea {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Build from edge coordinates (Win32 `RECT` style)
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub const fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

/// Top-left corner of the badge in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
}

impl Placement {
    /// Distance from the work area's left edge to the badge
    pub fn left_margin(&self, area: &WorkArea) -> i32 {
        self.x - area.left
    }

    /// Distance from the badge's bottom edge to the work area's bottom edge
    pub fn bottom_margin(&self, area: &WorkArea) -> i32 {
        area.bottom() - (self.y + BADGE_HEIGHT as i32)
    }
}

/// Bottom-center placement for the badge inside `area`
pub fn position(area: &WorkArea) -> Placement {
    let width = BADGE_WIDTH as i32;
    let height = BADGE_HEIGHT as i32;

    Placement {
        x: area.left + (area.width - width) / 2,
        y: area.bottom() - height - BOTTOM_MARGIN,
    }
}
