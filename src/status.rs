//! Status kinds and their badge colors

/// Background task status shown by the badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum StatusKind {
    #[default]
    Recording = 0,
    Transcribing = 1,
    Completed = 2,
    Error = 3,
}

/// Opaque RGB triple used to fill the badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_color(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, 255)
    }
}

pub const RED: Rgb = Rgb::new(239, 68, 68);
pub const BLUE: Rgb = Rgb::new(59, 130, 246);
pub const GREEN: Rgb = Rgb::new(16, 185, 129);
pub const ORANGE: Rgb = Rgb::new(245, 158, 11);

impl StatusKind {
    pub const ALL: [StatusKind; 4] = [
        StatusKind::Recording,
        StatusKind::Transcribing,
        StatusKind::Completed,
        StatusKind::Error,
    ];

    /// Badge fill color for this status
    pub const fn color(self) -> Rgb {
        match self {
            StatusKind::Recording => RED,
            StatusKind::Transcribing => BLUE,
            StatusKind::Completed => GREEN,
            StatusKind::Error => ORANGE,
        }
    }
}

/// Integer outside the C `StatusType` range
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub i32);

impl TryFrom<i32> for StatusKind {
    type Error = UnknownStatus;

    fn try_from(value: i32) -> Result<Self, UnknownStatus> {
        match value {
            0 => Ok(StatusKind::Recording),
            1 => Ok(StatusKind::Transcribing),
            2 => Ok(StatusKind::Completed),
            3 => Ok(StatusKind::Error),
            other => Err(UnknownStatus(other)),
        }
    }
}
