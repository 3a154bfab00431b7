//! tiny-skia rendering for the status badge

use crate::font::Font;
use crate::geometry::{BADGE_HEIGHT, BADGE_WIDTH, CORNER_RADIUS, FONT_SIZE};
use crate::status::StatusKind;
use tiny_skia::*;

// Control-point distance for a quarter circle drawn with one cubic
const KAPPA: f32 = 0.552_284_8;

/// Allocate a badge-sized pixmap and paint the badge into it.
///
/// Returns `None` if the pixmap cannot be allocated; callers skip the frame.
pub fn paint(status: StatusKind, text: &str, font: Option<&Font>) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(BADGE_WIDTH, BADGE_HEIGHT)?;
    paint_into(&mut pixmap, status, text, font);
    Some(pixmap)
}

/// Paint the badge over the whole of `pixmap`
pub fn paint_into(pixmap: &mut Pixmap, status: StatusKind, text: &str, font: Option<&Font>) {
    // 1. Start from a fully transparent buffer
    pixmap.fill(Color::TRANSPARENT);

    let width = pixmap.width() as f32;
    let height = pixmap.height() as f32;

    // 2. Pill background in the status color
    draw_background(pixmap, width, height, status);

    // 3. Centered label
    if let Some(font) = font {
        draw_text(pixmap, font, text, width, height);
    }
}

fn draw_background(pixmap: &mut Pixmap, width: f32, height: f32, status: StatusKind) {
    let Some(rect) = Rect::from_xywh(0.0, 0.0, width, height) else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(status.color().to_color());
    paint.anti_alias = true;

    let path = create_rounded_rect(rect, CORNER_RADIUS);
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
}

fn draw_text(pixmap: &mut Pixmap, font: &Font, text: &str, width: f32, height: f32) {
    let Some(path) = font.text_path(text, FONT_SIZE) else {
        return;
    };

    // Center on ink extents rather than the line box
    let bounds = path.bounds();
    let dx = (width - bounds.width()) / 2.0 - bounds.left();
    let dy = (height - bounds.height()) / 2.0 - bounds.top();

    let mut paint = Paint::default();
    paint.set_color(Color::WHITE);
    paint.anti_alias = true;

    pixmap.fill_path(
        &path,
        &paint,
        FillRule::Winding,
        Transform::from_translate(dx, dy),
        None,
    );
}

fn create_rounded_rect(rect: Rect, radius: f32) -> Path {
    let x = rect.x();
    let y = rect.y();
    let w = rect.width();
    let h = rect.height();
    let r = radius.min(w / 2.0).min(h / 2.0);
    let k = r * KAPPA;

    let mut pb = PathBuilder::new();

    pb.move_to(x + r, y);

    // Top edge, top-right corner
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);

    // Right edge, bottom-right corner
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);

    // Bottom edge, bottom-left corner
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);

    // Left edge, top-left corner
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);

    pb.close();

    pb.finish().unwrap_or_else(|| PathBuilder::from_rect(rect))
}

/// Copy a premultiplied RGBA pixmap into premultiplied BGRA bytes (the
/// in-memory order of ARGB8888 on little-endian hosts), scaling every
/// channel by `opacity`.
pub fn write_bgra(pixmap: &Pixmap, out: &mut [u8], opacity: u8) {
    let scale = |c: u8| ((u16::from(c) * u16::from(opacity) + 127) / 255) as u8;

    for (src, dst) in pixmap.data().chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        dst[0] = scale(src[2]);
        dst[1] = scale(src[1]);
        dst[2] = scale(src[0]);
        dst[3] = scale(src[3]);
    }
}
