//! Badge text: system font lookup, shaping and glyph outlines
//!
//! Fonts are located with fontdb, shaped with rustybuzz and turned into
//! tiny-skia paths through ttf-parser's outline builder.

use tiny_skia::{Path, PathBuilder};
use tracing::{debug, warn};
use ttf_parser::{GlyphId, OutlineBuilder};

/// Owned font file bytes plus the face index inside a collection
pub struct Font {
    data: Vec<u8>,
    index: u32,
}

impl Font {
    /// Wrap raw font data, rejecting bytes that do not parse as a face
    pub fn from_data(data: Vec<u8>, index: u32) -> Option<Self> {
        ttf_parser::Face::parse(&data, index).ok()?;
        Some(Self { data, index })
    }

    /// Bold face of the platform's default UI family
    pub fn system_default() -> Option<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        #[cfg(windows)]
        db.set_sans_serif_family("Segoe UI");

        let query = fontdb::Query {
            families: &[fontdb::Family::SansSerif],
            weight: fontdb::Weight::BOLD,
            stretch: fontdb::Stretch::Normal,
            style: fontdb::Style::Normal,
        };

        let Some(id) = db.query(&query) else {
            warn!(faces = db.len(), "no sans-serif face found; badge text disabled");
            return None;
        };

        if let Some(face) = db.face(id) {
            debug!(font = %face.post_script_name, "selected badge font");
        }

        let (data, index) = db.with_face_data(id, |data, index| (data.to_vec(), index))?;
        Self::from_data(data, index)
    }

    /// Outline of `text` at `size` pixels with the pen starting at (0, 0) on
    /// the baseline. Returns `None` when nothing would be drawn.
    pub fn text_path(&self, text: &str, size: f32) -> Option<Path> {
        if text.is_empty() {
            return None;
        }

        let outlines = ttf_parser::Face::parse(&self.data, self.index).ok()?;
        let shaper = rustybuzz::Face::from_slice(&self.data, self.index)?;
        let scale = size / f32::from(outlines.units_per_em());

        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.guess_segment_properties();
        let glyphs = rustybuzz::shape(&shaper, &[], buffer);

        let mut builder = PathBuilder::new();
        let mut pen_x = 0.0;
        let mut pen_y = 0.0;

        for (info, pos) in glyphs.glyph_infos().iter().zip(glyphs.glyph_positions()) {
            let Ok(glyph) = u16::try_from(info.glyph_id) else {
                continue;
            };

            let mut sink = GlyphSink {
                builder: &mut builder,
                scale,
                x: pen_x + pos.x_offset as f32 * scale,
                y: pen_y - pos.y_offset as f32 * scale,
            };
            outlines.outline_glyph(GlyphId(glyph), &mut sink);

            pen_x += pos.x_advance as f32 * scale;
            pen_y -= pos.y_advance as f32 * scale;
        }

        // Whitespace-only strings have no contours
        builder.finish()
    }
}

/// Forwards font-unit outline commands into a pixel-space path
struct GlyphSink<'a> {
    builder: &'a mut PathBuilder,
    scale: f32,
    x: f32,
    y: f32,
}

impl GlyphSink<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        // Font units are y-up
        (self.x + x * self.scale, self.y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphSink<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data_rejects_garbage() {
        assert!(Font::from_data(vec![0; 64], 0).is_none());
        assert!(Font::from_data(Vec::new(), 0).is_none());
    }

    #[test]
    fn test_glyph_sink_flips_y_axis() {
        let mut builder = PathBuilder::new();
        let mut sink = GlyphSink {
            builder: &mut builder,
            scale: 0.5,
            x: 10.0,
            y: 20.0,
        };
        sink.move_to(0.0, 0.0);
        sink.line_to(20.0, 0.0);
        sink.line_to(20.0, 40.0);
        sink.close();

        let path = builder.finish().unwrap();
        let bounds = path.bounds();
        assert_eq!(bounds.left(), 10.0);
        assert_eq!(bounds.right(), 20.0);
        // 40 units up maps to 20px above the baseline
        assert_eq!(bounds.top(), 0.0);
        assert_eq!(bounds.bottom(), 20.0);
    }

    #[test]
    fn test_system_font_empty_text_has_no_path() {
        // Hosts without any fonts installed skip this check
        if let Some(font) = Font::system_default() {
            assert!(font.text_path("", 13.0).is_none());
            assert!(font.text_path("Recording", 13.0).is_some());
        }
    }
}
