use std::path::{Path, PathBuf};

use kurbo::Point;
use tracing::{debug, warn};

use crate::{color::Color, raster::PixelBuffer};

/// Well-known font locations tried after any caller-supplied path.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-fonts/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

enum GlyphSource {
    Loaded(fontdue::Font),
    /// 5x7 bitmap glyphs covering the note-name alphabet. Never fails.
    Builtin,
}

/// A glyph rasterizer resolved from an ordered fallback chain: the
/// configured font first, then common system fonts, then a built-in
/// bitmap set. Font trouble degrades the labels, never the render.
pub struct FontBank {
    source: GlyphSource,
}

impl FontBank {
    pub fn load(custom: Option<&Path>) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(p) = custom {
            candidates.push(p.to_path_buf());
        }
        candidates.extend(SYSTEM_FONTS.iter().map(PathBuf::from));

        for path in &candidates {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            match fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default()) {
                Ok(font) => {
                    debug!(font = %path.display(), "loaded label font");
                    return Self {
                        source: GlyphSource::Loaded(font),
                    };
                }
                Err(err) => {
                    warn!(font = %path.display(), %err, "skipping unusable font");
                }
            }
        }

        warn!("no usable font found, falling back to built-in bitmap glyphs");
        Self {
            source: GlyphSource::Builtin,
        }
    }

    pub fn builtin() -> Self {
        Self {
            source: GlyphSource::Builtin,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.source, GlyphSource::Builtin)
    }

    /// Draw `text` with its midpoint (both axes) anchored at `center`.
    pub fn draw_text(
        &self,
        buf: &mut PixelBuffer,
        center: Point,
        text: &str,
        color: Color,
        px: f32,
    ) {
        match &self.source {
            GlyphSource::Loaded(font) => draw_fontdue(font, buf, center, text, color, px),
            GlyphSource::Builtin => draw_builtin(buf, center, text, color, px),
        }
    }
}

fn draw_fontdue(
    font: &fontdue::Font,
    buf: &mut PixelBuffer,
    center: Point,
    text: &str,
    color: Color,
    px: f32,
) {
    // Measure the run so it can be centered on both axes.
    let mut total_width: i64 = 0;
    let mut max_ascent: i64 = 0;
    let mut max_descent: i64 = 0;
    for ch in text.chars() {
        let metrics = font.metrics(ch, px);
        let ascent = metrics.height as i64 + i64::from(metrics.ymin);
        let descent = -i64::from(metrics.ymin);
        max_ascent = max_ascent.max(ascent);
        max_descent = max_descent.max(descent.max(0));
        total_width += metrics.advance_width.round() as i64;
    }
    let run_height = max_ascent + max_descent;

    let origin_x = center.x.round() as i64 - total_width / 2;
    let origin_y = center.y.round() as i64 - run_height / 2;

    let mut cursor_x = origin_x;
    for ch in text.chars() {
        let (metrics, bitmap) = font.rasterize(ch, px);
        let glyph_x = cursor_x + i64::from(metrics.xmin);
        let glyph_y = origin_y + max_ascent - (metrics.height as i64 + i64::from(metrics.ymin));

        for gy in 0..metrics.height {
            for gx in 0..metrics.width {
                let coverage = bitmap[gy * metrics.width + gx];
                if coverage == 0 {
                    continue;
                }
                let a = (u16::from(coverage) * u16::from(color.a) / 255) as u8;
                buf.composite_pixel(
                    glyph_x + gx as i64,
                    glyph_y + gy as i64,
                    color.with_opacity(a),
                );
            }
        }
        cursor_x += metrics.advance_width.round() as i64;
    }
}

const BUILTIN_ROWS: usize = 7;
const BUILTIN_COLS: usize = 5;

/// Row bitmaps for a glyph, most significant of the low 5 bits = leftmost.
fn builtin_glyph(ch: char) -> Option<[u8; BUILTIN_ROWS]> {
    let rows = match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        '#' => [0x0A, 0x1F, 0x0A, 0x0A, 0x0A, 0x1F, 0x0A],
        _ => return None,
    };
    Some(rows)
}

fn draw_builtin(buf: &mut PixelBuffer, center: Point, text: &str, color: Color, px: f32) {
    let scale = ((px / BUILTIN_ROWS as f32).round() as i64).max(1);
    let advance = (BUILTIN_COLS as i64 + 1) * scale;
    let total_width = advance * text.chars().count() as i64 - scale;
    let run_height = BUILTIN_ROWS as i64 * scale;

    let origin_x = center.x.round() as i64 - total_width / 2;
    let origin_y = center.y.round() as i64 - run_height / 2;

    let mut cursor_x = origin_x;
    for ch in text.chars() {
        if let Some(rows) = builtin_glyph(ch) {
            for (ry, row) in rows.iter().enumerate() {
                for rx in 0..BUILTIN_COLS {
                    if row & (1 << (BUILTIN_COLS - 1 - rx)) == 0 {
                        continue;
                    }
                    // Each set bit becomes a scale x scale block.
                    for dy in 0..scale {
                        for dx in 0..scale {
                            buf.composite_pixel(
                                cursor_x + rx as i64 * scale + dx,
                                origin_y + ry as i64 * scale + dy,
                                color,
                            );
                        }
                    }
                }
            }
        }
        cursor_x += advance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_note_name_alphabet() {
        for name in crate::color::NOTE_NAMES {
            for ch in name.chars() {
                assert!(builtin_glyph(ch).is_some(), "missing builtin glyph {ch:?}");
            }
        }
    }

    #[test]
    fn builtin_draw_is_roughly_centered() {
        let bank = FontBank::builtin();
        let mut buf = PixelBuffer::new(32, 32);
        bank.draw_text(&mut buf, Point::new(16.0, 16.0), "C", Color::rgb(255, 255, 255), 7.0);

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (u32::MAX, 0u32, u32::MAX, 0u32);
        for y in 0..32 {
            for x in 0..32 {
                if buf.pixel(x, y).a > 0 {
                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                    min_y = min_y.min(y);
                    max_y = max_y.max(y);
                }
            }
        }
        assert!(min_x < max_x, "glyph drew nothing");
        let cx = (min_x + max_x) as f64 / 2.0;
        let cy = (min_y + max_y) as f64 / 2.0;
        assert!((cx - 16.0).abs() <= 2.0);
        assert!((cy - 16.0).abs() <= 2.0);
    }

    #[test]
    fn builtin_ignores_unknown_chars() {
        let bank = FontBank::builtin();
        let mut buf = PixelBuffer::new(16, 16);
        bank.draw_text(&mut buf, Point::new(8.0, 8.0), "??", Color::rgb(255, 255, 255), 7.0);
        assert!(buf.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn missing_font_path_falls_back_instead_of_failing() {
        let bank = FontBank::load(Some(Path::new("/definitely/not/a/font.ttf")));
        // Either a system font was found or the builtin kicked in; both are
        // usable sources and neither is an error.
        let mut buf = PixelBuffer::new(24, 24);
        bank.draw_text(&mut buf, Point::new(12.0, 12.0), "F#", Color::rgb(255, 0, 0), 10.0);
    }
}
