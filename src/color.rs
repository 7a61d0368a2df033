use crate::error::{NotefallError, NotefallResult};

pub const OPAQUE: u8 = 255;

/// Straight (non-premultiplied) RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: OPAQUE }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse an opaque color from exactly six hex digits (`rrggbb`).
    pub fn from_hex(s: &str) -> NotefallResult<Self> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(NotefallError::format(format!(
                "expected 6 hex digits (rrggbb), got '{s}'"
            )));
        }
        let channel = |range: std::ops::Range<usize>| -> NotefallResult<u8> {
            u8::from_str_radix(&s[range], 16)
                .map_err(|e| NotefallError::format(format!("bad hex color '{s}': {e}")))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Copy of this color with only the alpha channel replaced.
    pub fn with_opacity(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Composite `top` over `self` (straight-alpha "over" operator).
    ///
    /// The rasterizer's per-pixel composite routes through this same
    /// function, so effect colors computed here and pixels written there
    /// agree exactly.
    pub fn blend(self, top: Color) -> Self {
        let a_t = f64::from(top.a) / 255.0;
        let a_b = f64::from(self.a) / 255.0;
        let a_o = a_t + a_b * (1.0 - a_t);

        let channel = |t: u8, b: u8| -> u8 {
            if a_o <= 0.0 {
                return 0;
            }
            let c = (f64::from(t) * a_t + f64::from(b) * a_b * (1.0 - a_t)) / a_o;
            c.round().clamp(0.0, 255.0) as u8
        };

        Self {
            r: channel(top.r, self.r),
            g: channel(top.g, self.g),
            b: channel(top.b, self.b),
            a: (a_o * 255.0).round().clamp(0.0, 255.0) as u8,
        }
    }
}

/// Pitch-class palette, index = key mod 12, C first.
pub const PALETTE: [Color; 12] = [
    Color::rgb(0xff, 0x00, 0x00), // C
    Color::rgb(0xfa, 0x6c, 0x20), // C#
    Color::rgb(0xff, 0x93, 0x00), // D
    Color::rgb(0xff, 0xc0, 0x00), // D#
    Color::rgb(0xff, 0xfe, 0x00), // E
    Color::rgb(0x83, 0xff, 0x00), // F
    Color::rgb(0x00, 0xff, 0x74), // F#
    Color::rgb(0x00, 0xff, 0xe5), // G
    Color::rgb(0x00, 0x2b, 0xff), // G#
    Color::rgb(0x80, 0x00, 0xff), // A
    Color::rgb(0xae, 0x5e, 0xff), // A#
    Color::rgb(0xff, 0x00, 0xff), // B
];

/// Note-name labels, index = key mod 12.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hex_parses_channels() {
        let c = Color::from_hex("fa6c20").unwrap();
        assert_eq!(c, Color::rgb(0xfa, 0x6c, 0x20));
        assert_eq!(c.a, OPAQUE);
    }

    #[test]
    fn from_hex_rejects_wrong_length_and_junk() {
        assert!(Color::from_hex("fff").is_err());
        assert!(Color::from_hex("ff00ff00").is_err());
        assert!(Color::from_hex("gggggg").is_err());
        assert!(Color::from_hex("").is_err());
    }

    #[test]
    fn with_opacity_replaces_only_alpha() {
        let c = Color::rgb(1, 2, 3).with_opacity(40);
        assert_eq!(c, Color::rgba(1, 2, 3, 40));
    }

    #[test]
    fn blend_opaque_top_wins() {
        let base = Color::rgba(10, 20, 30, 77);
        let top = Color::rgb(200, 100, 50);
        assert_eq!(base.blend(top), top);
    }

    #[test]
    fn blend_transparent_top_keeps_base() {
        let base = Color::rgba(10, 20, 30, 200);
        let top = Color::rgba(255, 255, 255, 0);
        assert_eq!(base.blend(top), base);
    }

    #[test]
    fn blend_over_transparent_base_yields_top() {
        let base = Color::rgba(0, 0, 0, 0);
        let top = Color::rgba(100, 110, 120, 128);
        assert_eq!(base.blend(top), top);
    }

    #[test]
    fn blend_both_fully_transparent_is_zero() {
        let base = Color::rgba(10, 20, 30, 0);
        let top = Color::rgba(40, 50, 60, 0);
        assert_eq!(base.blend(top), Color::rgba(0, 0, 0, 0));
    }

    #[test]
    fn palette_and_names_line_up() {
        assert_eq!(PALETTE.len(), NOTE_NAMES.len());
        assert_eq!(NOTE_NAMES[0], "C");
        assert_eq!(PALETTE[0], Color::rgb(255, 0, 0));
        assert_eq!(NOTE_NAMES[11], "B");
    }
}
