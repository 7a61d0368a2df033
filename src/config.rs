use std::path::PathBuf;

use crate::{
    color::{Color, PALETTE},
    error::{NotefallError, NotefallResult},
};

/// Everything the painter and encoder need to know about one render.
///
/// Defaults reproduce the classic look: 1280x720 at 30 fps, ten-second
/// fall, translucent white hit-line, pitch-class palette.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Seconds a note takes to travel from the top of the frame to the
    /// hit-line.
    pub fall_time: f64,
    pub show_text: bool,
    /// Produce a per-pixel transparency mask alongside each frame, for
    /// compositing over a background layer.
    pub masked: bool,
    pub font: Option<PathBuf>,
    /// Fraction of the frame width kept clear on each side.
    pub side_margin: f64,
    /// Fraction of the frame height below the hit-line.
    pub bottom_margin: f64,
    /// Note bar width as a fraction of the column width.
    pub note_width: f64,
    /// Key-line thickness as a fraction of the column width.
    pub line_thickness: f64,
    /// Opacity of the static key lines and hit-line (0..=255).
    pub line_opacity: u8,
    /// Seconds the hit flash lasts after a note edge crosses the line.
    pub hit_effect_time: f64,
    pub hit_effect_color: Color,
    pub hit_line_color: Color,
    /// Pitch-class colors, index = key mod 12.
    pub palette: [Color; 12],
    /// Extra seconds rendered after the last note has faded.
    pub end_time: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            fall_time: 10.0,
            show_text: true,
            masked: false,
            font: None,
            side_margin: 0.05,
            bottom_margin: 0.2,
            note_width: 0.3,
            line_thickness: 0.05,
            line_opacity: 180,
            hit_effect_time: 1.0,
            hit_effect_color: Color::rgb(255, 255, 255),
            hit_line_color: Color::rgb(255, 255, 255),
            palette: PALETTE,
            end_time: 4.0,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> NotefallResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(NotefallError::config("width/height must be non-zero"));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            // yuv420p output requires even dimensions.
            return Err(NotefallError::config("width/height must be even"));
        }
        if self.fps == 0 {
            return Err(NotefallError::config("fps must be non-zero"));
        }
        if !self.fall_time.is_finite() || self.fall_time <= 0.0 {
            return Err(NotefallError::config("fall_time must be positive"));
        }
        if !(0.0..0.5).contains(&self.side_margin) {
            return Err(NotefallError::config("side_margin must be in [0, 0.5)"));
        }
        if !(0.0..1.0).contains(&self.bottom_margin) || self.bottom_margin <= 0.0 {
            return Err(NotefallError::config("bottom_margin must be in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.note_width) || self.note_width == 0.0 {
            return Err(NotefallError::config("note_width must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.line_thickness) || self.line_thickness == 0.0 {
            return Err(NotefallError::config("line_thickness must be in (0, 1]"));
        }
        if !self.hit_effect_time.is_finite() || self.hit_effect_time <= 0.0 {
            return Err(NotefallError::config("hit_effect_time must be positive"));
        }
        if !self.end_time.is_finite() || self.end_time < 0.0 {
            return Err(NotefallError::config("end_time must be >= 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        RenderConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_dimensions() {
        let mut cfg = RenderConfig::default();
        cfg.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RenderConfig::default();
        cfg.height = 719; // odd
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_nonpositive_fall_time() {
        let mut cfg = RenderConfig::default();
        cfg.fall_time = 0.0;
        assert!(cfg.validate().is_err());
        cfg.fall_time = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_ratios() {
        let mut cfg = RenderConfig::default();
        cfg.side_margin = 0.5;
        assert!(cfg.validate().is_err());

        let mut cfg = RenderConfig::default();
        cfg.note_width = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_roundtrip_with_partial_input() {
        let cfg: RenderConfig = serde_json::from_str(r#"{"width": 640, "height": 360}"#).unwrap();
        assert_eq!(cfg.width, 640);
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.palette[0], Color::rgb(255, 0, 0));

        let s = serde_json::to_string(&cfg).unwrap();
        let back: RenderConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(back.width, 640);
    }
}
