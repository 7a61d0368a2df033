use std::sync::Arc;

use kurbo::Point;
use tracing::debug;

use crate::{
    color::NOTE_NAMES,
    config::RenderConfig,
    error::{NotefallError, NotefallResult},
    midi::{Note, Score},
    raster::PixelBuffer,
    text::FontBank,
};

/// One rendered frame: tightly packed RGB8 rows.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// A transparency mask tagged with the timestamp it was rendered for, so
/// an out-of-order mask request can detect staleness.
#[derive(Clone, Debug)]
pub struct MaskFrame {
    pub timestamp: f64,
    /// Per-pixel opacity in 0..=1, row-major.
    pub data: Vec<f32>,
}

/// Turns a note list and a timestamp into a composited frame.
///
/// Layout and the static background are computed once at construction.
/// Cloned painters share the background read-only, so parallel workers can
/// each own an independent instance cheaply; the mask cache is per
/// instance and must not be shared across workers.
#[derive(Clone, Debug)]
pub struct Painter {
    cfg: RenderConfig,
    notes: Arc<Vec<Note>>,
    duration: f64,
    used_keys: Vec<u8>,
    columns: Vec<f64>,
    column_width: f64,
    note_width: f64,
    line_thickness: f64,
    background: Arc<PixelBuffer>,
    mask: Option<MaskFrame>,
    frames_rendered: u64,
}

impl Painter {
    pub fn new(score: &Score, cfg: RenderConfig) -> NotefallResult<Self> {
        cfg.validate()?;

        let mut used_keys: Vec<u8> = score.notes.iter().map(|n| n.key).collect();
        used_keys.sort_unstable();
        used_keys.dedup();
        if used_keys.is_empty() {
            // Guard the column-width division below.
            return Err(NotefallError::config(
                "MIDI input contains no completed notes; nothing to draw",
            ));
        }

        let width = f64::from(cfg.width);
        let column_width = (width - width * cfg.side_margin * 2.0) / used_keys.len() as f64;
        let note_width = column_width * cfg.note_width;
        let line_thickness = (column_width * cfg.line_thickness).max(1.0);
        let columns: Vec<f64> = (0..used_keys.len())
            .map(|i| width * cfg.side_margin + (i as f64 + 0.5) * column_width)
            .collect();

        // Lane and fall geometry derive from the column width, so a very
        // wide frame with few lanes can grow the hit-line thickness past
        // the hit-line itself; the fall speed would come out non-positive.
        let hit_point =
            (1.0 - cfg.bottom_margin) * f64::from(cfg.height) - line_thickness / 2.0;
        if hit_point <= 0.0 {
            return Err(NotefallError::config(format!(
                "frame dimensions leave no room above the hit-line \
                 (derived line thickness {line_thickness:.1}px against a \
                 {}px-tall frame); use a taller frame or a thinner line",
                cfg.height
            )));
        }

        debug!(
            keys = used_keys.len(),
            column_width, note_width, line_thickness, "computed column layout"
        );

        let mut painter = Self {
            duration: score.duration,
            notes: Arc::new(score.notes.clone()),
            used_keys,
            columns,
            column_width,
            note_width,
            line_thickness,
            background: Arc::new(PixelBuffer::new(cfg.width, cfg.height)),
            mask: None,
            frames_rendered: 0,
            cfg,
        };
        painter.background = Arc::new(painter.draw_static());
        Ok(painter)
    }

    /// Total length of the underlying MIDI file in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn used_keys(&self) -> &[u8] {
        &self.used_keys
    }

    pub fn column_centers(&self) -> &[f64] {
        &self.columns
    }

    /// The precomputed static layer: key lines, labels, hit-line.
    pub fn background(&self) -> &PixelBuffer {
        &self.background
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Y of the hit-line center.
    fn hit_line(&self) -> f64 {
        (1.0 - self.cfg.bottom_margin) * f64::from(self.cfg.height)
    }

    /// Y where a falling note edge visually touches the hit-line.
    fn hit_point(&self) -> f64 {
        self.hit_line() - self.line_thickness / 2.0
    }

    /// Y below which nothing is visible.
    fn fade_point(&self) -> f64 {
        (1.0 - self.cfg.bottom_margin / 2.0) * f64::from(self.cfg.height)
    }

    /// Constant fall speed in pixels per second.
    fn pixels_per_second(&self) -> f64 {
        self.hit_point() / self.cfg.fall_time
    }

    fn draw_static(&self) -> PixelBuffer {
        let cfg = &self.cfg;
        let mut buf = PixelBuffer::new(cfg.width, cfg.height);
        let height = f64::from(cfg.height);
        let fade_point = self.fade_point();

        let fonts = if cfg.show_text {
            FontBank::load(cfg.font.as_deref())
        } else {
            FontBank::builtin()
        };
        // Shrink labels when columns are narrow.
        let font_size = (self.column_width / 1.5).min(height * cfg.bottom_margin / 4.0) as f32;

        for (i, &x) in self.columns.iter().enumerate() {
            let key = self.used_keys[i];
            let color = cfg.palette[usize::from(key % 12)];

            buf.vline(
                x,
                0.0,
                fade_point - 1.0,
                self.line_thickness,
                color.with_opacity(cfg.line_opacity),
            );

            if cfg.show_text {
                let y = (1.0 - cfg.bottom_margin / 4.0) * height;
                fonts.draw_text(
                    &mut buf,
                    Point::new(x, y),
                    NOTE_NAMES[usize::from(key % 12)],
                    color,
                    font_size,
                );
            }
        }

        buf.hline(
            self.hit_line(),
            0.0,
            f64::from(cfg.width),
            self.line_thickness,
            cfg.hit_line_color.with_opacity(cfg.line_opacity),
        );

        buf
    }

    /// Render the frame for `seconds`.
    ///
    /// In masked mode the RGB output is left un-flattened (straight alpha;
    /// the mask produced alongside carries the opacity) and the mask cache
    /// is retagged with this timestamp. In unmasked mode the buffer is
    /// flattened to black through its transparency before the RGB split.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn render_at(&mut self, seconds: f64) -> Frame {
        let cfg = self.cfg.clone();
        let mut buf = (*self.background).clone();

        let hit_line = self.hit_line();
        let hit_point = self.hit_point();
        let fade_point = self.fade_point();
        let pps = self.pixels_per_second();

        for (i, &x) in self.columns.iter().enumerate() {
            let key = self.used_keys[i];
            let color = cfg.palette[usize::from(key % 12)];

            for note in self.notes.iter().filter(|n| n.key == key) {
                // Leading (bottom) edge reaches the hit point exactly
                // fall_time seconds after the note starts.
                let bottom = (seconds - note.start) * pps;
                let top = (seconds - note.stop) * pps;

                // Hit-effect progress: 1 at contact, 0 once the flash has
                // run its course. Quadratic ease biases the flash toward
                // the moment of contact.
                let stage = 1.0 - (bottom - hit_point) / (cfg.hit_effect_time * pps);
                let flashing = stage > 0.0 && stage < 1.0;
                let eased = stage * stage;

                let note_color = if flashing {
                    color.blend(
                        cfg.hit_effect_color
                            .with_opacity((eased * 255.0).round() as u8),
                    )
                } else {
                    color
                };

                // Skip notes fully above the frame or below the fade point.
                if bottom > 0.0 && top < fade_point {
                    buf.vline(x, top, bottom.min(fade_point), self.note_width, note_color);
                }

                if flashing {
                    let flash_width =
                        self.column_width - (self.column_width - self.note_width) * eased;
                    let flash_height = self.line_thickness + 2.0 * self.line_thickness * eased;
                    buf.box_centered(
                        Point::new(x, hit_line),
                        flash_width,
                        flash_height,
                        cfg.hit_line_color
                            .with_opacity((eased * 255.0).round() as u8),
                    );
                }
            }
        }

        // Linear fade-out between the hit-line and the fade point.
        let hit_row = hit_line as usize;
        let fade_row = fade_point as usize;
        if fade_row > hit_row {
            let span = (fade_row - hit_row) as f64;
            for row in hit_row..fade_row {
                let cut = (255.0 * (row - hit_row) as f64 / span) as u8;
                buf.darken_row_alpha(row, cut);
            }
        }

        if cfg.masked {
            self.mask = Some(MaskFrame {
                timestamp: seconds,
                data: buf.alpha_mask(),
            });
        } else {
            buf.flatten();
        }

        self.frames_rendered += 1;
        Frame {
            width: cfg.width,
            height: cfg.height,
            rgb: buf.to_rgb(),
        }
    }

    /// Return the mask for `seconds`, re-rendering only if the cached mask
    /// was produced for a different timestamp. The external frame driver
    /// usually asks for the frame first and the mask second, but that
    /// ordering is assumed, not guaranteed.
    pub fn mask_at(&mut self, seconds: f64) -> NotefallResult<&MaskFrame> {
        if !self.cfg.masked {
            return Err(NotefallError::config(
                "mask requested but masked mode is disabled",
            ));
        }

        let stale = self
            .mask
            .as_ref()
            .map_or(true, |m| m.timestamp != seconds);
        if stale {
            debug!(seconds, "mask requested out of order, re-rendering");
            self.render_at(seconds);
        }

        self.mask
            .as_ref()
            .ok_or_else(|| NotefallError::config("mask cache empty after render (bug)"))
    }
}
