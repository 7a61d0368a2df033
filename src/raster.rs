use kurbo::{Point, Rect};

use crate::color::{Color, OPAQUE};

/// Row-major RGBA8 pixel buffer, straight alpha, top row first.
///
/// All drawing primitives reduce to [`PixelBuffer::fill_rect`], which
/// antialiases the top and bottom edges only; horizontal edges snap to
/// pixel columns (a rectangle narrower than one pixel is widened to one
/// column with proportionally reduced alpha so thin lines dim instead of
/// vanishing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let i = self.index(x as usize, y as usize);
        Color::rgba(self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3])
    }

    fn index(&self, x: usize, y: usize) -> usize {
        (y * self.width as usize + x) * 4
    }

    /// Vertical line of the given thickness around `center_x`.
    pub fn vline(&mut self, center_x: f64, top: f64, bottom: f64, thickness: f64, color: Color) {
        self.fill_rect(
            Rect::new(center_x - thickness / 2.0, top, center_x + thickness / 2.0, bottom),
            color,
        );
    }

    /// Horizontal line of the given thickness around `center_y`.
    pub fn hline(&mut self, center_y: f64, left: f64, right: f64, thickness: f64, color: Color) {
        self.fill_rect(
            Rect::new(left, center_y - thickness / 2.0, right, center_y + thickness / 2.0),
            color,
        );
    }

    /// Rectangle centered on a point.
    pub fn box_centered(&mut self, center: Point, width: f64, height: f64, color: Color) {
        self.fill_rect(
            Rect::new(
                center.x - width / 2.0,
                center.y - height / 2.0,
                center.x + width / 2.0,
                center.y + height / 2.0,
            ),
            color,
        );
    }

    /// The base primitive: axis-aligned rectangle, antialiased at the top
    /// and bottom edges. Out-of-bounds coordinates are clamped; geometry
    /// that collapses to nothing draws nothing.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let mut color = color;
        let (mut left, top, mut right, bottom) = (rect.x0, rect.y0, rect.x1, rect.y1);

        // Left/right snap to whole columns, so anything narrower than 1 px
        // becomes a 1 px column at reduced alpha.
        if right - left < 1.0 {
            let frac = (right - left).clamp(0.0, 1.0);
            color = color.with_opacity(scale_alpha(color.a, frac));
            right = left + 1.0;
        }

        let h = f64::from(self.height);
        let top = top.clamp(0.0, h);
        let bottom = bottom.clamp(0.0, h);
        if left < 0.0 {
            left = 0.0;
        }
        if right < 0.0 {
            right = 0.0;
        }
        let left = (left as usize).min(self.width as usize);
        let right = (right as usize).min(self.width as usize);

        let outer_top = top.floor() as usize;
        let inner_top = top.ceil() as usize;
        let inner_bottom = bottom.floor() as usize;
        let outer_bottom = bottom.ceil() as usize;

        // Height rounded to zero rows: nothing to draw.
        if outer_top >= outer_bottom || left >= right {
            return;
        }

        let top_alpha = 1.0 - (top - outer_top as f64);
        let bottom_alpha = 1.0 - (outer_bottom as f64 - bottom);

        if outer_bottom - outer_top == 1 {
            // Both fringes land on the same single pixel row.
            self.composite_over(
                outer_top..outer_bottom,
                left..right,
                color.with_opacity(scale_alpha(color.a, (top_alpha + bottom_alpha).min(1.0))),
            );
        } else {
            if inner_bottom > inner_top {
                self.composite_over(inner_top..inner_bottom, left..right, color);
            }
            self.composite_over(
                outer_top..inner_top,
                left..right,
                color.with_opacity(scale_alpha(color.a, top_alpha)),
            );
            self.composite_over(
                inner_bottom..outer_bottom,
                left..right,
                color.with_opacity(scale_alpha(color.a, bottom_alpha)),
            );
        }
    }

    /// Alpha-over composite of `color` onto a rectangular sub-region.
    /// Fully opaque colors take a plain-overwrite fast path.
    pub fn composite_over(
        &mut self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
        color: Color,
    ) {
        if color.a == 0 {
            return;
        }
        let w = self.width as usize;
        let rows = rows.start.min(self.height as usize)..rows.end.min(self.height as usize);
        let cols = cols.start.min(w)..cols.end.min(w);

        for y in rows {
            for x in cols.clone() {
                let i = (y * w + x) * 4;
                if color.a == OPAQUE {
                    self.data[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
                } else {
                    let base =
                        Color::rgba(self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]);
                    let out = base.blend(color);
                    self.data[i..i + 4].copy_from_slice(&[out.r, out.g, out.b, out.a]);
                }
            }
        }
    }

    /// Single-pixel composite used by the text renderer. Out-of-bounds
    /// coordinates are ignored.
    pub fn composite_pixel(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = self.index(x as usize, y as usize);
        let base = Color::rgba(self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]);
        let out = base.blend(color);
        self.data[i..i + 4].copy_from_slice(&[out.r, out.g, out.b, out.a]);
    }

    /// Subtract `amount` from every alpha value in row `y`, saturating at
    /// zero. Used for the hit-line fade-out ramp.
    pub fn darken_row_alpha(&mut self, y: usize, amount: u8) {
        if y >= self.height as usize {
            return;
        }
        let start = y * self.width as usize * 4;
        let end = start + self.width as usize * 4;
        for px in self.data[start..end].chunks_exact_mut(4) {
            px[3] = px[3].saturating_sub(amount);
        }
    }

    /// Darken RGB toward black by each pixel's transparency, producing an
    /// image that reads as if composited over black. The alpha bytes are
    /// left in place but no longer meaningful.
    pub fn flatten(&mut self) {
        for px in self.data.chunks_exact_mut(4) {
            let cut = 255 - px[3];
            for c in &mut px[..3] {
                *c = c.saturating_sub(cut);
            }
        }
    }

    /// Alpha channel normalized to 0..=1, one value per pixel.
    pub fn alpha_mask(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|px| f32::from(px[3]) / 255.0)
            .collect()
    }

    /// Drop the alpha channel, yielding tightly packed RGB8.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.data.chunks_exact(4) {
            out.extend_from_slice(&px[..3]);
        }
        out
    }
}

fn scale_alpha(a: u8, factor: f64) -> u8 {
    (f64::from(a) * factor.clamp(0.0, 1.0)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_integer_rect_is_flat_fill() {
        let mut buf = PixelBuffer::new(8, 8);
        let red = Color::rgb(255, 0, 0);
        buf.fill_rect(Rect::new(2.0, 2.0, 6.0, 6.0), red);
        for y in 0..8 {
            for x in 0..8 {
                let inside = (2..6).contains(&x) && (2..6).contains(&y);
                let expected = if inside { red } else { Color::rgba(0, 0, 0, 0) };
                assert_eq!(buf.pixel(x, y), expected, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn zero_height_rect_draws_nothing() {
        let mut buf = PixelBuffer::new(4, 4);
        let before = buf.clone();
        buf.fill_rect(Rect::new(1.0, 2.0, 3.0, 2.0), Color::rgb(255, 255, 255));
        assert_eq!(buf, before);
    }

    #[test]
    fn fully_out_of_bounds_rect_draws_nothing() {
        let mut buf = PixelBuffer::new(4, 4);
        let before = buf.clone();
        buf.fill_rect(Rect::new(-10.0, -10.0, -5.0, -5.0), Color::rgb(255, 255, 255));
        buf.fill_rect(Rect::new(10.0, 10.0, 20.0, 20.0), Color::rgb(255, 255, 255));
        assert_eq!(buf, before);
    }

    #[test]
    fn sub_pixel_width_widens_to_one_column_with_scaled_alpha() {
        let mut buf = PixelBuffer::new(4, 4);
        // 0.25 px wide: one column at a quarter of the requested alpha.
        buf.fill_rect(Rect::new(1.0, 0.0, 1.25, 4.0), Color::rgb(0, 0, 255));
        let px = buf.pixel(1, 1);
        assert_eq!(px.a, 64); // round(255 * 0.25)
        assert_eq!(buf.pixel(2, 1).a, 0);
        // The implied original width is recoverable from the output alpha.
        let implied = f64::from(px.a) / 255.0;
        assert!((implied - 0.25).abs() < 0.01);
    }

    #[test]
    fn fractional_top_and_bottom_get_fringe_rows() {
        let mut buf = PixelBuffer::new(2, 8);
        buf.fill_rect(Rect::new(0.0, 2.25, 2.0, 5.5), Color::rgb(255, 255, 255));
        // Top fringe at row 2: coverage 0.75.
        assert_eq!(buf.pixel(0, 2).a, 191);
        // Body rows at full alpha.
        assert_eq!(buf.pixel(0, 3).a, 255);
        assert_eq!(buf.pixel(0, 4).a, 255);
        // Bottom fringe at row 5: coverage 0.5.
        assert_eq!(buf.pixel(0, 5).a, 128);
        assert_eq!(buf.pixel(0, 6).a, 0);
    }

    #[test]
    fn single_row_rect_uses_capped_fringe_sum() {
        // Entirely inside one pixel row: one row at min(1, top + bottom
        // fringe) of the requested alpha.
        let mut buf = PixelBuffer::new(2, 4);
        buf.fill_rect(Rect::new(0.0, 1.25, 2.0, 1.75), Color::rgb(255, 255, 255));
        assert_eq!(buf.pixel(0, 1).a, 255); // 0.75 + 0.75 caps at 1
        assert_eq!(buf.pixel(0, 0).a, 0);
        assert_eq!(buf.pixel(0, 2).a, 0);

        // Straddling a row boundary with no full row: two fringes only.
        let mut buf = PixelBuffer::new(2, 4);
        buf.fill_rect(Rect::new(0.0, 1.75, 2.0, 2.25), Color::rgb(255, 255, 255));
        assert_eq!(buf.pixel(0, 1).a, 64); // round(255 * 0.25)
        assert_eq!(buf.pixel(0, 2).a, 64);
        assert_eq!(buf.pixel(0, 3).a, 0);
    }

    #[test]
    fn translucent_fill_composites_instead_of_overwriting() {
        let mut buf = PixelBuffer::new(2, 2);
        buf.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Color::rgb(255, 0, 0));
        buf.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Color::rgba(255, 255, 255, 128));
        let px = buf.pixel(0, 0);
        assert_eq!(px.a, 255);
        // Halfway between red and white (straight-alpha over).
        assert_eq!(px.r, 255);
        assert!((120..=136).contains(&px.g));
        assert!((120..=136).contains(&px.b));
    }

    #[test]
    fn rect_agrees_with_color_blend() {
        let base = Color::rgba(10, 200, 40, 180);
        let top = Color::rgba(250, 20, 90, 77);
        let mut buf = PixelBuffer::new(1, 1);
        buf.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), base);
        buf.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), top);
        assert_eq!(buf.pixel(0, 0), base.blend(top));
    }

    #[test]
    fn flatten_darkens_by_transparency() {
        let mut buf = PixelBuffer::new(1, 1);
        buf.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::rgba(200, 100, 20, 200));
        buf.flatten();
        let px = buf.pixel(0, 0);
        // channel -= min(channel, 255 - alpha)
        assert_eq!((px.r, px.g, px.b), (145, 45, 0));
    }

    #[test]
    fn alpha_mask_is_normalized() {
        let mut buf = PixelBuffer::new(2, 1);
        buf.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::rgba(0, 0, 0, 255));
        let mask = buf.alpha_mask();
        assert_eq!(mask.len(), 2);
        assert_eq!(mask[0], 1.0);
        assert_eq!(mask[1], 0.0);
    }

    #[test]
    fn darken_row_alpha_saturates() {
        let mut buf = PixelBuffer::new(2, 2);
        buf.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Color::rgba(9, 9, 9, 100));
        buf.darken_row_alpha(1, 130);
        assert_eq!(buf.pixel(0, 0).a, 100);
        assert_eq!(buf.pixel(0, 1).a, 0);
    }

    #[test]
    fn vline_and_box_reduce_to_rect() {
        let mut a = PixelBuffer::new(8, 8);
        let mut b = PixelBuffer::new(8, 8);
        let c = Color::rgb(0, 255, 0);
        a.vline(4.0, 1.0, 7.0, 2.0, c);
        b.fill_rect(Rect::new(3.0, 1.0, 5.0, 7.0), c);
        assert_eq!(a, b);

        let mut a = PixelBuffer::new(8, 8);
        let mut b = PixelBuffer::new(8, 8);
        a.box_centered(Point::new(4.0, 4.0), 4.0, 2.0, c);
        b.fill_rect(Rect::new(2.0, 3.0, 6.0, 5.0), c);
        assert_eq!(a, b);
    }
}
