// ============================================================================
// TEXT EFFECTS — fill, drop shadow, stroke band
// ============================================================================

use image::{GrayImage, Luma, Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::components::layers::Rgb;
use crate::ops::text::Coverage;

/// How glyph coverage is colored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Fill {
    Solid(Rgb),
    /// Horizontal gradient from `x0` (color `from`) to `x1` (color `to`),
    /// clamped to the end colors outside that span.
    Linear { x0: f32, x1: f32, from: Rgb, to: Rgb },
}

impl Fill {
    #[inline]
    fn color_at(&self, x: f32) -> [u8; 3] {
        match *self {
            Fill::Solid(c) => c.0,
            Fill::Linear { x0, x1, from, to } => {
                let span = x1 - x0;
                let t = if span.abs() < f32::EPSILON {
                    0.0
                } else {
                    ((x - x0) / span).clamp(0.0, 1.0)
                };
                let mut out = [0u8; 3];
                for c in 0..3 {
                    let a = from.0[c] as f32;
                    let b = to.0[c] as f32;
                    out[c] = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
                }
                out
            }
        }
    }
}

/// Color coverage into an RGBA layer of the same size.
pub fn fill_layer(cov: &Coverage, fill: &Fill) -> RgbaImage {
    let w = cov.width as usize;
    let mut raw = vec![0u8; w * cov.height as usize * 4];
    if w == 0 {
        return RgbaImage::new(cov.width, cov.height);
    }
    raw.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let c = cov.data[y * w + x];
            if c <= 0.0 {
                continue;
            }
            // Gradient is evaluated at pixel centres.
            let rgb = fill.color_at(x as f32 + 0.5);
            let pi = x * 4;
            row[pi..pi + 3].copy_from_slice(&rgb);
            row[pi + 3] = (c * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
    RgbaImage::from_raw(cov.width, cov.height, raw)
        .unwrap_or_else(|| RgbaImage::new(cov.width, cov.height))
}

/// Paint `color` onto `layer` through `cov` (source-over).
pub fn paint_coverage(layer: &mut RgbaImage, cov: &Coverage, color: Rgb) {
    let w = layer.width() as usize;
    if w == 0 {
        return;
    }
    let raw: &mut [u8] = &mut *layer;
    raw.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let c = cov.get(x as i32, y as i32);
            if c <= 0.0 {
                continue;
            }
            let pi = x * 4;
            let base = Rgba([row[pi], row[pi + 1], row[pi + 2], row[pi + 3]]);
            let top = Rgba(color.with_alpha((c * 255.0).round().clamp(0.0, 255.0) as u8));
            let out = crate::canvas::blend_over(base, top, 1.0);
            row[pi..pi + 4].copy_from_slice(&out.0);
        }
    });
}

/// Shadow of `source`: its alpha shifted by `(dx, dy)`, blurred with a
/// gaussian of `sigma`, tinted with `color`. Same size as `source`.
pub fn drop_shadow(source: &RgbaImage, dx: f32, dy: f32, sigma: f32, color: Rgb) -> RgbaImage {
    let (w, h) = source.dimensions();
    let (ox, oy) = (dx.round() as i64, dy.round() as i64);

    // 1. Offset alpha mask.
    let shifted = GrayImage::from_fn(w, h, |x, y| {
        let sx = x as i64 - ox;
        let sy = y as i64 - oy;
        if sx >= 0 && sy >= 0 && sx < w as i64 && sy < h as i64 {
            Luma([source.get_pixel(sx as u32, sy as u32)[3]])
        } else {
            Luma([0])
        }
    });

    // 2. Blur.
    let blurred = if sigma > 0.25 {
        imageops::blur(&shifted, sigma)
    } else {
        shifted
    };

    // 3. Tint.
    RgbaImage::from_fn(w, h, |x, y| Rgba(color.with_alpha(blurred.get_pixel(x, y)[0])))
}

/// Outline band of half-width `half_width` centred on the coverage edge,
/// i.e. antialiased dilation minus erosion.
pub fn stroke_band(cov: &Coverage, half_width: f32) -> Coverage {
    let mut band = Coverage::new(cov.width, cov.height);
    if half_width <= 0.0 || cov.width == 0 {
        return band;
    }

    // Soft disk: weight 1 inside the radius, fading over the next pixel.
    let reach = (half_width + 1.0).ceil() as i32;
    let mut kernel: Vec<(i32, i32, f32)> = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = ((dx * dx + dy * dy) as f32).sqrt();
            let wt = (half_width + 1.0 - d).clamp(0.0, 1.0);
            if wt > 0.0 {
                kernel.push((dx, dy, wt));
            }
        }
    }

    let w = cov.width as usize;
    band.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut dilated = 0.0f32;
            let mut eroded = 1.0f32;
            for &(dx, dy, wt) in &kernel {
                let c = cov.get(x as i32 + dx, y as i32 + dy);
                dilated = dilated.max(c * wt);
                eroded = eroded.min(1.0 - wt * (1.0 - c));
            }
            *out = (dilated - eroded).clamp(0.0, 1.0);
        }
    });
    band
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: u32, lo: u32, hi: u32) -> Coverage {
        let mut cov = Coverage::new(size, size);
        for y in lo..hi {
            for x in lo..hi {
                cov.data[(y * size + x) as usize] = 1.0;
            }
        }
        cov
    }

    #[test]
    fn solid_fill_keeps_coverage_as_alpha() {
        let cov = square(6, 2, 4);
        let layer = fill_layer(&cov, &Fill::Solid(Rgb([9, 8, 7])));
        assert_eq!(*layer.get_pixel(2, 2), Rgba([9, 8, 7, 255]));
        assert_eq!(layer.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn gradient_runs_left_to_right() {
        let cov = square(10, 0, 10);
        let fill = Fill::Linear {
            x0: 0.0,
            x1: 10.0,
            from: Rgb([255, 0, 0]),
            to: Rgb([0, 0, 255]),
        };
        let layer = fill_layer(&cov, &fill);
        let left = layer.get_pixel(0, 5);
        let right = layer.get_pixel(9, 5);
        assert!(left[0] > 230 && left[2] < 25);
        assert!(right[2] > 230 && right[0] < 25);
        // Same colour down a column.
        assert_eq!(layer.get_pixel(4, 0), layer.get_pixel(4, 9));
    }

    #[test]
    fn stroke_band_hugs_the_edge() {
        let cov = square(20, 5, 15);
        let band = stroke_band(&cov, 1.0);
        // Deep inside and far outside: no stroke.
        assert_eq!(band.get(10, 10), 0.0);
        assert_eq!(band.get(1, 1), 0.0);
        // Just inside and just outside the edge: stroked.
        assert!(band.get(5, 10) > 0.9);
        assert!(band.get(4, 10) > 0.9);
    }

    #[test]
    fn thin_stroke_still_shows() {
        let cov = square(12, 4, 8);
        let band = stroke_band(&cov, 0.5);
        assert!(band.get(3, 6) >= 0.5);
        assert!(band.get(4, 6) >= 0.5);
    }

    #[test]
    fn shadow_is_offset_and_tinted() {
        let cov = square(12, 2, 5);
        let layer = fill_layer(&cov, &Fill::Solid(Rgb([255, 255, 255])));
        let shadow = drop_shadow(&layer, 4.0, 3.0, 0.0, Rgb([1, 2, 3]));
        assert_eq!(*shadow.get_pixel(6, 5), Rgba([1, 2, 3, 255]));
        assert_eq!(shadow.get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn blurred_shadow_spreads() {
        let cov = square(21, 9, 12);
        let layer = fill_layer(&cov, &Fill::Solid(Rgb::BLACK));
        let shadow = drop_shadow(&layer, 0.0, 0.0, 2.0, Rgb::BLACK);
        assert!(shadow.get_pixel(7, 10)[3] > 0);
        assert!(shadow.get_pixel(10, 10)[3] < 255);
    }
}
