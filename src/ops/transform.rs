// ============================================================================
// TRANSFORM — rotated blits about a pivot
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::blend_over;

/// Bilinear sample at continuous pixel coordinates (pixel centres on integers).
/// Interpolates premultiplied color so transparent neighbours do not darken edges;
/// outside the image counts as transparent.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            let a = p[3] as f32 / 255.0;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut pm = [0f32; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        pm[c] = lerp(top, bot, fy);
    }

    let a = pm[3];
    if a < 0.5 {
        return Rgba([0, 0, 0, 0]);
    }
    let k = 255.0 / a;
    Rgba([
        (pm[0] * k).round().clamp(0.0, 255.0) as u8,
        (pm[1] * k).round().clamp(0.0, 255.0) as u8,
        (pm[2] * k).round().clamp(0.0, 255.0) as u8,
        a.round().clamp(0.0, 255.0) as u8,
    ])
}

/// Draw `layer`, whose unrotated top-left sits at `origin` in canvas pixels,
/// rotated by `degrees` (clockwise on screen) about `pivot`.
pub fn blit_rotated(
    canvas: &mut RgbaImage,
    layer: &RgbaImage,
    origin: (f32, f32),
    pivot: (f32, f32),
    degrees: f32,
    opacity: f32,
) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (lw, lh) = (layer.width() as f32, layer.height() as f32);
    let (px, py) = pivot;

    // Canvas-space bounding box of the rotated layer.
    let corners = [
        (origin.0, origin.1),
        (origin.0 + lw, origin.1),
        (origin.0, origin.1 + lh),
        (origin.0 + lw, origin.1 + lh),
    ];
    let mut min = (f32::MAX, f32::MAX);
    let mut max = (f32::MIN, f32::MIN);
    for (cx, cy) in corners {
        let (dx, dy) = (cx - px, cy - py);
        let rx = px + cos * dx - sin * dy;
        let ry = py + sin * dx + cos * dy;
        min = (min.0.min(rx), min.1.min(ry));
        max = (max.0.max(rx), max.1.max(ry));
    }

    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    let x0 = (min.0.floor() as i32).max(0);
    let y0 = (min.1.floor() as i32).max(0);
    let x1 = (max.0.ceil() as i32).min(cw);
    let y1 = (max.1.ceil() as i32).min(ch);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = cw as usize * 4;
    let raw: &mut [u8] = &mut *canvas;
    raw.par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            for x in x0..x1 {
                // Inverse-rotate the pixel centre back into the layer.
                let (dx, dy) = (x as f32 + 0.5 - px, y as f32 + 0.5 - py);
                let lx = px + cos * dx + sin * dy - origin.0;
                let ly = py - sin * dx + cos * dy - origin.1;
                let top = bilinear_sample(layer, lx - 0.5, ly - 0.5);
                if top[3] == 0 {
                    continue;
                }
                let pi = x as usize * 4;
                let base = Rgba([row[pi], row[pi + 1], row[pi + 2], row[pi + 3]]);
                let out = blend_over(base, top, opacity);
                row[pi..pi + 4].copy_from_slice(&out.0);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_on_pixel_centre_is_exact() {
        let mut img = RgbaImage::new(3, 3);
        img.put_pixel(1, 1, Rgba([10, 20, 30, 255]));
        assert_eq!(bilinear_sample(&img, 1.0, 1.0), Rgba([10, 20, 30, 255]));
        assert_eq!(bilinear_sample(&img, -3.0, 1.0)[3], 0);
    }

    #[test]
    fn half_turn_mirrors_about_pivot() {
        // 4x1 bar on the left half of an 8x1 row, rotated 180° about the row centre.
        let mut layer = RgbaImage::new(4, 1);
        for x in 0..4 {
            layer.put_pixel(x, 0, Rgba([255, 0, 0, 255]));
        }
        let mut canvas = RgbaImage::from_pixel(8, 1, Rgba([0, 0, 0, 255]));
        blit_rotated(&mut canvas, &layer, (0.0, 0.0), (4.0, 0.5), 180.0, 1.0);
        assert_eq!(*canvas.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(6, 0)[0], 255);
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        // A single opaque pixel right of the pivot ends up below it.
        let mut layer = RgbaImage::new(5, 5);
        layer.put_pixel(4, 2, Rgba([0, 255, 0, 255]));
        let mut canvas = RgbaImage::new(5, 5);
        blit_rotated(&mut canvas, &layer, (0.0, 0.0), (2.5, 2.5), 90.0, 1.0);
        assert!(canvas.get_pixel(2, 4)[3] > 200);
        assert_eq!(canvas.get_pixel(4, 2)[3], 0);
    }
}
