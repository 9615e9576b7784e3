// ============================================================================
// CANVAS — raster validation, source-over blending, blits
// ============================================================================

use std::borrow::Cow;

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::coords::{Point, Size};
use crate::error::EditorError;

/// Refuse rasters with no pixels.
pub fn validate_raster(img: &RgbaImage, what: &str) -> Result<(), EditorError> {
    if img.width() < 1 || img.height() < 1 {
        return Err(EditorError::InvalidImage(format!(
            "{} is {}x{}",
            what,
            img.width(),
            img.height()
        )));
    }
    Ok(())
}

/// Straight-alpha source-over of `top` onto `base`, with `top` scaled by `opacity`.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    // Fast path: nothing to draw
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    // Fast path: fully opaque top replaces base
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let top_a = (top[3] as f32 / 255.0) * opacity.min(1.0);
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (top[c] as f32 * top_a + base[c] as f32 * base_a * (1.0 - top_a)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Draw `layer` onto `canvas` with its top-left at integer `(x, y)`.
/// Parts outside the canvas are clipped.
pub fn blit(canvas: &mut RgbaImage, layer: &RgbaImage, x: i32, y: i32, opacity: f32) {
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    let (lw, lh) = (layer.width() as i32, layer.height() as i32);
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = x.saturating_add(lw).min(cw);
    let y1 = y.saturating_add(lh).min(ch);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = cw as usize * 4;
    let raw: &mut [u8] = &mut *canvas;
    raw.par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(cy, row)| {
            let ly = cy as i32 - y;
            for cx in x0..x1 {
                let top = *layer.get_pixel((cx - x) as u32, ly as u32);
                let pi = cx as usize * 4;
                let base = Rgba([row[pi], row[pi + 1], row[pi + 2], row[pi + 3]]);
                let out = blend_over(base, top, opacity);
                row[pi..pi + 4].copy_from_slice(&out.0);
            }
        });
}

/// Source-over of a same-sized `top` over the whole canvas.
pub fn overlay(canvas: &mut RgbaImage, top: &RgbaImage) {
    blit(canvas, top, 0, 0, 1.0);
}

/// `img` at exactly `width`×`height`, resized only when needed.
pub fn fit_to(img: &RgbaImage, width: u32, height: u32) -> Cow<'_, RgbaImage> {
    if img.dimensions() == (width, height) {
        Cow::Borrowed(img)
    } else {
        Cow::Owned(imageops::resize(
            img,
            width.max(1),
            height.max(1),
            imageops::FilterType::Triangle,
        ))
    }
}

/// Scale `img` into the pixel rect `origin`/`size` of `canvas` (rounded to whole pixels).
pub fn draw_into_rect(canvas: &mut RgbaImage, img: &RgbaImage, origin: Point, size: Size) {
    let w = size.width.round().max(1.0) as u32;
    let h = size.height.round().max(1.0) as u32;
    let scaled = fit_to(img, w, h);
    blit(
        canvas,
        &scaled,
        origin.x.round() as i32,
        origin.y.round() as i32,
        1.0,
    );
}
