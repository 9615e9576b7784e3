// ============================================================================
// COMPOSITOR — background, text layers, foreground cutout
// ============================================================================

use image::RgbaImage;

use crate::canvas::{blit, draw_into_rect, fit_to, overlay, validate_raster};
use crate::components::layers::{ElementId, TextElement};
use crate::coords::{Point, Size};
use crate::error::EditorError;
use crate::ops::effects::{Fill, drop_shadow, fill_layer, paint_coverage, stroke_band};
use crate::ops::text::{FontBook, GlyphSource, layout_line, rasterize_line};
use crate::ops::transform::blit_rotated;
use crate::viewport::ViewportTransform;

/// Element geometry in the pixel space of the canvas being painted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementGeometry {
    /// Top-left of the unrotated line.
    pub origin: Point,
    pub font_size: f32,
    pub letter_spacing: f32,
    pub stroke_width: f32,
    pub shadow_blur: f32,
    pub shadow_offset: (f32, f32),
}

impl ElementGeometry {
    /// Intrinsic-space geometry: position through the forward mapping,
    /// vertical measures by `scale_y`, horizontal ones by `scale_x`.
    pub fn for_export(el: &TextElement, t: &ViewportTransform) -> Self {
        let (sx, sy) = (t.scale_x as f32, t.scale_y as f32);
        Self {
            origin: t.to_intrinsic(el.position()),
            font_size: el.font_size * sy,
            letter_spacing: el.letter_spacing * sx,
            stroke_width: el.stroke_width * sy,
            shadow_blur: el.shadow.blur * sy,
            shadow_offset: (el.shadow.offset_x * sx, el.shadow.offset_y * sy),
        }
    }

    /// Edit-space geometry, as laid out on screen.
    pub fn for_preview(el: &TextElement) -> Self {
        Self {
            origin: el.position(),
            font_size: el.font_size,
            letter_spacing: el.letter_spacing,
            stroke_width: el.stroke_width,
            shadow_blur: el.shadow.blur,
            shadow_offset: (el.shadow.offset_x, el.shadow.offset_y),
        }
    }
}

/// One entry of a layered rendering, bottom to top.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneItem {
    Background { origin: Point, size: Size },
    Text { index: usize, id: ElementId, geometry: ElementGeometry },
    Foreground { origin: Point, size: Size },
}

/// On-screen arrangement: background in the letterboxed rect, visible text
/// in list order at edit-space geometry, foreground cutout over everything.
pub fn preview_scene(elements: &[TextElement], transform: &ViewportTransform) -> Vec<SceneItem> {
    let mut scene = Vec::with_capacity(elements.len() + 2);
    scene.push(SceneItem::Background {
        origin: transform.offset,
        size: transform.displayed,
    });
    scene.extend(
        elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.visible)
            .map(|(index, el)| SceneItem::Text {
                index,
                id: el.id,
                geometry: ElementGeometry::for_preview(el),
            }),
    );
    scene.push(SceneItem::Foreground {
        origin: transform.offset,
        size: transform.displayed,
    });
    scene
}

pub struct Compositor {
    fonts: FontBook,
}

impl Compositor {
    pub fn new(fonts: FontBook) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Final raster at the background's intrinsic resolution.
    ///
    /// Either every visible element plus both rasters is rendered, or nothing is.
    pub fn composite(
        &self,
        background: &RgbaImage,
        foreground: &RgbaImage,
        elements: &[TextElement],
        transform: &ViewportTransform,
    ) -> Result<RgbaImage, EditorError> {
        validate_raster(background, "background")?;
        validate_raster(foreground, "foreground")?;
        let (w, h) = background.dimensions();
        if transform.intrinsic != Size::new(w as f64, h as f64) {
            log_warn!(
                "Viewport fitted for {}x{} but background is {}x{}",
                transform.intrinsic.width,
                transform.intrinsic.height,
                w,
                h
            );
        }

        let mut canvas = background.clone();
        for el in elements.iter().filter(|el| el.visible) {
            let geometry = ElementGeometry::for_export(el, transform);
            self.paint_element(&mut canvas, el, &geometry)?;
        }

        let cutout = fit_to(foreground, w, h);
        overlay(&mut canvas, &cutout);
        Ok(canvas)
    }

    /// Live preview at container resolution, painted from [`preview_scene`].
    pub fn render_preview(
        &self,
        background: &RgbaImage,
        foreground: &RgbaImage,
        elements: &[TextElement],
        transform: &ViewportTransform,
    ) -> Result<RgbaImage, EditorError> {
        validate_raster(background, "background")?;
        validate_raster(foreground, "foreground")?;
        let container = transform.container();
        let mut canvas = RgbaImage::new(
            container.width.round().max(1.0) as u32,
            container.height.round().max(1.0) as u32,
        );

        for item in preview_scene(elements, transform) {
            match item {
                SceneItem::Background { origin, size } => {
                    draw_into_rect(&mut canvas, background, origin, size)
                }
                SceneItem::Text {
                    index, geometry, ..
                } => self.paint_element(&mut canvas, &elements[index], &geometry)?,
                SceneItem::Foreground { origin, size } => {
                    draw_into_rect(&mut canvas, foreground, origin, size)
                }
            }
        }
        Ok(canvas)
    }

    /// Rendered size of `el` in edit space: measured line width by
    /// `font_size * line_height`.
    pub fn measure(&self, el: &TextElement) -> Size {
        let font = self.fonts.face(el.font_family);
        let layout = layout_line(font, &el.display_text(), el.font_size, el.letter_spacing);
        Size::new(
            layout.width.max(0.0) as f64,
            (el.font_size * el.line_height) as f64,
        )
    }

    /// Paint one element: shadow under the fill, fill, then the stroke band,
    /// all blended at the element's opacity and rotated about the centre of
    /// the line.
    ///
    /// Only the part of the element that can reach the canvas is rasterized,
    /// so far-off positions and huge font sizes stay cheap. Layers or effects
    /// too large to paint are a `Render` error.
    pub fn paint_element(
        &self,
        canvas: &mut RgbaImage,
        el: &TextElement,
        geo: &ElementGeometry,
    ) -> Result<(), EditorError> {
        let text = el.display_text();
        let px = geo.font_size;
        if text.is_empty()
            || !(px > 0.0 && px.is_finite())
            || !geo.origin.is_finite()
            || !el.rotation.is_finite()
        {
            return Ok(());
        }
        let font = self.fonts.face(el.font_family);
        let layout = layout_line(font, &text, px, geo.letter_spacing);

        // Horizontal ink extent; negative spacing can pull glyphs left of the origin.
        let (ink_min, ink_max) = ink_extent(font, &layout.glyphs, px, layout.width);
        if !(ink_min.is_finite() && ink_max.is_finite()) {
            return Ok(());
        }

        let half_stroke = if el.stroke_width > 0.0 {
            geo.stroke_width / 2.0
        } else {
            0.0
        };
        let sigma = geo.shadow_blur.max(0.0) / 2.0;
        if !(half_stroke <= MAX_EFFECT_REACH && 3.0 * sigma <= MAX_EFFECT_REACH) {
            return Err(EditorError::Render(format!(
                "stroke {} px or shadow blur {} px is too wide",
                geo.stroke_width, geo.shadow_blur
            )));
        }
        let (sdx, sdy) = (finite_or_zero(geo.shadow_offset.0), finite_or_zero(geo.shadow_offset.1));
        let shadow_reach = if el.shadow.enabled {
            3.0 * sigma + sdx.abs().max(sdy.abs())
        } else {
            0.0
        };
        // Neighbourhood the stroke and the shadow read around a painted pixel.
        let margin = (half_stroke + shadow_reach).ceil() as f64 + 2.0;
        let pad = (half_stroke + shadow_reach + px * 0.25).ceil() as f64 + 2.0;

        let (ox, oy) = (geo.origin.x, geo.origin.y);
        let full = Bounds {
            x0: (ox + ink_min as f64).floor() - pad,
            y0: oy.floor() - pad,
            x1: (ox + ink_max as f64).ceil() + pad + 1.0,
            y1: (oy + layout.height() as f64).ceil() + pad + 1.0,
        };
        let pivot = (ox + layout.width as f64 / 2.0, oy + px as f64 / 2.0);

        // Part of the unrotated layer that can land on the canvas.
        let screen = Bounds {
            x0: 0.0,
            y0: 0.0,
            x1: canvas.width() as f64,
            y1: canvas.height() as f64,
        };
        let reachable = if el.rotation == 0.0 {
            screen
        } else {
            screen.unrotated(pivot, el.rotation as f64)
        };
        let visible = full.intersect(reachable);
        if visible.is_empty() {
            return Ok(());
        }
        let window = visible.grow(margin).intersect(full).snapped();
        let (w, h) = (window.x1 - window.x0, window.y1 - window.y0);
        if w * h > MAX_LAYER_PIXELS {
            return Err(EditorError::Render(format!(
                "text layer of {}x{} px is too large",
                w, h
            )));
        }
        let (w, h) = (w as u32, h as u32);

        let left = (ox - window.x0) as f32;
        let top = (oy - window.y0) as f32;
        let coverage = rasterize_line(font, &layout, px, left, top, w, h)?;
        if coverage.is_blank() {
            return Ok(());
        }

        // Fill
        let fill = if el.gradient.enabled {
            Fill::Linear {
                x0: left,
                x1: left + layout.width,
                from: el.gradient.colors[0],
                to: el.gradient.colors[1],
            }
        } else {
            Fill::Solid(el.color)
        };
        let filled = fill_layer(&coverage, &fill);

        // Shadow belongs to the fill pass only.
        let mut layer = if el.shadow.enabled {
            let mut shadowed = drop_shadow(&filled, sdx, sdy, sigma, el.shadow.color);
            overlay(&mut shadowed, &filled);
            shadowed
        } else {
            filled
        };

        // Stroke
        if half_stroke > 0.0 {
            let band = stroke_band(&coverage, half_stroke);
            paint_coverage(&mut layer, &band, el.stroke);
        }

        let opacity = el.opacity.clamp(0.0, 1.0);
        if el.rotation == 0.0 {
            // The window overlaps the canvas and is bounded in size, so it fits i32.
            blit(canvas, &layer, window.x0 as i32, window.y0 as i32, opacity);
        } else {
            blit_rotated(
                canvas,
                &layer,
                (window.x0 as f32, window.y0 as f32),
                (pivot.0 as f32, pivot.1 as f32),
                el.rotation,
                opacity,
            );
        }
        Ok(())
    }
}

/// Largest layer painted for one element, in pixels.
const MAX_LAYER_PIXELS: f64 = (1u64 << 25) as f64;
/// Largest stroke half-width or shadow blur reach, in pixels.
const MAX_EFFECT_REACH: f32 = 512.0;

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

fn ink_extent(font: &dyn GlyphSource, glyphs: &[(char, f32)], px: f32, width: f32) -> (f32, f32) {
    let mut lo = 0.0f32;
    let mut hi = width.max(0.0);
    for &(ch, x) in glyphs {
        lo = lo.min(x);
        hi = hi.max(x + font.advance(ch, px));
    }
    (lo, hi)
}

/// Axis-aligned box in canvas pixels, kept in f64 so distant elements
/// never go through an integer cast.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Bounds {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Bounds {
    fn is_empty(&self) -> bool {
        !(self.x0 < self.x1 && self.y0 < self.y1)
    }

    fn intersect(self, other: Bounds) -> Bounds {
        Bounds {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    fn grow(self, by: f64) -> Bounds {
        Bounds {
            x0: self.x0 - by,
            y0: self.y0 - by,
            x1: self.x1 + by,
            y1: self.y1 + by,
        }
    }

    /// Outward to whole pixels.
    fn snapped(self) -> Bounds {
        Bounds {
            x0: self.x0.floor(),
            y0: self.y0.floor(),
            x1: self.x1.ceil(),
            y1: self.y1.ceil(),
        }
    }

    /// Box around these corners turned back by `degrees` about `pivot`:
    /// the unrotated points that a clockwise rotation carries into `self`.
    fn unrotated(self, pivot: (f64, f64), degrees: f64) -> Bounds {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let corners = [
            (self.x0, self.y0),
            (self.x1, self.y0),
            (self.x0, self.y1),
            (self.x1, self.y1),
        ];
        let mut out = Bounds {
            x0: f64::INFINITY,
            y0: f64::INFINITY,
            x1: f64::NEG_INFINITY,
            y1: f64::NEG_INFINITY,
        };
        for (cx, cy) in corners {
            let (dx, dy) = (cx - pivot.0, cy - pivot.1);
            let lx = pivot.0 + cos * dx + sin * dy;
            let ly = pivot.1 - sin * dx + cos * dy;
            out.x0 = out.x0.min(lx);
            out.y0 = out.y0.min(ly);
            out.x1 = out.x1.max(lx);
            out.y1 = out.y1.max(ly);
        }
        out
    }
}
