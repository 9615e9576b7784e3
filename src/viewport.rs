// ============================================================================
// VIEWPORT — letterboxed "contain" fit of the image inside the edit surface
// ============================================================================

use crate::coords::{Point, Size};
use crate::error::EditorError;

/// Placement of an intrinsic-resolution image inside a display container.
///
/// Never mutated in place: a resize of the container or a new image produces a
/// fresh transform through [`ViewportTransform::fit`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportTransform {
    pub intrinsic: Size,
    pub displayed: Size,
    /// Letterbox padding; at most one axis is non-zero.
    pub offset: Point,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl ViewportTransform {
    /// Object-fit "contain" of a `intrinsic_w`×`intrinsic_h` image into a
    /// `container_w`×`container_h` rectangle.
    pub fn fit(
        intrinsic_w: f64,
        intrinsic_h: f64,
        container_w: f64,
        container_h: f64,
    ) -> Result<Self, EditorError> {
        let intrinsic = Size::new(intrinsic_w, intrinsic_h);
        let container = Size::new(container_w, container_h);
        if !intrinsic.has_area() {
            return Err(EditorError::InvalidImage(format!(
                "intrinsic size {}x{} has no area",
                intrinsic_w, intrinsic_h
            )));
        }
        if !container.has_area() {
            return Err(EditorError::InvalidTransform {
                width: container_w,
                height: container_h,
            });
        }

        let img_ar = intrinsic.aspect_ratio();
        let container_ar = container.aspect_ratio();

        let (displayed, offset) = if img_ar > container_ar {
            let displayed_w = container_w;
            let displayed_h = displayed_w / img_ar;
            (
                Size::new(displayed_w, displayed_h),
                Point::new(0.0, (container_h - displayed_h) / 2.0),
            )
        } else {
            let displayed_h = container_h;
            let displayed_w = displayed_h * img_ar;
            (
                Size::new(displayed_w, displayed_h),
                Point::new((container_w - displayed_w) / 2.0, 0.0),
            )
        };

        Ok(Self {
            intrinsic,
            displayed,
            offset,
            scale_x: intrinsic_w / displayed.width,
            scale_y: intrinsic_h / displayed.height,
        })
    }

    /// Identity mapping for an image edited at its native size.
    pub fn identity(width: u32, height: u32) -> Result<Self, EditorError> {
        Self::fit(width as f64, height as f64, width as f64, height as f64)
    }

    /// Container size this transform was fitted into.
    pub fn container(&self) -> Size {
        Size::new(
            self.displayed.width + 2.0 * self.offset.x,
            self.displayed.height + 2.0 * self.offset.y,
        )
    }

    /// Edit-space point → intrinsic pixel coordinates.
    #[inline]
    pub fn to_intrinsic(&self, edit: Point) -> Point {
        Point::new(
            (edit.x - self.offset.x) * self.scale_x,
            (edit.y - self.offset.y) * self.scale_y,
        )
    }

    /// Intrinsic pixel coordinates → edit-space point.
    #[inline]
    pub fn to_edit(&self, intrinsic: Point) -> Point {
        Point::new(
            intrinsic.x / self.scale_x + self.offset.x,
            intrinsic.y / self.scale_y + self.offset.y,
        )
    }

    /// Whether an edit-space point lies on the displayed image (not the letterbox).
    pub fn contains(&self, edit: Point) -> bool {
        edit.x >= self.offset.x
            && edit.y >= self.offset.y
            && edit.x <= self.offset.x + self.displayed.width
            && edit.y <= self.offset.y + self.displayed.height
    }
}
