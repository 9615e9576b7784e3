// ============================================================================
// DRAG CONTROLLER — pointer events → clamped element moves
// ============================================================================

use crate::components::layers::{ElementId, TextElement, TextLayers};
use crate::coords::{Point, Size};

/// Minimum pointer travel (edit-space px) before a press becomes a drag.
pub const DRAG_THRESHOLD: f64 = 5.0;

/// Used when the element's rendered size has not been reported.
const FALLBACK_WIDTH_FACTOR: f64 = 0.6;
const FALLBACK_HEIGHT_FACTOR: f64 = 1.2;
const FALLBACK_EXTENT: f64 = 50.0;

/// What the pointer went down on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Element(ElementId),
    /// A property panel or toolbar; selection is kept.
    Panel,
    /// Anywhere else; selection is cleared.
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle,
    /// Pressed on an element, not yet past the threshold.
    Armed {
        element: ElementId,
        initial_pointer: Point,
        drag_offset: Point,
    },
    Dragging {
        element: ElementId,
        drag_offset: Point,
    },
}

/// Result of a pointer move, for the host's event handling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragResponse {
    /// No press in progress.
    Ignored,
    /// Pressed but still inside the threshold; the host may treat it as a click.
    Pending,
    /// The element moved. The host must suppress default handling (caret placement).
    Moved { element: ElementId, position: Point },
}

impl DragResponse {
    pub fn suppress_default(&self) -> bool {
        matches!(self, DragResponse::Moved { .. })
    }
}

/// Edit surface in pointer coordinates: where the container starts and how big it is.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DragSurface {
    pub origin: Point,
    pub size: Size,
}

/// Turns pointer-down/move/up into position updates on a [`TextLayers`].
///
/// Positions only change in [`DragState::Dragging`]; a press that never
/// crosses [`DRAG_THRESHOLD`] leaves the element where it was.
#[derive(Clone, Debug)]
pub struct DragController {
    state: DragState,
    surface: DragSurface,
    /// Live rendered size of an element, when the host has measured it.
    measured: Option<(ElementId, Size)>,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new(DragSurface::default())
    }
}

impl DragController {
    pub fn new(surface: DragSurface) -> Self {
        Self {
            state: DragState::Idle,
            surface,
            measured: None,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn surface(&self) -> DragSurface {
        self.surface
    }

    pub fn set_surface(&mut self, surface: DragSurface) {
        self.surface = surface;
    }

    /// Host-supplied bounding box of a rendered element.
    pub fn report_element_size(&mut self, element: ElementId, size: Size) {
        if size.width.is_finite() && size.height.is_finite() {
            self.measured = Some((element, size));
        }
    }

    pub fn pointer_down(&mut self, layers: &mut TextLayers, pointer: Point, target: PointerTarget) {
        match target {
            PointerTarget::Element(id) => {
                layers.select(Some(id));
                self.state = match layers.get(id) {
                    Some(el) => DragState::Armed {
                        element: id,
                        initial_pointer: pointer,
                        drag_offset: pointer - self.surface.origin - el.position(),
                    },
                    None => DragState::Idle,
                };
            }
            PointerTarget::Panel => {}
            PointerTarget::Empty => {
                layers.select(None);
                self.state = DragState::Idle;
            }
        }
    }

    pub fn pointer_move(&mut self, layers: &mut TextLayers, pointer: Point) -> DragResponse {
        let (element, drag_offset) = match self.state {
            DragState::Idle => return DragResponse::Ignored,
            DragState::Armed {
                element,
                initial_pointer,
                drag_offset,
            } => {
                if pointer.distance(initial_pointer) <= DRAG_THRESHOLD {
                    return DragResponse::Pending;
                }
                self.state = DragState::Dragging {
                    element,
                    drag_offset,
                };
                (element, drag_offset)
            }
            DragState::Dragging {
                element,
                drag_offset,
            } => (element, drag_offset),
        };

        let Some(el) = layers.get(element) else {
            // Removed mid-drag.
            self.state = DragState::Idle;
            return DragResponse::Ignored;
        };

        let extent = self.element_extent(el);
        let raw = pointer - self.surface.origin - drag_offset;
        let position = Point::new(
            clamp_axis(raw.x, self.surface.size.width - extent.width),
            clamp_axis(raw.y, self.surface.size.height - extent.height),
        );
        layers.move_element(element, position);
        DragResponse::Moved { element, position }
    }

    /// Ends any press or drag. The selection is kept.
    pub fn pointer_up(&mut self) {
        self.state = DragState::Idle;
    }

    /// Same as [`pointer_up`](Self::pointer_up); used when the pointer
    /// subscription is torn down mid-gesture.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    fn element_extent(&self, el: &TextElement) -> Size {
        if let Some((id, size)) = self.measured
            && id == el.id
        {
            return size;
        }
        let font_size = el.font_size as f64;
        let chars = el.text.chars().count() as f64;
        let w = font_size * chars * FALLBACK_WIDTH_FACTOR;
        let h = font_size * FALLBACK_HEIGHT_FACTOR;
        Size::new(
            if w > 0.0 { w } else { FALLBACK_EXTENT },
            if h > 0.0 { h } else { FALLBACK_EXTENT },
        )
    }
}

/// `max(0, min(limit, v))`: an element larger than the container pins to 0.
#[inline]
fn clamp_axis(v: f64, limit: f64) -> f64 {
    v.min(limit).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers::TextElementPatch;

    fn setup() -> (DragController, TextLayers, ElementId) {
        let mut layers = TextLayers::new();
        let id = layers.add_element();
        layers.update_element(
            id,
            TextElementPatch {
                text: Some("Hi".into()),
                font_size: Some(10.0),
                x: Some(100.0),
                y: Some(100.0),
                ..Default::default()
            },
        );
        let ctl = DragController::new(DragSurface {
            origin: Point::new(10.0, 20.0),
            size: Size::new(400.0, 300.0),
        });
        (ctl, layers, id)
    }

    #[test]
    fn press_arms_with_offset_from_element_corner() {
        let (mut ctl, mut layers, id) = setup();
        layers.select(None);
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        assert_eq!(layers.selected(), Some(id));
        assert_eq!(
            ctl.state(),
            DragState::Armed {
                element: id,
                initial_pointer: Point::new(115.0, 125.0),
                drag_offset: Point::new(5.0, 5.0),
            }
        );
    }

    #[test]
    fn small_move_is_a_click() {
        let (mut ctl, mut layers, id) = setup();
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        let resp = ctl.pointer_move(&mut layers, Point::new(118.0, 125.0));
        assert_eq!(resp, DragResponse::Pending);
        assert!(!resp.suppress_default());
        assert_eq!(layers.get(id).unwrap().position(), Point::new(100.0, 100.0));
        ctl.pointer_up();
        assert_eq!(ctl.state(), DragState::Idle);
        assert_eq!(layers.selected(), Some(id));
        assert_eq!(layers.get(id).unwrap().position(), Point::new(100.0, 100.0));
    }

    #[test]
    fn move_past_threshold_drags() {
        let (mut ctl, mut layers, id) = setup();
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        let resp = ctl.pointer_move(&mut layers, Point::new(122.0, 125.0));
        assert!(resp.suppress_default());
        assert!(ctl.is_dragging());
        assert_eq!(layers.get(id).unwrap().position(), Point::new(107.0, 100.0));

        // Once dragging, small moves apply too.
        ctl.pointer_move(&mut layers, Point::new(123.0, 126.0));
        assert_eq!(layers.get(id).unwrap().position(), Point::new(108.0, 101.0));
    }

    #[test]
    fn drag_clamps_to_container_using_fallback_size() {
        let (mut ctl, mut layers, id) = setup();
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        ctl.pointer_move(&mut layers, Point::new(5000.0, 5000.0));
        let el = layers.get(id).unwrap();
        // "Hi" at 10px: 10 * 2 * 0.6 = 12 wide, 12 tall.
        assert_eq!(el.position(), Point::new(400.0 - 12.0, 300.0 - 12.0));

        ctl.pointer_move(&mut layers, Point::new(-5000.0, -5000.0));
        assert_eq!(layers.get(id).unwrap().position(), Point::new(0.0, 0.0));
    }

    #[test]
    fn drag_clamps_with_measured_size() {
        let (mut ctl, mut layers, id) = setup();
        ctl.report_element_size(id, Size::new(100.0, 40.0));
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        ctl.pointer_move(&mut layers, Point::new(5000.0, 5000.0));
        assert_eq!(layers.get(id).unwrap().position(), Point::new(300.0, 260.0));
    }

    #[test]
    fn empty_text_uses_fixed_fallback() {
        let (mut ctl, mut layers, id) = setup();
        layers.update_element(
            id,
            TextElementPatch {
                text: Some(String::new()),
                ..Default::default()
            },
        );
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        ctl.pointer_move(&mut layers, Point::new(5000.0, 125.0));
        assert_eq!(layers.get(id).unwrap().x, 400.0 - 50.0);
    }

    #[test]
    fn clamped_positions_stay_in_bounds() {
        let (mut ctl, mut layers, id) = setup();
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        for i in -20..20 {
            let p = Point::new(115.0 + i as f64 * 37.0, 125.0 - i as f64 * 29.0);
            ctl.pointer_move(&mut layers, p);
            let el = layers.get(id).unwrap();
            assert!(el.x >= 0.0 && el.x <= 400.0 - 12.0);
            assert!(el.y >= 0.0 && el.y <= 300.0 - 12.0);
        }
    }

    #[test]
    fn press_on_empty_space_deselects_but_panel_does_not() {
        let (mut ctl, mut layers, id) = setup();
        ctl.pointer_down(&mut layers, Point::new(0.0, 0.0), PointerTarget::Panel);
        assert_eq!(layers.selected(), Some(id));
        ctl.pointer_down(&mut layers, Point::new(0.0, 0.0), PointerTarget::Empty);
        assert_eq!(layers.selected(), None);
        assert_eq!(ctl.state(), DragState::Idle);
    }

    #[test]
    fn moves_without_press_are_ignored() {
        let (mut ctl, mut layers, id) = setup();
        assert_eq!(ctl.pointer_move(&mut layers, Point::new(300.0, 300.0)), DragResponse::Ignored);
        assert_eq!(layers.get(id).unwrap().position(), Point::new(100.0, 100.0));
    }

    #[test]
    fn element_removed_mid_drag_resets() {
        let (mut ctl, mut layers, id) = setup();
        ctl.pointer_down(&mut layers, Point::new(115.0, 125.0), PointerTarget::Element(id));
        layers.remove_element(id);
        assert_eq!(ctl.pointer_move(&mut layers, Point::new(200.0, 200.0)), DragResponse::Ignored);
        assert_eq!(ctl.state(), DragState::Idle);
    }
}
