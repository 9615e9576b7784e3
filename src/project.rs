use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::validate_raster;
use crate::components::drag::{DragController, DragResponse, DragSurface, PointerTarget};
use crate::components::layers::{ElementId, LayerCommand, TextLayers};
use crate::coords::{Point, Size};
use crate::error::EditorError;
use crate::io::{ProjectFile, decode_image, load_project, save_project};
use crate::ops::compositor::Compositor;
use crate::ops::segment::{Phase, SegmentJob};
use crate::viewport::ViewportTransform;

/// One editing session: the uploaded photo, its cutout, the text layers and
/// the interaction state around them.
pub struct Project {
    pub id: Uuid,
    /// `None` until saved or opened from a file.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (derived from the photo or project path, or "Untitled-X")
    pub name: String,

    background: Option<Arc<RgbaImage>>,
    foreground: Option<Arc<RgbaImage>>,
    pending: Option<SegmentJob>,
    layers: TextLayers,
    container: Size,
    viewport: Option<ViewportTransform>,
    drag: DragController,
    compositor: Compositor,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, compositor: Compositor) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
            background: None,
            foreground: None,
            pending: None,
            layers: TextLayers::new(),
            container: Size::default(),
            viewport: None,
            drag: DragController::default(),
            compositor,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Name with a dirty indicator.
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    // -- Upload + segmentation ---------------------------------------------

    /// Start a session on a new photo: validate it, drop the previous layers
    /// and begin background removal on the worker pool.
    ///
    /// An invalid photo is rejected before anything changes.
    pub fn upload(
        &mut self,
        photo: RgbaImage,
        on_phase: Option<Box<dyn FnMut(Phase)>>,
    ) -> Result<(), EditorError> {
        validate_raster(&photo, "photo")?;
        log_info!("Upload {}x{} into '{}'", photo.width(), photo.height(), self.name);

        let photo = Arc::new(photo);
        self.pending = Some(SegmentJob::spawn(Arc::clone(&photo), on_phase));
        self.background = Some(photo);
        self.foreground = None;
        self.layers.apply(LayerCommand::Clear);
        self.drag.cancel();
        self.refresh_viewport();
        self.mark_dirty();
        Ok(())
    }

    /// Decode `path` and [`upload`](Self::upload) it.
    pub fn upload_file(
        &mut self,
        path: &Path,
        on_phase: Option<Box<dyn FnMut(Phase)>>,
    ) -> Result<(), EditorError> {
        let photo = decode_image(path)?;
        self.upload(photo, on_phase)?;
        if let Some(stem) = path.file_stem() {
            self.name = stem.to_string_lossy().into_owned();
        }
        Ok(())
    }

    /// Non-blocking check on the running segmentation. `Some` once it ended.
    pub fn poll_segmentation(&mut self) -> Option<Result<(), EditorError>> {
        let done = self.pending.as_mut()?.poll()?;
        self.pending = None;
        Some(self.accept_cutout(done))
    }

    /// Block until the running segmentation (if any) has finished.
    pub fn finish_segmentation(&mut self) -> Result<(), EditorError> {
        match self.pending.take() {
            Some(job) => self.accept_cutout(job.wait()),
            None if self.foreground.is_some() => Ok(()),
            None => Err(EditorError::InvalidImage("no photo uploaded".into())),
        }
    }

    fn accept_cutout(&mut self, result: Result<RgbaImage, EditorError>) -> Result<(), EditorError> {
        match result {
            Ok(cutout) => {
                self.foreground = Some(Arc::new(cutout));
                Ok(())
            }
            Err(e) => {
                log_err!("Segmentation failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_processing(&self) -> bool {
        self.pending.is_some()
    }

    /// Photo and cutout are both available.
    pub fn is_ready(&self) -> bool {
        self.pending.is_none() && self.background.is_some() && self.foreground.is_some()
    }

    pub fn background(&self) -> Option<&RgbaImage> {
        self.background.as_deref()
    }

    pub fn foreground(&self) -> Option<&RgbaImage> {
        self.foreground.as_deref()
    }

    fn require_ready(&self) -> Result<(&RgbaImage, &RgbaImage), EditorError> {
        match (&self.background, &self.foreground, &self.pending) {
            (Some(bg), Some(fg), None) => Ok((bg, fg)),
            (None, _, _) => Err(EditorError::InvalidImage("no photo uploaded".into())),
            _ => Err(EditorError::InvalidImage(
                "background removal has not finished".into(),
            )),
        }
    }

    // -- Viewport ----------------------------------------------------------

    /// The edit surface was laid out at `origin` with `size` (pointer coordinates).
    ///
    /// A zero-area container leaves the project without a transform and
    /// reports `InvalidTransform`; call again once it has a size.
    pub fn set_container(&mut self, origin: Point, size: Size) -> Result<(), EditorError> {
        self.container = size;
        self.drag.set_surface(DragSurface { origin, size });
        self.refresh_viewport();
        match (&self.viewport, &self.background) {
            (None, Some(_)) => Err(EditorError::InvalidTransform {
                width: size.width,
                height: size.height,
            }),
            _ => Ok(()),
        }
    }

    fn refresh_viewport(&mut self) {
        self.viewport = self.background.as_ref().and_then(|bg| {
            ViewportTransform::fit(
                bg.width() as f64,
                bg.height() as f64,
                self.container.width,
                self.container.height,
            )
            .ok()
        });
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn viewport(&self) -> Option<&ViewportTransform> {
        self.viewport.as_ref()
    }

    // -- Layers ------------------------------------------------------------

    pub fn layers(&self) -> &TextLayers {
        &self.layers
    }

    /// Apply a layer command; marks the project dirty when it changed anything.
    pub fn apply(&mut self, cmd: LayerCommand) -> Option<ElementId> {
        let before = self.layers.version();
        let created = self.layers.apply(cmd);
        if self.layers.version() != before {
            self.mark_dirty();
        }
        created
    }

    /// New default element; only offered once the cutout exists.
    pub fn add_text(&mut self) -> Result<ElementId, EditorError> {
        self.require_ready()?;
        self.apply(LayerCommand::Add)
            .ok_or_else(|| EditorError::Project("element was not created".into()))
    }

    /// Topmost visible element under `pointer`, by its unrotated rendered box.
    pub fn element_at(&self, pointer: Point) -> PointerTarget {
        let local = pointer - self.drag.surface().origin;
        self.layers
            .elements()
            .iter()
            .rev()
            .filter(|el| el.visible)
            .find(|el| {
                let size = self.compositor.measure(el);
                local.x >= el.x
                    && local.y >= el.y
                    && local.x <= el.x + size.width
                    && local.y <= el.y + size.height
            })
            .map(|el| PointerTarget::Element(el.id))
            .unwrap_or(PointerTarget::Empty)
    }

    // -- Rendering ---------------------------------------------------------

    /// Full-resolution export of the current layers.
    pub fn export(&self) -> Result<RgbaImage, EditorError> {
        let (bg, fg) = self.require_ready()?;
        let viewport = self.viewport.ok_or(EditorError::InvalidTransform {
            width: self.container.width,
            height: self.container.height,
        })?;
        let elements = self.layers.snapshot();
        log_info!(
            "Export '{}': {} elements at {}x{}",
            self.name,
            elements.len(),
            bg.width(),
            bg.height()
        );
        self.compositor.composite(bg, fg, &elements, &viewport)
    }

    /// What the edit surface shows, at container resolution.
    pub fn preview(&self) -> Result<RgbaImage, EditorError> {
        let (bg, fg) = self.require_ready()?;
        let viewport = self.viewport.ok_or(EditorError::InvalidTransform {
            width: self.container.width,
            height: self.container.height,
        })?;
        self.compositor
            .render_preview(bg, fg, self.layers.elements(), &viewport)
    }

    // -- Pointer -----------------------------------------------------------

    /// Route pointer events to the drag controller for the lifetime of the
    /// returned guard. Dropping it mid-gesture cancels the drag.
    pub fn capture_pointer(&mut self) -> PointerCapture<'_> {
        PointerCapture { project: self }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    // -- Persistence -------------------------------------------------------

    pub fn to_project_file(&self) -> Result<ProjectFile, EditorError> {
        let (bg, fg) = self.require_ready()?;
        Ok(ProjectFile::new(bg, fg, self.container, self.layers.snapshot()))
    }

    /// Session from a saved file; the cutout is taken as stored.
    pub fn from_project_file(
        file: ProjectFile,
        name: String,
        compositor: Compositor,
    ) -> Result<Self, EditorError> {
        let background = file.background_image()?;
        let foreground = file.foreground_image()?;
        let mut project = Self::new_untitled(0, compositor);
        project.name = name;
        project.background = Some(Arc::new(background));
        project.foreground = Some(Arc::new(foreground));
        project.layers = TextLayers::from_elements(file.elements);
        project.container = file.container;
        project.drag.set_surface(DragSurface {
            origin: Point::zero(),
            size: file.container,
        });
        project.refresh_viewport();
        Ok(project)
    }

    pub fn save(&mut self, path: &Path) -> Result<(), EditorError> {
        save_project(&self.to_project_file()?, path)?;
        self.path = Some(path.to_path_buf());
        self.mark_clean();
        log_info!("Saved project to {}", path.display());
        Ok(())
    }

    pub fn open(path: &Path, compositor: Compositor) -> Result<Self, EditorError> {
        let file = load_project(path)?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let mut project = Self::from_project_file(file, name, compositor)?;
        project.path = Some(path.to_path_buf());
        Ok(project)
    }
}

/// Scoped pointer subscription on a [`Project`].
pub struct PointerCapture<'a> {
    project: &'a mut Project,
}

impl PointerCapture<'_> {
    pub fn down(&mut self, pointer: Point, target: PointerTarget) {
        let p = &mut *self.project;
        if let PointerTarget::Element(id) = target
            && let Some(el) = p.layers.get(id)
        {
            let size = p.compositor.measure(el);
            p.drag.report_element_size(id, size);
        }
        p.drag.pointer_down(&mut p.layers, pointer, target);
    }

    /// Press at `pointer` on whatever element lies there.
    pub fn down_at(&mut self, pointer: Point) {
        let target = self.project.element_at(pointer);
        self.down(pointer, target);
    }

    pub fn moved(&mut self, pointer: Point) -> DragResponse {
        let p = &mut *self.project;
        let response = p.drag.pointer_move(&mut p.layers, pointer);
        if matches!(response, DragResponse::Moved { .. }) {
            p.mark_dirty();
        }
        response
    }

    pub fn up(&mut self) {
        self.project.drag.pointer_up();
    }
}

impl Drop for PointerCapture<'_> {
    fn drop(&mut self) {
        self.project.drag.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers::TextElementPatch;
    use crate::ops::text::FontBook;
    use image::Rgba;

    fn photo() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(100, 50, Rgba([250, 250, 250, 255]));
        for y in 20..30 {
            for x in 40..60 {
                img.put_pixel(x, y, Rgba([200, 30, 30, 255]));
            }
        }
        img
    }

    fn ready_project() -> Project {
        let mut p = Project::new_untitled(1, Compositor::new(FontBook::blocks()));
        p.upload(photo(), None).unwrap();
        p.finish_segmentation().unwrap();
        p.set_container(Point::zero(), Size::new(200.0, 200.0))
            .unwrap();
        p
    }

    #[test]
    fn invalid_upload_keeps_prior_session() {
        let mut p = ready_project();
        let id = p.add_text().unwrap();
        let err = p.upload(RgbaImage::new(0, 10), None).unwrap_err();
        assert!(matches!(err, EditorError::InvalidImage(_)));
        assert!(p.is_ready());
        assert!(p.layers().get(id).is_some());
        assert_eq!(p.background().unwrap().dimensions(), (100, 50));
    }

    #[test]
    fn text_waits_for_segmentation() {
        let mut p = Project::new_untitled(1, Compositor::new(FontBook::blocks()));
        assert!(p.add_text().is_err());
        p.upload(photo(), None).unwrap();
        p.finish_segmentation().unwrap();
        assert!(p.is_ready());
        assert!(p.add_text().is_ok());
    }

    #[test]
    fn new_upload_clears_layers() {
        let mut p = ready_project();
        p.add_text().unwrap();
        p.upload(photo(), None).unwrap();
        assert!(p.layers().is_empty());
        assert!(p.layers().selected().is_none());
    }

    #[test]
    fn cutout_clears_the_background() {
        let p = ready_project();
        let fg = p.foreground().unwrap();
        assert_eq!(fg.get_pixel(0, 0)[3], 0);
        assert_eq!(fg.get_pixel(50, 25)[3], 255);
    }

    #[test]
    fn export_without_container_is_deferred() {
        let mut p = Project::new_untitled(1, Compositor::new(FontBook::blocks()));
        p.upload(photo(), None).unwrap();
        p.finish_segmentation().unwrap();
        assert!(p.export().unwrap_err().is_deferred());
        assert!(p
            .set_container(Point::zero(), Size::new(0.0, 100.0))
            .unwrap_err()
            .is_deferred());
        p.set_container(Point::zero(), Size::new(200.0, 200.0))
            .unwrap();
        assert_eq!(p.export().unwrap().dimensions(), (100, 50));
    }

    #[test]
    fn export_is_at_intrinsic_size_and_preview_at_container_size() {
        let mut p = ready_project();
        p.add_text().unwrap();
        assert_eq!(p.export().unwrap().dimensions(), (100, 50));
        assert_eq!(p.preview().unwrap().dimensions(), (200, 200));
    }

    #[test]
    fn drag_moves_and_clamps_through_the_capture() {
        let mut p = ready_project();
        let id = p.add_text().unwrap();
        p.apply(LayerCommand::Update(
            id,
            TextElementPatch {
                text: Some("Hi".into()),
                font_size: Some(10.0),
                ..Default::default()
            },
        ));
        {
            let mut cap = p.capture_pointer();
            cap.down_at(Point::new(52.0, 52.0));
            assert_eq!(cap.moved(Point::new(54.0, 52.0)), DragResponse::Pending);
            cap.moved(Point::new(500.0, 52.0));
            cap.up();
        }
        let el = p.layers().get(id).unwrap();
        // Block glyphs: "Hi" at size 10 measures 12 wide.
        assert_eq!(el.x, 200.0 - 12.0);
        assert_eq!(el.y, 50.0);
        assert_eq!(p.layers().selected(), Some(id));
    }

    #[test]
    fn dropping_the_capture_cancels_a_drag() {
        let mut p = ready_project();
        let id = p.add_text().unwrap();
        {
            let mut cap = p.capture_pointer();
            cap.down(Point::new(60.0, 60.0), PointerTarget::Element(id));
            cap.moved(Point::new(80.0, 60.0));
        }
        assert!(!p.is_dragging());
    }

    #[test]
    fn empty_press_deselects() {
        let mut p = ready_project();
        p.add_text().unwrap();
        let mut cap = p.capture_pointer();
        cap.down_at(Point::new(5.0, 190.0));
        drop(cap);
        assert!(p.layers().selected().is_none());
    }

    #[test]
    fn project_file_restores_the_session() {
        let mut p = ready_project();
        let id = p.add_text().unwrap();
        let file = p.to_project_file().unwrap();
        let restored =
            Project::from_project_file(file, "copy".into(), Compositor::new(FontBook::blocks()))
                .unwrap();
        assert!(restored.is_ready());
        assert_eq!(restored.container(), Size::new(200.0, 200.0));
        assert_eq!(restored.layers().get(id), p.layers().get(id));
        assert_eq!(restored.export().unwrap(), p.export().unwrap());
    }

    #[test]
    fn dirty_flag_shows_in_title() {
        let mut p = Project::new_untitled(3, Compositor::new(FontBook::blocks()));
        assert_eq!(p.display_title(), "Untitled-3");
        p.upload(photo(), None).unwrap();
        assert_eq!(p.display_title(), "Untitled-3*");
        p.mark_clean();
        assert_eq!(p.display_title(), "Untitled-3");
    }
}
