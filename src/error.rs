use image::ImageError;

/// Errors surfaced by the editing core.
///
/// `InvalidImage` and `InvalidTransform` are the two preconditions of the
/// compositing pipeline; the rest come from file handling around it.
#[derive(Debug)]
pub enum EditorError {
    /// Zero-sized raster, or bytes that do not decode to an image.
    InvalidImage(String),
    /// The display container has no area, so no viewport transform exists yet.
    InvalidTransform { width: f64, height: f64 },
    Io(std::io::Error),
    Image(ImageError),
    /// Malformed project or layer file.
    Project(String),
    /// A text element whose layer, glyphs or effects are too large to paint.
    Render(String),
}

impl EditorError {
    /// `InvalidTransform` means "try again once the container has a size",
    /// not a failure worth reporting.
    pub fn is_deferred(&self) -> bool {
        matches!(self, EditorError::InvalidTransform { .. })
    }
}

impl std::fmt::Display for EditorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditorError::InvalidImage(e) => write!(f, "Invalid image: {}", e),
            EditorError::InvalidTransform { width, height } => write!(
                f,
                "No viewport transform for a {}x{} container",
                width, height
            ),
            EditorError::Io(e) => write!(f, "I/O error: {}", e),
            EditorError::Image(e) => write!(f, "Image codec error: {}", e),
            EditorError::Project(e) => write!(f, "Invalid project file: {}", e),
            EditorError::Render(e) => write!(f, "Cannot render text: {}", e),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditorError::Io(e) => Some(e),
            EditorError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EditorError {
    fn from(e: std::io::Error) -> Self {
        EditorError::Io(e)
    }
}

impl From<ImageError> for EditorError {
    fn from(e: ImageError) -> Self {
        EditorError::Image(e)
    }
}

impl From<Box<bincode::ErrorKind>> for EditorError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EditorError::Project(e.to_string())
    }
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Project(e.to_string())
    }
}
