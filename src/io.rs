use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageError, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canvas::{fit_to, validate_raster};
use crate::components::layers::TextElement;
use crate::coords::Size;
use crate::error::EditorError;

/// File name offered for an export when the caller gives none.
pub const EXPORT_FILE_NAME: &str = "edited-image.png";

/// Common RAW camera file extensions (lowercase).
pub const RAW_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "dng", "orf", "rw2", "pef", "raf", "raw",
    "rwl", "srw", "x3f", "3fr", "fff", "iiq", "mrw", "mef", "mos", "kdc", "dcr", "erf",
];

pub fn is_raw_extension(ext: &str) -> bool {
    RAW_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode a RAW camera file to 8-bit sRGB through imagepipe's demosaic pipeline.
pub fn decode_raw_image(path: &Path) -> Result<RgbaImage, EditorError> {
    let mut pipeline = imagepipe::Pipeline::new_from_file(path)
        .map_err(|e| EditorError::InvalidImage(format!("RAW decode error: {}", e)))?;
    let srgb = pipeline
        .output_8bit(None)
        .map_err(|e| EditorError::InvalidImage(format!("RAW processing error: {}", e)))?;

    let pixel_count = srgb.width * srgb.height;
    if srgb.data.len() < pixel_count * 3 {
        return Err(EditorError::InvalidImage(format!(
            "RAW buffer too short: expected {} bytes, got {}",
            pixel_count * 3,
            srgb.data.len()
        )));
    }
    let mut rgba = Vec::with_capacity(pixel_count * 4);
    for px in srgb.data[..pixel_count * 3].chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    RgbaImage::from_raw(srgb.width as u32, srgb.height as u32, rgba)
        .ok_or_else(|| EditorError::InvalidImage("RAW dimensions do not match its data".into()))
}

/// Decode any supported photo to RGBA. Undecodable or empty images are
/// `InvalidImage`; a missing file stays an I/O error.
pub fn decode_image(path: &Path) -> Result<RgbaImage, EditorError> {
    let img = if is_raw_extension(&extension_of(path)) {
        decode_raw_image(path)?
    } else {
        image::open(path).map_err(decode_error)?.to_rgba8()
    };
    validate_raster(&img, &path.display().to_string())?;
    Ok(img)
}

/// Decode an in-memory encoded image (PNG, JPEG, ...).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, EditorError> {
    let img = image::load_from_memory(bytes).map_err(decode_error)?.to_rgba8();
    validate_raster(&img, "uploaded image")?;
    Ok(img)
}

fn decode_error(e: ImageError) -> EditorError {
    match e {
        ImageError::IoError(io) => EditorError::Io(io),
        other => EditorError::InvalidImage(other.to_string()),
    }
}

// ============================================================================
// ENCODE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl ExportFormat {
    /// Format by file extension; anything unrecognised exports as PNG.
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_str() {
            "jpg" | "jpeg" => ExportFormat::Jpeg,
            "webp" => ExportFormat::Webp,
            "bmp" => ExportFormat::Bmp,
            _ => ExportFormat::Png,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Bmp => "bmp",
        }
    }
}

/// Encode and write an image. No `&self`, so it can run from `rayon::spawn`.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: ExportFormat,
    quality: u8,
) -> Result<(), EditorError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        ExportFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        ExportFormat::Webp => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save(path)?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
    }
    log_info!(
        "Wrote {}x{} {:?} to {}",
        image.width(),
        image.height(),
        format,
        path.display()
    );
    Ok(())
}

// ============================================================================
// LAYER FILES
// ============================================================================

/// Read a JSON array of text elements. Missing fields take the editor defaults,
/// and elements without an `id` get a fresh one.
pub fn load_layers_json(path: &Path) -> Result<Vec<TextElement>, EditorError> {
    let text = std::fs::read_to_string(path)?;
    parse_layers_json(&text)
}

pub fn parse_layers_json(text: &str) -> Result<Vec<TextElement>, EditorError> {
    Ok(serde_json::from_str(text)?)
}

// ============================================================================
// PROJECT FILE FORMAT
// ============================================================================

/// bincode encodes a String as an 8-byte length prefix plus its bytes, so the
/// 4-char magic sits at bytes 8..12.
const PROJECT_MAGIC: &str = "BTX1";
/// Per-axis limit, so a crafted file cannot demand a huge allocation.
const MAX_CANVAS_DIM: u32 = 32_768;
const MAX_ELEMENTS: usize = 4096;

/// Saved editing session: both rasters at intrinsic size, the container the
/// element positions refer to, and the ordered element list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    magic: String,
    pub width: u32,
    pub height: u32,
    pub container: Size,
    pub elements: Vec<TextElement>,
    background: Vec<u8>,
    foreground: Vec<u8>,
}

impl ProjectFile {
    /// The foreground is stored at the background's size.
    pub fn new(
        background: &RgbaImage,
        foreground: &RgbaImage,
        container: Size,
        elements: Vec<TextElement>,
    ) -> Self {
        let (width, height) = background.dimensions();
        Self {
            magic: PROJECT_MAGIC.to_string(),
            width,
            height,
            container,
            elements,
            background: background.as_raw().clone(),
            foreground: fit_to(foreground, width, height).as_raw().clone(),
        }
    }

    pub fn background_image(&self) -> Result<RgbaImage, EditorError> {
        self.raster(&self.background, "background")
    }

    pub fn foreground_image(&self) -> Result<RgbaImage, EditorError> {
        self.raster(&self.foreground, "foreground")
    }

    fn raster(&self, data: &[u8], what: &str) -> Result<RgbaImage, EditorError> {
        RgbaImage::from_raw(self.width, self.height, data.to_vec()).ok_or_else(|| {
            EditorError::Project(format!(
                "{} holds {} bytes, expected {} for {}x{}",
                what,
                data.len(),
                self.width as usize * self.height as usize * 4,
                self.width,
                self.height
            ))
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EditorError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, EditorError> {
        if raw.len() < 12 {
            return Err(EditorError::Project("File too small".into()));
        }
        let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
        if magic != PROJECT_MAGIC {
            return Err(EditorError::Project(format!("Unknown magic '{}'", magic)));
        }

        let project: ProjectFile = bincode::deserialize(raw)?;
        if project.width == 0 || project.height == 0 {
            return Err(EditorError::Project(
                "Image dimensions cannot be zero".into(),
            ));
        }
        if project.width > MAX_CANVAS_DIM || project.height > MAX_CANVAS_DIM {
            return Err(EditorError::Project(format!(
                "Image size {}x{} exceeds maximum allowed {}x{}",
                project.width, project.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
            )));
        }
        if project.elements.len() > MAX_ELEMENTS {
            return Err(EditorError::Project(format!(
                "Project contains {} text elements, which exceeds the maximum of {}",
                project.elements.len(),
                MAX_ELEMENTS
            )));
        }
        // Both buffers must match the declared size.
        project.background_image()?;
        project.foreground_image()?;
        Ok(project)
    }
}

pub fn save_project(project: &ProjectFile, path: &Path) -> Result<(), EditorError> {
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, project)?;
    Ok(())
}

pub fn load_project(path: &Path) -> Result<ProjectFile, EditorError> {
    let raw = std::fs::read(path)?;
    ProjectFile::from_bytes(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("behindtext-{}-{}", uuid::Uuid::new_v4(), name))
    }

    fn sample_project() -> ProjectFile {
        let bg = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let fg = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 0]));
        let el = TextElement {
            text: "Hi".into(),
            ..TextElement::default()
        };
        ProjectFile::new(&bg, &fg, Size::new(8.0, 6.0), vec![el])
    }

    #[test]
    fn export_format_follows_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a.JPG")), ExportFormat::Jpeg);
        assert_eq!(ExportFormat::from_path(Path::new("a.webp")), ExportFormat::Webp);
        assert_eq!(ExportFormat::from_path(Path::new("a.bmp")), ExportFormat::Bmp);
        assert_eq!(ExportFormat::from_path(Path::new(EXPORT_FILE_NAME)), ExportFormat::Png);
        assert_eq!(ExportFormat::from_path(Path::new("noext")), ExportFormat::Png);
    }

    #[test]
    fn raw_extensions_are_case_insensitive() {
        assert!(is_raw_extension("NEF"));
        assert!(is_raw_extension("dng"));
        assert!(!is_raw_extension("png"));
    }

    #[test]
    fn garbage_bytes_are_an_invalid_image() {
        let err = decode_image_bytes(b"definitely not a png").unwrap_err();
        assert!(matches!(err, EditorError::InvalidImage(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = decode_image(&scratch("missing.png")).unwrap_err();
        assert!(matches!(err, EditorError::Io(_)));
    }

    #[test]
    fn png_export_preserves_alpha() {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([200, 100, 50, 255]));
        img.put_pixel(1, 1, Rgba([0, 0, 0, 0]));
        let path = scratch("out.png");
        encode_and_write(&img, &path, ExportFormat::Png, 90).unwrap();
        let back = decode_image(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, img);
    }

    #[test]
    fn project_magic_sits_after_the_length_prefix() {
        let bytes = sample_project().to_bytes().unwrap();
        assert_eq!(&bytes[8..12], PROJECT_MAGIC.as_bytes());
    }

    #[test]
    fn project_survives_a_save_and_load() {
        let project = sample_project();
        let path = scratch("session.btx");
        save_project(&project, &path).unwrap();
        let loaded = load_project(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, project);
        assert_eq!(loaded.elements[0].text, "Hi");
        assert_eq!(loaded.foreground_image().unwrap().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn foreground_is_stored_at_background_size() {
        let bg = RgbaImage::from_pixel(4, 4, Rgba([1, 1, 1, 255]));
        let fg = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        let project = ProjectFile::new(&bg, &fg, Size::new(4.0, 4.0), Vec::new());
        assert_eq!(project.foreground_image().unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = sample_project().to_bytes().unwrap();
        bytes[8..12].copy_from_slice(b"PFE1");
        let err = ProjectFile::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, EditorError::Project(_)));
        assert!(ProjectFile::from_bytes(&[0; 4]).is_err());
    }

    #[test]
    fn truncated_pixels_are_rejected() {
        let mut project = sample_project();
        project.background.truncate(8);
        let bytes = project.to_bytes().unwrap();
        assert!(matches!(
            ProjectFile::from_bytes(&bytes),
            Err(EditorError::Project(_))
        ));
    }

    #[test]
    fn layers_json_accepts_sparse_elements() {
        let els = parse_layers_json(r##"[{"text":"Top","fontSize":72,"color":"#ff8800"},{}]"##)
            .unwrap();
        assert_eq!(els.len(), 2);
        assert_eq!(els[0].text, "Top");
        assert_eq!(els[0].font_size, 72.0);
        assert_eq!(els[0].x, 50.0);
        assert_eq!(els[1].text, "Behind Text");
        assert_ne!(els[0].id, els[1].id);
        assert!(matches!(
            parse_layers_json("{not json"),
            Err(EditorError::Project(_))
        ));
    }
}
