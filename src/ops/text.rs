use ab_glyph::{point, Font, FontArc, ScaleFont};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::components::layers::FontFamily;
use crate::error::EditorError;

/// Glyph metrics and coverage for one face. Sizes are in pixels.
pub trait GlyphSource: Send + Sync {
    /// Distance from the top of the line to the baseline.
    fn ascent(&self, px: f32) -> f32;
    /// Distance from the baseline to the bottom of the line (negative).
    fn descent(&self, px: f32) -> f32;
    fn advance(&self, ch: char, px: f32) -> f32;
    fn kern(&self, _prev: char, _next: char, _px: f32) -> f32 {
        0.0
    }
    /// Plot coverage of `ch` with its pen position at `(x, baseline)`.
    /// Only pixels inside `0..clip.0` by `0..clip.1` need to be plotted.
    fn draw_glyph(
        &self,
        ch: char,
        px: f32,
        x: f32,
        baseline: f32,
        clip: (u32, u32),
        plot: &mut dyn FnMut(i32, i32, f32),
    ) -> Result<(), EditorError>;
}

/// An outline font loaded through `ab_glyph`.
pub struct OutlineFont(pub FontArc);

impl GlyphSource for OutlineFont {
    fn ascent(&self, px: f32) -> f32 {
        self.0.as_scaled(px).ascent()
    }

    fn descent(&self, px: f32) -> f32 {
        self.0.as_scaled(px).descent()
    }

    fn advance(&self, ch: char, px: f32) -> f32 {
        let scaled = self.0.as_scaled(px);
        scaled.h_advance(self.0.glyph_id(ch))
    }

    fn kern(&self, prev: char, next: char, px: f32) -> f32 {
        let scaled = self.0.as_scaled(px);
        scaled.kern(self.0.glyph_id(prev), self.0.glyph_id(next))
    }

    fn draw_glyph(
        &self,
        ch: char,
        px: f32,
        x: f32,
        baseline: f32,
        clip: (u32, u32),
        plot: &mut dyn FnMut(i32, i32, f32),
    ) -> Result<(), EditorError> {
        let glyph = self
            .0
            .glyph_id(ch)
            .with_scale_and_position(px, point(x, baseline));
        let Some(outlined) = self.0.outline_glyph(glyph) else {
            return Ok(());
        };
        let b = outlined.px_bounds();
        if b.max.x <= 0.0 || b.max.y <= 0.0 || b.min.x >= clip.0 as f32 || b.min.y >= clip.1 as f32 {
            return Ok(());
        }
        // ab_glyph rasterizes the whole glyph box at once.
        if b.width() as f64 * b.height() as f64 > MAX_GLYPH_PIXELS {
            return Err(EditorError::Render(format!(
                "glyph '{}' at {} px is too large",
                ch, px
            )));
        }
        let (bx, by) = (b.min.x as i32, b.min.y as i32);
        outlined.draw(|gx, gy, cov| plot(bx + gx as i32, by + gy as i32, cov));
        Ok(())
    }
}

/// Largest outline glyph box rasterized, in pixels.
const MAX_GLYPH_PIXELS: f64 = (1u64 << 24) as f64;

/// Last-resort face: every visible character is a solid block.
///
/// Metrics follow the editor's size estimate (advance 0.6em, line 1em), so
/// layouts stay sensible when no font could be loaded.
pub struct BlockFont;

impl GlyphSource for BlockFont {
    fn ascent(&self, px: f32) -> f32 {
        px * 0.8
    }

    fn descent(&self, px: f32) -> f32 {
        -px * 0.2
    }

    fn advance(&self, _ch: char, px: f32) -> f32 {
        px * 0.6
    }

    fn draw_glyph(
        &self,
        ch: char,
        px: f32,
        x: f32,
        baseline: f32,
        clip: (u32, u32),
        plot: &mut dyn FnMut(i32, i32, f32),
    ) -> Result<(), EditorError> {
        if ch.is_whitespace() || ch.is_control() {
            return Ok(());
        }
        // Pixels whose centre falls inside the block, limited to the clip.
        let span = |lo: f32, hi: f32, limit: u32| {
            let first = (lo - 0.5).ceil().clamp(0.0, limit as f32) as i32;
            let last = (hi - 0.5).ceil().clamp(0.0, limit as f32) as i32;
            first..last
        };
        let xs = span(x + px * 0.05, x + px * 0.55, clip.0);
        for py in span(baseline - px * 0.7, baseline, clip.1) {
            for px_ in xs.clone() {
                plot(px_, py, 1.0);
            }
        }
        Ok(())
    }
}

// ============================================================================
// FONT BOOK
// ============================================================================

/// Faces for every [`FontFamily`], with a fallback for families that could
/// not be loaded.
#[derive(Clone)]
pub struct FontBook {
    faces: HashMap<FontFamily, Arc<dyn GlyphSource>>,
    fallback: Arc<dyn GlyphSource>,
}

impl FontBook {
    /// Block glyphs only. Deterministic everywhere; used headless and in tests.
    pub fn blocks() -> Self {
        Self {
            faces: HashMap::new(),
            fallback: Arc::new(BlockFont),
        }
    }

    /// One font file used for every family.
    pub fn from_font_file(path: &Path) -> Result<Self, EditorError> {
        let face = load_font_file(path)?;
        Ok(Self {
            faces: HashMap::new(),
            fallback: face,
        })
    }

    /// Match font files in `dir` to families by file stem, e.g.
    /// `PlayfairDisplay-Regular.ttf` → Playfair Display.
    pub fn from_font_dir(dir: &Path) -> Result<Self, EditorError> {
        let mut book = Self::blocks();
        let pattern = dir.join("*.[ot]tf");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| EditorError::Project(format!("bad font dir pattern: {}", e)))?;
        let mut files: Vec<_> = entries.flatten().collect();
        files.sort();
        for path in files {
            let stem = path
                .file_stem()
                .map(|s| squash(&s.to_string_lossy()))
                .unwrap_or_default();
            let Some(family) = FontFamily::all()
                .iter()
                .copied()
                .find(|f| stem.starts_with(&squash(f.name())))
            else {
                continue;
            };
            if book.faces.contains_key(&family) {
                continue;
            }
            match load_font_file(&path) {
                Ok(face) => {
                    book.faces.insert(family, face);
                }
                Err(e) => {
                    log_warn!("Skipping font {}: {}", path.display(), e);
                }
            }
        }
        if let Some(first) = book.faces.values().next() {
            book.fallback = Arc::clone(first);
        }
        Ok(book)
    }

    /// Look every family up among the installed system fonts.
    pub fn system() -> Self {
        let mut book = Self::blocks();
        for &family in FontFamily::all() {
            if let Some(font) = load_system_font(family.name()) {
                book.faces.insert(family, Arc::new(OutlineFont(font)));
            }
        }
        if book.faces.is_empty() {
            // Generic fallbacks, so at least real glyphs render.
            for name in generic_families() {
                if let Some(font) = load_system_font(name) {
                    book.fallback = Arc::new(OutlineFont(font));
                    break;
                }
            }
        } else if let Some(face) = book
            .faces
            .get(&FontFamily::Arial)
            .or_else(|| book.faces.values().next())
        {
            book.fallback = Arc::clone(face);
        }
        log_info!(
            "Font book: {} of {} families found on the system",
            book.faces.len(),
            FontFamily::all().len()
        );
        book
    }

    pub fn face(&self, family: FontFamily) -> &dyn GlyphSource {
        self.faces
            .get(&family)
            .map(|f| f.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn has_family(&self, family: FontFamily) -> bool {
        self.faces.contains_key(&family)
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn load_font_file(path: &Path) -> Result<Arc<dyn GlyphSource>, EditorError> {
    let bytes = std::fs::read(path)?;
    let font = FontArc::try_from_vec(bytes)
        .map_err(|_| EditorError::Project(format!("{} is not a usable font", path.display())))?;
    Ok(Arc::new(OutlineFont(font)))
}

fn generic_families() -> &'static [&'static str] {
    #[cfg(target_os = "linux")]
    {
        &["DejaVu Sans", "Liberation Sans", "Noto Sans"]
    }
    #[cfg(not(target_os = "linux"))]
    {
        &["Arial", "Helvetica", "Segoe UI"]
    }
}

/// Load the regular, upright face of `family` from the system.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[FamilyName::Title(family.to_string())], &Properties::new())
        .ok()?;

    let font_data = handle.load().ok()?;
    // select_best_match falls back to any font; only accept the family asked for.
    if !font_data.family_name().eq_ignore_ascii_case(family) {
        return None;
    }
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

// ============================================================================
// LAYOUT + RASTERIZATION
// ============================================================================

/// A single left-aligned line. Glyph x positions are relative to the line start.
#[derive(Clone, Debug, PartialEq)]
pub struct LineLayout {
    pub glyphs: Vec<(char, f32)>,
    /// Advance width including letter spacing after every glyph.
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl LineLayout {
    pub fn height(&self) -> f32 {
        self.ascent - self.descent
    }
}

pub fn layout_line(font: &dyn GlyphSource, text: &str, px: f32, letter_spacing: f32) -> LineLayout {
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut prev: Option<char> = None;

    for ch in text.chars().filter(|c| *c != '\n' && *c != '\r') {
        if let Some(p) = prev {
            cursor_x += font.kern(p, ch, px);
        }
        glyphs.push((ch, cursor_x));
        cursor_x += font.advance(ch, px) + letter_spacing;
        prev = Some(ch);
    }

    LineLayout {
        glyphs,
        width: cursor_x,
        ascent: font.ascent(px),
        descent: font.descent(px),
    }
}

/// Single-channel coverage in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct Coverage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Coverage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// 0 outside the buffer.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            0.0
        } else {
            self.data[y as usize * self.width as usize + x as usize]
        }
    }

    #[inline]
    fn accumulate(&mut self, x: i32, y: i32, v: f32) {
        if x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32 {
            let idx = y as usize * self.width as usize + x as usize;
            self.data[idx] = self.data[idx].max(v.clamp(0.0, 1.0));
        }
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v <= 0.0)
    }
}

/// Rasterize `layout` into a `width`×`height` buffer with the line's
/// top-left corner at `(left, top)` in buffer pixels.
pub fn rasterize_line(
    font: &dyn GlyphSource,
    layout: &LineLayout,
    px: f32,
    left: f32,
    top: f32,
    width: u32,
    height: u32,
) -> Result<Coverage, EditorError> {
    let mut cov = Coverage::new(width, height);
    let baseline = top + layout.ascent;
    for &(ch, gx) in &layout.glyphs {
        font.draw_glyph(ch, px, left + gx, baseline, (width, height), &mut |x, y, c| {
            cov.accumulate(x, y, c)
        })?;
    }
    Ok(cov)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_layout_measures_with_spacing() {
        let l = layout_line(&BlockFont, "abcd", 10.0, 2.0);
        assert_eq!(l.glyphs.len(), 4);
        assert_eq!(l.glyphs[1].1, 8.0);
        assert_eq!(l.width, 4.0 * 8.0);
        assert_eq!(l.ascent, 8.0);
        assert_eq!(l.height(), 10.0);
    }

    #[test]
    fn negative_spacing_tightens() {
        let wide = layout_line(&BlockFont, "ab", 10.0, 0.0);
        let tight = layout_line(&BlockFont, "ab", 10.0, -3.0);
        assert!(tight.width < wide.width);
    }

    #[test]
    fn block_glyph_fills_expected_pixels() {
        let l = layout_line(&BlockFont, "A", 10.0, 0.0);
        let cov = rasterize_line(&BlockFont, &l, 10.0, 0.0, 0.0, 8, 12).unwrap();
        // block spans x in [0.5, 5.5), y in [1, 8): pixel centres 0.5..4.5, 1.5..7.5
        assert_eq!(cov.get(0, 4), 1.0);
        assert_eq!(cov.get(4, 4), 1.0);
        assert_eq!(cov.get(5, 4), 0.0);
        assert_eq!(cov.get(2, 0), 0.0);
        assert_eq!(cov.get(2, 1), 1.0);
        assert_eq!(cov.get(2, 7), 1.0);
        assert_eq!(cov.get(2, 8), 0.0);
    }

    #[test]
    fn spaces_have_no_ink() {
        let l = layout_line(&BlockFont, "   ", 10.0, 0.0);
        let cov = rasterize_line(&BlockFont, &l, 10.0, 0.0, 0.0, 20, 12).unwrap();
        assert!(cov.is_blank());
        assert_eq!(l.width, 18.0);
    }

    #[test]
    fn block_book_falls_back_for_every_family() {
        let book = FontBook::blocks();
        for &f in FontFamily::all() {
            assert!(!book.has_family(f));
            assert_eq!(book.face(f).advance('x', 10.0), 6.0);
        }
    }

    #[test]
    fn block_glyphs_plot_only_inside_the_clip() {
        let mut plotted = Vec::new();
        BlockFont
            .draw_glyph('A', 1e9, -1e8, 3e8, (4, 3), &mut |x, y, _| plotted.push((x, y)))
            .unwrap();
        assert_eq!(plotted.len(), 12);
        assert!(plotted.iter().all(|&(x, y)| (0..4).contains(&x) && (0..3).contains(&y)));
    }

    #[test]
    fn unreadable_fonts_in_a_dir_are_skipped() {
        let dir = std::env::temp_dir().join(format!("behindtext-fonts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Arial-Regular.ttf"), b"not a font").unwrap();
        let book = FontBook::from_font_dir(&dir).unwrap();
        assert!(!book.has_family(FontFamily::Arial));
        assert_eq!(book.face(FontFamily::Arial).advance('x', 10.0), 6.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stems_match_family_names() {
        assert!(squash("PlayfairDisplay-Regular").starts_with(&squash("Playfair Display")));
        assert!(squash("times_new_roman").starts_with(&squash("Times New Roman")));
    }
}
