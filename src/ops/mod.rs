// ============================================================================
// OPS — raster operations behind the editor
// ============================================================================
//
// Architecture:
//   segment.rs    — corner-color background removal + worker job with phases
//   text.rs       — font book, single-line layout, glyph coverage
//   effects.rs    — fill/gradient, drop shadow, stroke band
//   transform.rs  — rotated bilinear blits
//   compositor.rs — background → text layers → foreground cutout
// ============================================================================

pub mod segment;
pub mod text;
pub mod effects;
pub mod transform;
pub mod compositor;

pub use compositor::Compositor;
