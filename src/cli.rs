// ============================================================================
// BehindText CLI — headless "text behind subject" rendering
// ============================================================================
//
// Usage examples:
//   behindtext -i photo.jpg -l layers.json                 (writes edited-image.png next to it)
//   behindtext -i photo.jpg -l layers.json -o poster.jpg -q 85
//   behindtext -i "shots/*.jpg" -l layers.json --container 800x600 --output-dir out/
//   behindtext -p session.btx -o final.png
//
// Layer positions are edit-space coordinates inside a container of the given
// size; without --container they are taken as image pixels.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::components::layers::{LayerCommand, TextElement};
use crate::coords::{Point, Size};
use crate::error::EditorError;
use crate::io::{EXPORT_FILE_NAME, ExportFormat, encode_and_write, load_layers_json};
use crate::ops::compositor::Compositor;
use crate::ops::segment::Phase;
use crate::ops::text::FontBook;
use crate::project::Project;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Place text between a photo's background and its subject.
#[derive(Parser, Debug)]
#[command(
    name = "behindtext",
    about = "Render text layers behind the subject of a photo",
    long_about = "Removes the photo's background by corner color, paints the text layers\n\
                  over the original, then puts the subject back on top.\n\n\
                  Example:\n  \
                  behindtext -i photo.jpg -l layers.json -o poster.png\n  \
                  behindtext -i \"*.jpg\" -l layers.json --output-dir out/"
)]
#[command(group = clap::ArgGroup::new("source").required(true).args(["input", "project"]))]
pub struct CliArgs {
    /// Input photo(s). Glob patterns accepted (e.g. "*.jpg", "shots/*.png").
    #[arg(short, long, num_args = 1..)]
    pub input: Vec<String>,

    /// JSON array of text elements. Omitted fields take the editor defaults.
    #[arg(short, long, value_name = "LAYERS.json")]
    pub layers: Option<PathBuf>,

    /// Saved session to re-export instead of a photo. --layers replaces its elements.
    #[arg(short, long, value_name = "SESSION.btx", conflicts_with = "input")]
    pub project: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Size of the edit surface the layer coordinates refer to.
    #[arg(long, value_name = "WxH", value_parser = parse_container)]
    pub container: Option<Size>,

    /// Font file used for every family.
    #[arg(long, value_name = "FONT.ttf", conflicts_with = "font_dir")]
    pub font_file: Option<PathBuf>,

    /// Directory of font files matched to families by file name.
    #[arg(long, value_name = "DIR")]
    pub font_dir: Option<PathBuf>,

    /// Also write the background-removed subject here. Single input only.
    #[arg(long, value_name = "FILE")]
    pub cutout: Option<PathBuf>,

    /// Also save the session as a project file. Single input only.
    #[arg(long, value_name = "FILE")]
    pub save_project: Option<PathBuf>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Print processing phases and per-file timing; mirror the log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_echo(args.verbose);

    let fonts = match load_fonts(&args) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let elements = match &args.layers {
        Some(path) => match load_layers_json(path) {
            Ok(els) => Some(els),
            Err(e) => {
                eprintln!("error: could not read layers '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(project_path) = &args.project {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| sibling(project_path, EXPORT_FILE_NAME));
        return match rerender_project(project_path, &output, elements, fonts, &args) {
            Ok(()) => {
                println!("{}", output.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let multi = inputs.len() > 1;
    if multi
        && (args.output.is_some() || args.cutout.is_some() || args.save_project.is_some())
        && args.output_dir.is_none()
    {
        eprintln!(
            "error: {} input files given but --output, --cutout and --save-project take a single path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let elements = elements.unwrap_or_default();
    let total = inputs.len();
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            multi,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        let compositor = Compositor::new(fonts.clone());
        match run_one(input_path, &output_path, &elements, compositor, &args, multi) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    elements: &[TextElement],
    compositor: Compositor,
    args: &CliArgs,
    multi: bool,
) -> Result<(), EditorError> {
    // -- Step 1: Load + segment ------------------------------------------
    let mut project = Project::new_untitled(1, compositor);
    let on_phase: Option<Box<dyn FnMut(Phase)>> = if args.verbose {
        Some(Box::new(|phase: Phase| println!("  {}", phase.label())))
    } else {
        None
    };
    project.upload_file(input, on_phase)?;
    project.finish_segmentation()?;

    // -- Step 2: Lay out the text ----------------------------------------
    let container = match (args.container, project.background()) {
        (Some(size), _) => size,
        (None, Some(bg)) => Size::new(bg.width() as f64, bg.height() as f64),
        (None, None) => Size::default(),
    };
    project.set_container(Point::zero(), container)?;
    for el in elements {
        project.apply(LayerCommand::Insert(el.clone()));
    }

    // -- Step 3: Save ----------------------------------------------------
    let image = project.export()?;
    encode_and_write(&image, output, ExportFormat::from_path(output), args.quality)?;

    if !multi {
        if let (Some(path), Some(fg)) = (&args.cutout, project.foreground()) {
            encode_and_write(fg, path, ExportFormat::Png, args.quality)?;
        }
        if let Some(path) = &args.save_project {
            project.save(path)?;
        }
    }
    Ok(())
}

fn rerender_project(
    path: &Path,
    output: &Path,
    elements: Option<Vec<TextElement>>,
    fonts: FontBook,
    args: &CliArgs,
) -> Result<(), EditorError> {
    let mut project = Project::open(path, Compositor::new(fonts))?;
    if let Some(container) = args.container {
        project.set_container(Point::zero(), container)?;
    }
    if let Some(elements) = elements {
        project.apply(LayerCommand::Clear);
        for el in elements {
            project.apply(LayerCommand::Insert(el));
        }
    }
    let image = project.export()?;
    encode_and_write(&image, output, ExportFormat::from_path(output), args.quality)?;
    if let Some(fg) = project.foreground()
        && let Some(cutout) = &args.cutout
    {
        encode_and_write(fg, cutout, ExportFormat::Png, args.quality)?;
    }
    if let Some(save) = &args.save_project {
        project.save(save)?;
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn load_fonts(args: &CliArgs) -> Result<FontBook, EditorError> {
    if let Some(file) = &args.font_file {
        return FontBook::from_font_file(file);
    }
    if let Some(dir) = &args.font_dir {
        return FontBook::from_font_dir(dir);
    }
    Ok(FontBook::system())
}

/// `WxH` with positive sizes, e.g. `800x600`.
fn parse_container(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: f64 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: f64 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    let size = Size::new(w, h);
    if !size.has_area() {
        return Err(format!("container {} has no area", s));
    }
    Ok(size)
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.parent().unwrap_or(Path::new(".")).join(file_name)
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir`, named after the input stem
/// 3. next to the input: `edited-image.png` for a single file,
///    `<stem>-edited.png` in a batch so results do not collide
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    multi: bool,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let batch_name = format!("{}-edited.{}", stem, ExportFormat::Png.extension());

    if let Some(dir) = output_dir {
        return Some(dir.join(batch_name));
    }
    if multi {
        Some(sibling(input, &batch_name))
    } else {
        Some(sibling(input, EXPORT_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_parses_width_by_height() {
        assert_eq!(parse_container("800x600").unwrap(), Size::new(800.0, 600.0));
        assert_eq!(parse_container("12.5X4").unwrap(), Size::new(12.5, 4.0));
        assert!(parse_container("0x600").is_err());
        assert!(parse_container("800").is_err());
        assert!(parse_container("axb").is_err());
    }

    #[test]
    fn default_output_is_edited_image_next_to_input() {
        let out = build_output_path(Path::new("shots/cat.jpg"), None, None, false).unwrap();
        assert_eq!(out, Path::new("shots").join(EXPORT_FILE_NAME));
    }

    #[test]
    fn batch_outputs_are_named_after_inputs() {
        let out = build_output_path(Path::new("shots/cat.jpg"), None, Some(Path::new("out")), true)
            .unwrap();
        assert_eq!(out, Path::new("out").join("cat-edited.png"));
        let out = build_output_path(Path::new("shots/cat.jpg"), None, None, true).unwrap();
        assert_eq!(out, Path::new("shots").join("cat-edited.png"));
    }

    #[test]
    fn explicit_output_wins() {
        let out = build_output_path(
            Path::new("cat.jpg"),
            Some(Path::new("poster.webp")),
            Some(Path::new("out")),
            false,
        )
        .unwrap();
        assert_eq!(out, Path::new("poster.webp"));
    }

    #[test]
    fn a_source_is_required() {
        assert!(CliArgs::try_parse_from(["behindtext"]).is_err());
        assert!(CliArgs::try_parse_from(["behindtext", "-i", "a.png", "-p", "s.btx"]).is_err());
        let args = CliArgs::try_parse_from([
            "behindtext",
            "-i",
            "a.png",
            "--container",
            "200x200",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.container, Some(Size::new(200.0, 200.0)));
        assert!(args.verbose);
        assert_eq!(args.quality, 90);
    }
}
