// ============================================================================
// Dewatermark CLI: headless batch removal with a mask image
// ============================================================================
//
// Usage examples:
//   dewatermark -i photo.png -m mark.png -o clean.png
//   dewatermark -i shots/*.jpg -m corner.png --output-dir clean/ --format png
//   dewatermark -i a.png b.png -m mark.png --output-dir out/ --method patchmatch
//
// No window is opened in CLI mode. The mask image is white where content must
// be removed; it is resized to each input's working size.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::RgbaImage;
use image::imageops::FilterType;

use crate::engine::{Engine, EngineConfig, EngineLoader};
use crate::io::{SaveFormat, encode_and_write, fit_to_width, load_image_sync};
use crate::ops::inpaint::InpaintMethod;
use crate::ops::remove::{InpaintParams, remove_marked};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Dewatermark headless remover.
#[derive(Parser, Debug)]
#[command(
    name = "dewatermark",
    about = "Remove marked regions from images by inpainting",
    long_about = "Inpaint the white region of a mask image out of one or more input\n\
                  images without opening the GUI. Reads PNG, JPEG, WEBP, BMP, TGA,\n\
                  TIFF and GIF; writes PNG, JPEG, BMP, TGA or TIFF.\n\n\
                  Example:\n  \
                  dewatermark -i photo.png -m mark.png -o clean.png\n  \
                  dewatermark -i *.jpg -m mark.png --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Mask image: white marks the pixels to remove, black keeps them.
    #[arg(short, long, value_name = "MASK")]
    pub mask: PathBuf,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Inpaint neighbourhood radius in pixels.
    #[arg(long, default_value_t = 5)]
    pub radius: u32,

    /// Inpaint method: telea or patchmatch.
    #[arg(long, default_value = "telea")]
    pub method: String,

    /// Mask gray level that must be exceeded to count as marked (0-255).
    #[arg(long, default_value_t = 100)]
    pub threshold: u8,

    /// Downscale inputs wider than this before processing.
    #[arg(long, default_value_t = 1280)]
    pub max_width: u32,

    /// Output format: png, jpeg, bmp, tga, tiff.
    /// When omitted, inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Echo the log to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// Outcome counts for one CLI run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_echo(args.verbose);
    match process_all(&args) {
        Ok(report) if report.failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Validate arguments, initialise the engine and process every input.
/// Errors that stop the whole run come back as `Err`; per-file failures are
/// counted in the report.
pub fn process_all(args: &CliArgs) -> Result<BatchReport, String> {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        return Err("no input files matched the given pattern(s).".into());
    }
    if inputs.len() > 1 && args.output.is_some() {
        return Err(format!(
            "{} input files given but --output only accepts a single file path.\n\
             Use --output-dir alone to specify a destination directory for batch processing.",
            inputs.len()
        ));
    }

    let method = InpaintMethod::from_key(&args.method)
        .ok_or_else(|| format!("unknown method '{}' (expected telea or patchmatch)", args.method))?;
    let params = InpaintParams {
        radius: args.radius,
        method,
        threshold: args.threshold,
    };
    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    let mask = load_image_sync(&args.mask)
        .map_err(|e| format!("could not read mask '{}': {}", args.mask.display(), e))?;

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("could not create output directory '{}': {}", dir.display(), e))?;
    }

    let engine = EngineLoader::spawn(EngineConfig::default())
        .wait()
        .map_err(|e| e.to_string())?;

    let total = inputs.len();
    let multi = total > 1;
    let mut report = BatchReport::default();

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            report.failed += 1;
            continue;
        };

        match run_one(
            &engine,
            input_path,
            &output_path,
            &mask,
            params,
            args.max_width,
            save_format,
            args.quality,
        ) {
            Ok(()) => {
                report.succeeded += 1;
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn run_one(
    engine: &Engine,
    input: &Path,
    output: &Path,
    mask: &RgbaImage,
    params: InpaintParams,
    max_width: u32,
    format: SaveFormat,
    quality: u8,
) -> Result<(), String> {
    let source = load_image_sync(input).map_err(|e| format!("load failed: {}", e))?;
    let source = fit_to_width(source, max_width);

    let mask = mask_for(mask, source.width(), source.height());
    let cleaned = remove_marked(engine, &source, &mask, params)
        .map_err(|e| format!("inpaint failed: {}", e))?;

    encode_and_write(&cleaned, output, format, quality).map_err(|e| format!("save failed: {}", e))
}

/// Resize the mask to the working size; nearest keeps it hard-edged.
fn mask_for(mask: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    image::imageops::resize(mask, width, height, FilterType::Nearest)
}

// ============================================================================
// Helpers
// ============================================================================

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

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_extension(f).unwrap_or(SaveFormat::Png);
    }
    output.and_then(SaveFormat::from_path).unwrap_or(SaveFormat::Png)
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_clean.<ext>`
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_clean.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_prefers_flag_then_extension() {
        assert_eq!(parse_format(Some("JPG"), Some(Path::new("x.bmp"))), SaveFormat::Jpeg);
        assert_eq!(parse_format(None, Some(Path::new("x.tif"))), SaveFormat::Tiff);
        assert_eq!(parse_format(None, Some(Path::new("x.webp"))), SaveFormat::Png);
        assert_eq!(parse_format(None, None), SaveFormat::Png);
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("shots/a.jpg");
        assert_eq!(
            build_output_path(
                input,
                Some(Path::new("o.png")),
                Some(Path::new("d")),
                SaveFormat::Png,
            ),
            Some(PathBuf::from("o.png"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("d")), SaveFormat::Png),
            Some(PathBuf::from("d/a.png"))
        );
        assert_eq!(
            build_output_path(input, None, None, SaveFormat::Jpeg),
            Some(PathBuf::from("shots/a_clean.jpg"))
        );
    }

    #[test]
    fn mask_is_resized_hard_edged() {
        let mut mask = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        mask.put_pixel(0, 0, image::Rgba([255, 255, 255, 255]));
        let big = mask_for(&mask, 8, 8);
        assert_eq!(big.dimensions(), (8, 8));
        for p in big.pixels() {
            assert!(p.0[0] == 0 || p.0[0] == 255);
        }
    }

    #[test]
    fn args_parse_with_defaults() {
        let args = CliArgs::try_parse_from(["dewatermark", "-i", "a.png", "-m", "m.png"]).unwrap();
        assert_eq!(args.radius, 5);
        assert_eq!(args.threshold, 100);
        assert_eq!(args.max_width, 1280);
        assert_eq!(args.method, "telea");
        assert!(CliArgs::try_parse_from(["dewatermark", "-i", "a.png"]).is_err());
    }
}
