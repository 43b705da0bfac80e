use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::components::history::StrokeRecord;

/// Raster formats accepted by the open dialog and the CLI.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "tga", "gif", "tiff", "tif",
];

/// Extension of saved editing sessions.
pub const SESSION_EXTENSION: &str = "dwm";
const SESSION_MAGIC_V1: &str = "DWM1";

/// Largest accepted dimension when loading sessions.
const MAX_CANVAS_DIM: u32 = 32_768;

// ============================================================================
// LOADING
// ============================================================================

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Decode(ImageError),
    /// Decoded fine but has zero width or height.
    Empty,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Decode(e) => write!(f, "cannot decode image: {}", e),
            LoadError::Empty => write!(f, "image has no pixels"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => LoadError::Io(io),
            other => LoadError::Decode(other),
        }
    }
}

/// Decode an in-memory file (format sniffed from content).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(LoadError::Empty);
    }
    Ok(img)
}

/// Synchronously decode any supported raster file to RGBA.
pub fn load_image_sync(path: &Path) -> Result<RgbaImage, LoadError> {
    let bytes = std::fs::read(path)?;
    decode_image_bytes(&bytes)
}

/// Working size for an image under a width cap: aspect ratio kept, height
/// truncated to whole pixels and at least 1. Images already within the
/// cap keep their size.
pub fn capped_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if max_width == 0 || width <= max_width {
        return (width, height);
    }
    let h = (height as u64 * max_width as u64 / width as u64).max(1) as u32;
    (max_width, h)
}

/// Downscale `img` to fit `max_width`; returns it untouched when it fits.
pub fn fit_to_width(img: RgbaImage, max_width: u32) -> RgbaImage {
    let (w, h) = capped_size(img.width(), img.height(), max_width);
    if (w, h) == img.dimensions() {
        return img;
    }
    image::imageops::resize(&img, w, h, FilterType::Triangle)
}

// ============================================================================
// EXPORT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SaveFormat::Png => "PNG",
            SaveFormat::Jpeg => "JPEG",
            SaveFormat::Bmp => "BMP",
            SaveFormat::Tga => "TGA",
            SaveFormat::Tiff => "TIFF",
        }
    }

    pub fn all() -> &'static [SaveFormat] {
        &[
            SaveFormat::Png,
            SaveFormat::Jpeg,
            SaveFormat::Bmp,
            SaveFormat::Tga,
            SaveFormat::Tiff,
        ]
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

fn encode_into<W: Write + Seek>(
    image: &RgbaImage,
    writer: &mut W,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    let (w, h) = image.dimensions();
    match format {
        SaveFormat::Png => {
            PngEncoder::new(writer).write_image(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(writer, quality.clamp(1, 100)).encode(
                rgb.as_raw(),
                w,
                h,
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            BmpEncoder::new(writer).encode(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(writer).encode(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        SaveFormat::Tiff => {
            TiffEncoder::new(writer).write_image(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
    }
    Ok(())
}

/// Encode into memory; the bytes a download or clipboard export would use.
pub fn encode_to_vec(
    image: &RgbaImage,
    format: SaveFormat,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let mut cursor = Cursor::new(Vec::new());
    encode_into(image, &mut cursor, format, quality)?;
    Ok(cursor.into_inner())
}

/// Encode and write an image to a file.
/// Standalone so it can run on a background thread via `rayon::spawn`.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_into(image, &mut writer, format, quality)?;
    writer.flush()?;
    Ok(())
}

/// Replace (or add) the extension of `name` to match `format`.
pub fn export_file_name(name: &str, format: SaveFormat) -> String {
    Path::new(name)
        .with_extension(format.extension())
        .to_string_lossy()
        .into_owned()
}

// ============================================================================
// SESSION FILES (.dwm)
// ============================================================================

/// Serialisable editing session: the current working image plus the strokes
/// on its mask.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionFileV1 {
    magic: String,
    pub width: u32,
    pub height: u32,
    /// Raw RGBA8, row-major.
    pub pixels: Vec<u8>,
    pub brush_size: f32,
    pub strokes: Vec<StrokeRecord>,
}

impl SessionFileV1 {
    pub fn new(source: &RgbaImage, brush_size: f32, strokes: Vec<StrokeRecord>) -> Self {
        Self {
            magic: SESSION_MAGIC_V1.to_string(),
            width: source.width(),
            height: source.height(),
            pixels: source.as_raw().clone(),
            brush_size,
            strokes,
        }
    }

    /// Rebuild the working image.
    pub fn image(&self) -> Result<RgbaImage, SessionError> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| SessionError::InvalidFormat("pixel data length mismatch".into()))
    }
}

/// Error type for session file operations
#[derive(Debug)]
pub enum SessionError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
            SessionError::Serialize(e) => write!(f, "Serialization error: {}", e),
            SessionError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for SessionError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SessionError::Serialize(e.to_string())
    }
}

pub fn write_session(session: &SessionFileV1, path: &Path) -> Result<(), SessionError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, session)?;
    writer.flush()?;
    Ok(())
}

pub fn read_session(path: &Path) -> Result<SessionFileV1, SessionError> {
    let raw = std::fs::read(path)?;
    decode_session(&raw)
}

pub fn decode_session(raw: &[u8]) -> Result<SessionFileV1, SessionError> {
    if raw.len() < 12 {
        return Err(SessionError::InvalidFormat("File too small".into()));
    }
    // bincode writes a String as an 8-byte length then UTF-8, so the magic
    // sits at bytes 8..12.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != SESSION_MAGIC_V1 {
        return Err(SessionError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }
    let session: SessionFileV1 = bincode::deserialize(raw)?;
    if session.width == 0
        || session.height == 0
        || session.width > MAX_CANVAS_DIM
        || session.height > MAX_CANVAS_DIM
    {
        return Err(SessionError::InvalidFormat(format!(
            "Canvas {}x{} out of range",
            session.width, session.height
        )));
    }
    let expected = session.width as usize * session.height as usize * 4;
    if session.pixels.len() != expected {
        return Err(SessionError::InvalidFormat(format!(
            "Pixel data is {} bytes, expected {}",
            session.pixels.len(),
            expected
        )));
    }
    if !session.brush_size.is_finite() {
        return Err(SessionError::InvalidFormat("Brush size is not a number".into()));
    }
    if let Some(i) = session.strokes.iter().position(|s| !s.is_well_formed()) {
        return Err(SessionError::InvalidFormat(format!("Stroke {} is malformed", i)));
    }
    Ok(session)
}

// ============================================================================
// FILE HANDLER
// ============================================================================

pub struct FileHandler {
    /// Where the current image came from (None for sessions without a source path)
    pub current_path: Option<PathBuf>,
    pub last_format: SaveFormat,
    pub last_quality: u8,
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandler {
    pub fn new() -> Self {
        Self {
            current_path: None,
            last_format: SaveFormat::Png,
            last_quality: 90,
        }
    }

    pub fn pick_image_path(&self) -> Option<PathBuf> {
        FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .add_filter("Dewatermark Session", &[SESSION_EXTENSION])
            .add_filter("All Files", &["*"])
            .pick_file()
    }

    /// Native save dialog prefilled with `default_name`.
    pub fn pick_export_path(&self, default_name: &str) -> Option<PathBuf> {
        let mut dialog = FileDialog::new().set_file_name(default_name);
        for f in SaveFormat::all() {
            dialog = dialog.add_filter(f.label(), &[f.extension()]);
        }
        if let Some(dir) = self.start_directory() {
            dialog = dialog.set_directory(dir);
        }
        dialog.save_file()
    }

    /// Folder the save dialogs open in: the one holding the current image.
    pub fn start_directory(&self) -> Option<&Path> {
        self.current_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Remember where the open image came from.
    pub fn track(&mut self, path: Option<&Path>) {
        self.current_path = path.map(Path::to_path_buf);
    }

    pub fn pick_session_path(&self, default_name: &str) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .set_file_name(default_name)
            .add_filter("Dewatermark Session", &[SESSION_EXTENSION]);
        if let Some(dir) = self.start_directory() {
            dialog = dialog.set_directory(dir);
        }
        dialog.save_file()
    }

    /// Export with the format implied by the path, falling back to the last
    /// used one.
    pub fn export(&mut self, image: &RgbaImage, path: &Path) -> Result<(), ImageError> {
        let format = SaveFormat::from_path(path).unwrap_or(self.last_format);
        encode_and_write(image, path, format, self.last_quality)?;
        self.last_format = format;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn cap_truncates_height_and_never_upscales() {
        assert_eq!(capped_size(2000, 1000, 1280), (1280, 640));
        assert_eq!(capped_size(3000, 1000, 1280), (1280, 426));
        assert_eq!(capped_size(3000, 1001, 1280), (1280, 427));
        assert_eq!(capped_size(800, 600, 1280), (800, 600));
        assert_eq!(capped_size(1280, 10, 1280), (1280, 10));
        assert_eq!(capped_size(5000, 1, 1280), (1280, 1));
    }

    #[test]
    fn fit_to_width_resizes_only_when_needed() {
        let small = RgbaImage::from_pixel(10, 5, Rgba([1, 2, 3, 255]));
        assert_eq!(fit_to_width(small.clone(), 100), small);
        let big = RgbaImage::from_pixel(200, 50, Rgba([9, 9, 9, 255]));
        let out = fit_to_width(big, 100);
        assert_eq!(out.dimensions(), (100, 25));
        assert_eq!(out.get_pixel(50, 10), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn png_export_decodes_to_same_pixels() {
        let mut img = RgbaImage::from_pixel(7, 3, Rgba([10, 20, 30, 255]));
        img.put_pixel(2, 1, Rgba([200, 0, 100, 128]));
        let bytes = encode_to_vec(&img, SaveFormat::Png, 90).unwrap();
        assert_eq!(decode_image_bytes(&bytes).unwrap(), img);
    }

    #[test]
    fn every_format_encodes() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([50, 60, 70, 255]));
        for f in SaveFormat::all() {
            let bytes = encode_to_vec(&img, *f, 90).unwrap();
            assert!(!bytes.is_empty(), "{:?}", f);
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode_image_bytes(b"definitely not an image"),
            Err(LoadError::Decode(_))
        ));
    }

    #[test]
    fn export_name_follows_format() {
        assert_eq!(
            export_file_name("removed-watermark.png", SaveFormat::Jpeg),
            "removed-watermark.jpg"
        );
        assert_eq!(export_file_name("out", SaveFormat::Tiff), "out.tiff");
    }

    #[test]
    fn session_bytes_round_trip_and_reject_bad_magic() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([4, 5, 6, 255]));
        let session = SessionFileV1::new(
            &img,
            25.0,
            vec![StrokeRecord {
                points: vec![[1.0, 1.0], [2.0, 1.5]],
                width: 25.0,
            }],
        );
        let raw = bincode::serialize(&session).unwrap();
        let back = decode_session(&raw).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.image().unwrap(), img);

        let mut bad = raw.clone();
        bad[8] = b'X';
        assert!(matches!(decode_session(&bad), Err(SessionError::InvalidFormat(_))));
    }

    #[test]
    fn dialogs_start_in_the_image_folder() {
        let mut handler = FileHandler::new();
        assert_eq!(handler.start_directory(), None);
        handler.track(Some(Path::new("shots/cat.png")));
        assert_eq!(handler.start_directory(), Some(Path::new("shots")));
        handler.track(Some(Path::new("cat.png")));
        assert_eq!(handler.start_directory(), None);
        handler.track(None);
        assert_eq!(handler.start_directory(), None);
    }

    #[test]
    fn session_with_non_finite_stroke_is_rejected() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([4, 5, 6, 255]));
        let stroke = |points: Vec<[f32; 2]>, width: f32| StrokeRecord { points, width };
        for strokes in [
            vec![stroke(vec![[1.0, 1.0], [f32::NAN, 1.0]], 10.0)],
            vec![stroke(vec![[1.0, f32::INFINITY]], 10.0)],
            vec![stroke(vec![[1.0, 1.0]], f32::NAN)],
            vec![stroke(vec![[1.0, 1.0]], 10.0), stroke(vec![[2.0, 2.0]], -4.0)],
        ] {
            let raw = bincode::serialize(&SessionFileV1::new(&img, 20.0, strokes)).unwrap();
            assert!(matches!(decode_session(&raw), Err(SessionError::InvalidFormat(_))));
        }

        let raw = bincode::serialize(&SessionFileV1::new(&img, f32::NAN, Vec::new())).unwrap();
        assert!(matches!(decode_session(&raw), Err(SessionError::InvalidFormat(_))));
    }
}
