use std::path::PathBuf;

use crate::io::SaveFormat;
use crate::ops::inpaint::InpaintMethod;

/// Persisted preferences. Stored as `key=value` lines; unknown keys are
/// ignored and unparsable values fall back to their defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Width cap applied when an image is loaded (never upscales).
    pub max_width: u32,
    /// Brush diameter in canvas pixels.
    pub brush_size: f32,
    pub inpaint_radius: u32,
    pub inpaint_method: InpaintMethod,
    /// Gray level a mask pixel must exceed to count as marked.
    pub mask_threshold: u8,
    /// Fallback readiness probe interval while the engine loads.
    pub engine_poll_ms: u64,
    /// Delay between the processing notice appearing and the inpaint starting.
    pub invoke_delay_ms: u64,
    /// Completed inpaint passes kept for undo.
    pub max_undo_steps: usize,
    pub export_name: String,
    pub export_format: SaveFormat,
    pub jpeg_quality: u8,
}

pub const BRUSH_MIN: f32 = 5.0;
pub const BRUSH_MAX: f32 = 80.0;
/// Largest inpaint radius the default engine accepts.
pub const RADIUS_MAX: u32 = 32;

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_width: 1280,
            brush_size: 20.0,
            inpaint_radius: 5,
            inpaint_method: InpaintMethod::Telea,
            mask_threshold: 100,
            engine_poll_ms: 500,
            invoke_delay_ms: 100,
            max_undo_steps: 20,
            export_name: "removed-watermark.png".to_string(),
            export_format: SaveFormat::Png,
            jpeg_quality: 90,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/dewatermark/dewatermark_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Dewatermark\dewatermark_settings.cfg
    /// On macOS:   ~/Library/Application Support/Dewatermark/dewatermark_settings.cfg
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("dewatermark");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("dewatermark_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("Dewatermark");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("dewatermark_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("Dewatermark");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("dewatermark_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("dewatermark_settings.cfg")))
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_width={}\n\
             brush_size={}\n\
             inpaint_radius={}\n\
             inpaint_method={}\n\
             mask_threshold={}\n\
             engine_poll_ms={}\n\
             invoke_delay_ms={}\n\
             max_undo_steps={}\n\
             export_name={}\n\
             export_format={}\n\
             jpeg_quality={}\n",
            self.max_width,
            self.brush_size,
            self.inpaint_radius,
            self.inpaint_method.key(),
            self.mask_threshold,
            self.engine_poll_ms,
            self.invoke_delay_ms,
            self.max_undo_steps,
            self.export_name,
            self.export_format.extension(),
            self.jpeg_quality,
        )
    }

    pub fn from_config_str(content: &str) -> Self {
        let d = Self::default();
        let mut s = d.clone();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_width" => {
                    s.max_width = val.parse().ok().filter(|&w| w > 0).unwrap_or(d.max_width);
                }
                "brush_size" => {
                    s.brush_size = val
                        .parse::<f32>()
                        .map(|b| b.clamp(BRUSH_MIN, BRUSH_MAX))
                        .unwrap_or(d.brush_size);
                }
                "inpaint_radius" => {
                    s.inpaint_radius = val
                        .parse::<u32>()
                        .map(|r| r.clamp(1, RADIUS_MAX))
                        .unwrap_or(d.inpaint_radius);
                }
                "inpaint_method" => {
                    s.inpaint_method = InpaintMethod::from_key(val).unwrap_or(d.inpaint_method);
                }
                "mask_threshold" => {
                    s.mask_threshold = val.parse().unwrap_or(d.mask_threshold);
                }
                "engine_poll_ms" => {
                    s.engine_poll_ms =
                        val.parse().ok().filter(|&ms| ms > 0).unwrap_or(d.engine_poll_ms);
                }
                "invoke_delay_ms" => {
                    s.invoke_delay_ms = val.parse().unwrap_or(d.invoke_delay_ms);
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(d.max_undo_steps);
                }
                "export_name" if !val.is_empty() => {
                    s.export_name = val.to_string();
                }
                "export_format" => {
                    s.export_format = SaveFormat::from_extension(val).unwrap_or(d.export_format);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val
                        .parse::<u8>()
                        .map(|q| q.clamp(1, 100))
                        .unwrap_or(d.jpeg_quality);
                }
                _ => {}
            }
        }
        s
    }

    /// Save settings to disk. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            crate::log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::from_config_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        assert_eq!(AppSettings::from_config_str(""), AppSettings::default());
    }

    #[test]
    fn serialised_settings_parse_back() {
        let s = AppSettings {
            max_width: 800,
            brush_size: 33.0,
            inpaint_method: InpaintMethod::PatchMatch,
            export_format: SaveFormat::Jpeg,
            export_name: "clean.jpg".into(),
            ..Default::default()
        };
        assert_eq!(AppSettings::from_config_str(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_fall_back_per_key() {
        let s = AppSettings::from_config_str(
            "max_width=0\nbrush_size=500\ninpaint_method=magic\nmask_threshold=abc\n\
             jpeg_quality=0\nnonsense\nunknown_key=3\n# inpaint_radius=9\n",
        );
        assert_eq!(s.max_width, 1280);
        assert_eq!(s.brush_size, BRUSH_MAX);
        assert_eq!(s.inpaint_method, InpaintMethod::Telea);
        assert_eq!(s.mask_threshold, 100);
        assert_eq!(s.jpeg_quality, 1);
        assert_eq!(s.inpaint_radius, 5);

        let s = AppSettings::from_config_str("inpaint_radius=40\n");
        assert_eq!(s.inpaint_radius, RADIUS_MAX);
        let s = AppSettings::from_config_str("inpaint_radius=0\n");
        assert_eq!(s.inpaint_radius, 1);
    }

    #[test]
    fn radius_ceiling_matches_engine() {
        assert_eq!(RADIUS_MAX, crate::engine::EngineConfig::default().max_radius);
    }
}
