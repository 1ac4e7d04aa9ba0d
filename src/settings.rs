use std::path::{Path, PathBuf};

use image::Rgba;

use crate::canvas::{CompositeMode, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::components::gesture::GestureLimits;
use crate::components::history::{DEFAULT_HISTORY_CAPACITY, HistoryManager};
use crate::components::tools::BrushSettings;
use crate::{log_info, log_warn};

/// Editor tunables, persisted as a `key=value` text file.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub history_capacity: usize,
    /// History memory budget in MiB; 0 disables the budget.
    pub history_memory_mb: usize,
    pub min_scale: f64,
    pub max_scale: f64,
    pub zoom_in_step: f64,
    pub zoom_out_step: f64,
    pub rotate_step_deg: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub brush: BrushSettings,
}

impl Default for EditorSettings {
    fn default() -> Self {
        let limits = GestureLimits::default();
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_memory_mb: 512,
            min_scale: limits.min_scale,
            max_scale: limits.max_scale,
            zoom_in_step: limits.zoom_in_step,
            zoom_out_step: limits.zoom_out_step,
            rotate_step_deg: limits.rotate_step_deg,
            canvas_width: DEFAULT_WIDTH,
            canvas_height: DEFAULT_HEIGHT,
            brush: BrushSettings::default(),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/layerpaint/layerpaint_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\LayerPaint\layerpaint_settings.cfg
    /// On macOS:   ~/Library/Application Support/LayerPaint/layerpaint_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("layerpaint");
            return Some(config_dir.join("layerpaint_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("LayerPaint").join("layerpaint_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("LayerPaint")
                    .join("layerpaint_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("layerpaint_settings.cfg")))
        }
    }

    /// Serialize a color as "r,g,b,a"
    fn color_to_str(c: Rgba<u8>) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a color from "r,g,b,a"
    fn str_to_color(s: &str) -> Option<Rgba<u8>> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let mut out = [0u8; 4];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = part.trim().parse::<u8>().ok()?;
        }
        Some(Rgba(out))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "history_capacity={}\n\
             history_memory_mb={}\n\
             min_scale={}\n\
             max_scale={}\n\
             zoom_in_step={}\n\
             zoom_out_step={}\n\
             rotate_step_deg={}\n\
             canvas_width={}\n\
             canvas_height={}\n\
             brush_color={}\n\
             brush_width={}\n\
             brush_mode={}\n",
            self.history_capacity,
            self.history_memory_mb,
            self.min_scale,
            self.max_scale,
            self.zoom_in_step,
            self.zoom_out_step,
            self.rotate_step_deg,
            self.canvas_width,
            self.canvas_height,
            Self::color_to_str(self.brush.color),
            self.brush.width,
            self.brush.mode.name(),
        )
    }

    /// Parse `key=value` lines.  Unknown keys and blank or `#` lines are
    /// skipped; malformed or out-of-range values keep the default.
    pub fn parse(content: &str) -> Self {
        let defaults = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "history_capacity" => {
                    s.history_capacity = val.parse::<usize>().ok().filter(|v| *v > 0).unwrap_or(defaults.history_capacity);
                }
                "history_memory_mb" => {
                    s.history_memory_mb = val.parse().unwrap_or(defaults.history_memory_mb);
                }
                "min_scale" => {
                    s.min_scale = parse_positive(val).unwrap_or(defaults.min_scale);
                }
                "max_scale" => {
                    s.max_scale = parse_positive(val).unwrap_or(defaults.max_scale);
                }
                "zoom_in_step" => {
                    s.zoom_in_step = parse_positive(val).unwrap_or(defaults.zoom_in_step);
                }
                "zoom_out_step" => {
                    s.zoom_out_step = parse_positive(val).unwrap_or(defaults.zoom_out_step);
                }
                "rotate_step_deg" => {
                    s.rotate_step_deg = parse_positive(val).unwrap_or(defaults.rotate_step_deg);
                }
                "canvas_width" => {
                    s.canvas_width = val.parse::<u32>().ok().filter(|v| *v > 0).unwrap_or(defaults.canvas_width);
                }
                "canvas_height" => {
                    s.canvas_height = val.parse::<u32>().ok().filter(|v| *v > 0).unwrap_or(defaults.canvas_height);
                }
                "brush_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.brush.color = c;
                    }
                }
                "brush_width" => {
                    s.brush.width = val
                        .parse::<f32>()
                        .ok()
                        .filter(|v| v.is_finite() && *v > 0.0)
                        .unwrap_or(defaults.brush.width);
                }
                "brush_mode" => {
                    s.brush.mode = CompositeMode::from_name(val).unwrap_or(defaults.brush.mode);
                }
                _ => {}
            }
        }
        if s.min_scale > s.max_scale {
            log_warn!(
                "settings: min_scale {} > max_scale {}, using defaults",
                s.min_scale, s.max_scale
            );
            s.min_scale = defaults.min_scale;
            s.max_scale = defaults.max_scale;
        }
        s
    }

    /// Load settings from the platform path (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                log_info!("settings: loaded {}", path.display());
                Self::parse(&content)
            }
            Err(_) => Self::default(),
        }
    }

    /// Save to the platform path.  Failures are logged.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("settings: could not write {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    // ---- derived component configuration -----------------------------------

    pub fn gesture_limits(&self) -> GestureLimits {
        GestureLimits {
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            zoom_in_step: self.zoom_in_step,
            zoom_out_step: self.zoom_out_step,
            rotate_step_deg: self.rotate_step_deg,
        }
    }

    pub fn history_memory_bytes(&self) -> Option<usize> {
        match self.history_memory_mb {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    pub fn new_history(&self) -> HistoryManager {
        HistoryManager::new(self.history_capacity, self.history_memory_bytes())
    }
}

fn parse_positive(val: &str) -> Option<f64> {
    val.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_text() {
        let mut s = EditorSettings::default();
        s.history_capacity = 42;
        s.max_scale = 8.0;
        s.brush = BrushSettings::new(Rgba([1, 2, 3, 4]), 7.5, CompositeMode::Erase);
        let parsed = EditorSettings::parse(&s.to_config_string());
        assert_eq!(parsed, s);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let s = EditorSettings::parse(
            "history_capacity=lots\nmin_scale=-1\nzoom_in_step=0\nbrush_color=1,2\nunknown_key=5\nno equals sign\n",
        );
        assert_eq!(s, EditorSettings::default());
    }

    #[test]
    fn test_inverted_scale_range_resets() {
        let s = EditorSettings::parse("min_scale=5\nmax_scale=2\n");
        assert_eq!(s.min_scale, 0.05);
        assert_eq!(s.max_scale, 20.0);
    }

    #[test]
    fn test_memory_budget_zero_disables() {
        let s = EditorSettings::parse("history_memory_mb=0");
        assert_eq!(s.history_memory_bytes(), None);
        assert_eq!(EditorSettings::default().history_memory_bytes(), Some(512 * 1024 * 1024));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("layerpaint-settings-{}", std::process::id()));
        let path = dir.join("test.cfg");
        let mut s = EditorSettings::default();
        s.canvas_width = 320;
        s.save_to(&path).unwrap();
        let loaded = EditorSettings::load_from(&path);
        assert_eq!(loaded.canvas_width, 320);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
