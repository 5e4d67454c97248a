//! User settings, read once at startup from a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::color;
use crate::error::ConfigError;

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "MAXWELL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)] // older files keep loading when fields are added
pub struct Settings {
    /// Address the controller connects to.
    pub listen_address: String,
    pub history_capacity: usize,
    pub clipboard_capacity: usize,
    /// Defaults to `~/.maxwell_snippets.json`.
    pub snippet_path: Option<PathBuf>,
    /// Defaults to `~/drawing.svg`.
    pub export_path: Option<PathBuf>,
    pub default_pen: char,
    pub default_font_size: f32,
    pub brush: BrushSettings,
    /// Chord (e.g. `"Control+r Meta+Shift+z"`) to action name, merged over
    /// the built-in table.
    pub keymap: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:1337".to_owned(),
            history_capacity: 100,
            clipboard_capacity: 10,
            snippet_path: None,
            export_path: None,
            default_pen: 'm',
            default_font_size: 12.0,
            brush: BrushSettings::default(),
            keymap: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    pub size: f32,
    pub eraser_size: f32,
    pub sensitivity: f32,
    #[serde(with = "palette")]
    pub dark_palette: Vec<Color32>,
    #[serde(with = "palette")]
    pub light_palette: Vec<Color32>,
    /// A gesture staying within this many pixels of its start is a tap.
    pub tap_threshold: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        let parse = |hex: &[&str]| {
            hex.iter()
                .map(|h| color::parse_or(h, Color32::WHITE))
                .collect::<Vec<_>>()
        };
        Self {
            size: 1.0,
            eraser_size: 8.0,
            sensitivity: 1.0,
            dark_palette: parse(&["#fdf4c1", "#6CA17A", "#cc6666", "#81a2be"]),
            light_palette: parse(&["#121112", "#6CA17A", "#cc6666", "#81a2be"]),
            tap_threshold: 4.0,
        }
    }
}

mod palette {
    use egui::Color32;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::color::Paint;

    pub fn serialize<S: Serializer>(colors: &[Color32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(colors.iter().map(|c| Paint::solid(*c)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Color32>, D::Error> {
        let paints = Vec::<Paint>::deserialize(deserializer)?;
        Ok(paints
            .into_iter()
            .map(|p| p.color().unwrap_or(Color32::TRANSPARENT))
            .collect())
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&text)?;
        Ok(settings)
    }

    /// Loads from `$MAXWELL_CONFIG` or the per-user config directory. A
    /// missing file means defaults; an unreadable one is logged and also
    /// falls back to defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            log::info!("No config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(err) => {
                log::warn!("Ignoring settings at {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "maxwell")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    pub fn snippet_path(&self) -> Option<PathBuf> {
        self.snippet_path
            .clone()
            .or_else(|| home_file(".maxwell_snippets.json"))
    }

    pub fn export_path(&self) -> Option<PathBuf> {
        self.export_path.clone().or_else(|| home_file("drawing.svg"))
    }
}

fn home_file(name: &str) -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(name))
}
