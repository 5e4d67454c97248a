//! Recorded brush macros and stored path snippets, keyed by a single
//! character and persisted as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use egui::Pos2;
use serde::{Deserialize, Serialize};

use crate::brush::Brush;
use crate::color::{Paint, to_css};
use crate::error::SnippetError;
use crate::surface::Surface;
use crate::surface::vector::{num, xml_escape};

/// One brush stamp: `[x, y, size, eraser]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroPoint(pub f32, pub f32, pub f32, pub bool);

/// A path snippet: `[path data, sx, sy, tx, ty]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSnippet(pub String, pub f32, pub f32, pub f32, pub f32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Snippet {
    Points(Vec<MacroPoint>),
    Svg(PathSnippet),
}

impl Snippet {
    /// Builds a point macro with coordinates relative to its top-left
    /// corner. Returns `None` for an empty recording.
    pub fn from_recording(points: Vec<MacroPoint>) -> Option<Self> {
        let min_x = points.iter().map(|p| p.0).reduce(f32::min)?;
        let min_y = points.iter().map(|p| p.1).reduce(f32::min)?;
        Some(Snippet::Points(
            points
                .into_iter()
                .map(|MacroPoint(x, y, size, eraser)| MacroPoint(x - min_x, y - min_y, size, eraser))
                .collect(),
        ))
    }

    /// Draws the snippet with its origin at `at`.
    pub fn draw(&self, surface: &mut Surface, brush: &Brush, at: Pos2, light_mode: bool) {
        match self {
            Snippet::Points(points) => {
                for point in points {
                    brush.stamp(surface, point, at, light_mode);
                }
            }
            Snippet::Svg(PathSnippet(d, sx, sy, tx, ty)) => {
                let markup = format!(
                    "<path d=\"{}\" transform=\"translate({} {}) scale({} {})\" fill=\"{}\"/>",
                    xml_escape(d),
                    num(at.x + tx),
                    num(at.y + ty),
                    sx,
                    sy,
                    to_css(Paint::solid(brush.color(light_mode)))
                );
                if let Err(err) = surface.draw_markup(markup) {
                    log::warn!("Path snippet did not render: {}", err);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct SnippetLibrary {
    snippets: BTreeMap<char, Snippet>,
    path: Option<PathBuf>,
    recording: Option<char>,
}

impl SnippetLibrary {
    /// An empty library that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the library at `path`; a missing file is an empty library that
    /// will be created on the first save.
    pub fn load(path: PathBuf) -> Result<Self, SnippetError> {
        let snippets = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        log::info!("Loaded {} snippets from {}", snippets.len(), path.display());
        Ok(Self {
            snippets,
            path: Some(path),
            recording: None,
        })
    }

    pub fn save(&self) -> Result<(), SnippetError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&self.snippets)?;
        std::fs::write(path, text)?;
        log::debug!("Saved {} snippets to {}", self.snippets.len(), path.display());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: char) -> Option<&Snippet> {
        self.snippets.get(&key)
    }

    pub fn insert(&mut self, key: char, snippet: Snippet) {
        self.snippets.insert(key, snippet);
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn recording_key(&self) -> Option<char> {
        self.recording
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn begin_recording(&mut self, key: char) {
        log::info!("Recording macro `{}`", key);
        self.recording = Some(key);
    }

    /// Drops the recording in progress without storing anything.
    pub fn cancel_recording(&mut self) -> Option<char> {
        let key = self.recording.take()?;
        log::info!("Macro `{}` abandoned", key);
        Some(key)
    }

    /// Stores the recorded samples under the key given to
    /// [`begin_recording`](Self::begin_recording) and saves the library.
    /// Returns the key if anything was stored.
    pub fn finish_recording(&mut self, points: Vec<MacroPoint>) -> Option<char> {
        let key = self.recording.take()?;
        let Some(snippet) = Snippet::from_recording(points) else {
            log::info!("Macro `{}` was empty, nothing stored", key);
            return None;
        };
        self.snippets.insert(key, snippet);
        if let Err(err) = self.save() {
            log::error!("Could not save snippets: {}", err);
        }
        Some(key)
    }
}
