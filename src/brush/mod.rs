//! The pressure-sensitive brush: stroke sampling, live preview and the
//! final filled stroke.

pub mod outline;

use egui::{Color32, Pos2, Rect, vec2};

use crate::color::Paint;
use crate::config::BrushSettings;
use crate::history::History;
use crate::snippet::MacroPoint;
use crate::surface::{StrokeStyle, Surface};
use outline::{OutlineOptions, stroke_outline};

/// Palette slot used to tint the brush while a macro is being recorded.
const RECORDING_COLOR_INDEX: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushPoint {
    pub pos: Pos2,
    pub pressure: f32,
}

/// What a finished gesture left on the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum BrushMark {
    Dot { center: Pos2, radius: f32 },
    Stroke { outline: Vec<Pos2> },
    Erased,
}

#[derive(Debug)]
pub struct Brush {
    brush_size: f32,
    eraser_size: f32,
    sensitivity: f32,
    eraser: bool,
    color_index: usize,
    dark_palette: Vec<Color32>,
    light_palette: Vec<Color32>,
    tap_threshold: f32,
    points: Vec<BrushPoint>,
    recording: Option<Vec<MacroPoint>>,
    color_before_recording: Option<usize>,
}

impl Brush {
    pub fn new(settings: &BrushSettings) -> Self {
        Self {
            brush_size: settings.size,
            eraser_size: settings.eraser_size,
            sensitivity: settings.sensitivity,
            eraser: false,
            color_index: 0,
            dark_palette: settings.dark_palette.clone(),
            light_palette: settings.light_palette.clone(),
            tap_threshold: settings.tap_threshold,
            points: Vec::new(),
            recording: None,
            color_before_recording: None,
        }
    }

    /// Base size of whichever tip is active.
    pub fn size(&self) -> f32 {
        if self.eraser {
            self.eraser_size
        } else {
            self.brush_size
        }
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn is_eraser(&self) -> bool {
        self.eraser
    }

    pub fn color_index(&self) -> usize {
        self.color_index
    }

    pub fn is_drawing(&self) -> bool {
        !self.points.is_empty()
    }

    pub fn toggle_eraser(&mut self) {
        self.eraser = !self.eraser;
    }

    pub fn increase_size(&mut self) {
        if self.eraser {
            self.eraser_size += 1.0;
        } else {
            self.brush_size += 0.5;
        }
    }

    pub fn decrease_size(&mut self) {
        if self.eraser {
            self.eraser_size = (self.eraser_size - 1.0).max(1.0);
        } else {
            self.brush_size = (self.brush_size - 0.5).max(0.5);
        }
    }

    pub fn increase_sensitivity(&mut self) {
        self.sensitivity += 2.0;
    }

    pub fn decrease_sensitivity(&mut self) {
        self.sensitivity = (self.sensitivity - 2.0).max(1.0);
    }

    pub fn next_color(&mut self) {
        let len = self.dark_palette.len().max(1);
        self.color_index = (self.color_index + 1) % len;
    }

    pub fn previous_color(&mut self) {
        let len = self.dark_palette.len().max(1);
        self.color_index = (self.color_index + len - 1) % len;
    }

    pub fn color(&self, light_mode: bool) -> Color32 {
        let palette = if light_mode {
            &self.light_palette
        } else {
            &self.dark_palette
        };
        palette
            .get(self.color_index)
            .or_else(|| palette.first())
            .copied()
            .unwrap_or(Color32::WHITE)
    }

    /// Tip width for a sample: `base + (base * pressure)^(1 + sensitivity)`.
    pub fn adjusted_width(&self, pressure: f32) -> f32 {
        let base = self.size();
        base + (base * pressure.clamp(0.0, 1.0)).powf(1.0 + self.sensitivity)
    }

    /// Width used along interpolated strokes, where pressure goes through a
    /// logistic response first so light and heavy input both stay usable.
    fn stroke_radius(&self, pressure: f32) -> f32 {
        let response = 1.0 / (1.0 + (-6.0 * (pressure - 0.5)).exp());
        self.adjusted_width(response)
    }

    /// Adds one sample of the stroke in progress and updates the surface.
    ///
    /// The eraser clears right away. The brush previews on the raster only,
    /// after rolling the surface back to its last committed snapshot.
    pub fn add_sample(
        &mut self,
        sample: BrushPoint,
        surface: &mut Surface,
        history: &mut History,
        light_mode: bool,
    ) {
        let width = self.adjusted_width(sample.pressure);
        if let Some(recording) = &mut self.recording {
            recording.push(MacroPoint(sample.pos.x, sample.pos.y, width, self.eraser));
        }

        if self.eraser {
            let from = self.points.last().map(|p| p.pos);
            self.points.push(sample);
            erase_segment(surface, from, sample.pos, width);
            return;
        }

        self.points.push(sample);
        let color = self.color(light_mode);
        if self.points.len() == 1 {
            surface.canvas_mut().fill_circle(sample.pos, width, color);
            return;
        }
        history.travel(0, surface);
        match self.outline() {
            Some(outline) => surface.canvas_mut().fill_path(&[outline], color),
            None => surface.canvas_mut().fill_circle(sample.pos, width, color),
        }
    }

    /// Ends the stroke, committing its final form to the surface. The caller
    /// is responsible for taking the history snapshot.
    pub fn finish(
        &mut self,
        surface: &mut Surface,
        history: &mut History,
        light_mode: bool,
    ) -> Option<BrushMark> {
        let points = std::mem::take(&mut self.points);
        let last = *points.last()?;
        if self.eraser {
            return Some(BrushMark::Erased);
        }

        let color = self.color(light_mode);
        history.travel(0, surface);
        let outline = if self.is_tap(&points) {
            None
        } else {
            self.outline_of(&points)
        };
        match outline {
            Some(outline) => {
                surface.draw_path(vec![outline.clone()], true, Paint::solid(color), None);
                Some(BrushMark::Stroke { outline })
            }
            None => {
                let radius = self.adjusted_width(last.pressure);
                surface.draw_circle(last.pos, radius, Paint::solid(color), None);
                Some(BrushMark::Dot {
                    center: last.pos,
                    radius,
                })
            }
        }
    }

    /// Stamps one recorded macro sample.
    pub fn stamp(&self, surface: &mut Surface, point: &MacroPoint, offset: Pos2, light_mode: bool) {
        let MacroPoint(x, y, size, eraser) = *point;
        let center = offset + vec2(x, y);
        if eraser {
            surface.clear_circle(center, size);
        } else {
            surface.draw_circle(center, size, Paint::solid(self.color(light_mode)), None);
        }
    }

    /// Draws the size/color swatch onto the preview surface.
    pub fn draw_swatch(&self, preview: &mut Surface, light_mode: bool) {
        let side = self.size() * 4.0 + 2.0;
        let border = 2.0;
        let total = (side + border * 2.0).ceil() as u32;
        preview.resize(total, total);
        let inner = Rect::from_min_size(egui::pos2(border, border), vec2(side, side));
        let color = self.color(light_mode);
        let canvas = preview.canvas_mut();
        if !self.eraser {
            canvas.fill_rect(inner, color);
        }
        canvas.stroke_rect(inner, &StrokeStyle::solid(color, border));
        preview.show();
    }

    /// Starts collecting samples for a macro, tinting the brush meanwhile.
    pub fn start_recording(&mut self) {
        self.recording = Some(Vec::new());
        self.color_before_recording = Some(self.color_index);
        self.color_index = RECORDING_COLOR_INDEX;
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn stop_recording(&mut self) -> Vec<MacroPoint> {
        if let Some(index) = self.color_before_recording.take() {
            self.color_index = index;
        }
        self.recording.take().unwrap_or_default()
    }

    fn outline(&self) -> Option<Vec<Pos2>> {
        self.outline_of(&self.points)
    }

    fn outline_of(&self, points: &[BrushPoint]) -> Option<Vec<Pos2>> {
        let positions: Vec<Pos2> = points.iter().map(|p| p.pos).collect();
        let radii: Vec<f32> = points.iter().map(|p| self.stroke_radius(p.pressure)).collect();
        stroke_outline(&positions, &radii, OutlineOptions::default())
    }

    /// A gesture that never strays from its first sample is a tap.
    fn is_tap(&self, points: &[BrushPoint]) -> bool {
        let Some(first) = points.first() else {
            return true;
        };
        points.iter().all(|p| {
            (p.pos.x - first.pos.x).abs() < self.tap_threshold
                && (p.pos.y - first.pos.y).abs() < self.tap_threshold
        })
    }
}

fn erase_segment(surface: &mut Surface, from: Option<Pos2>, to: Pos2, radius: f32) {
    let Some(from) = from else {
        surface.clear_circle(to, radius);
        return;
    };
    let distance = from.distance(to);
    let step = (radius / 2.0).max(0.5);
    let steps = (distance / step).ceil().max(1.0) as usize;
    for i in 1..=steps {
        let t = i as f32 / steps as f32;
        surface.clear_circle(from.lerp(to, t), radius);
    }
}
