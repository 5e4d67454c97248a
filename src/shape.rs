//! Multi-phase placement of rectangles, circles, arcs and right triangles.
//!
//! A shape starts floating under the pointer. Each pointer-down advances the
//! phase counter, which counts down from `lengths + 2`:
//!
//! * `lengths + 2`: floating, the center follows the pointer
//! * `lengths + 1` down to `2`: adjusting one length each, in order
//! * `1`: rotating (skipped by circles and arcs)
//! * `0`: finalized into the owning surface
//!
//! While the shape is being edited it is drawn on an overlay surface only.

use std::f32::consts::{PI, TAU};

use egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};

use crate::color::Paint;
use crate::selection::pointer_angle;
use crate::surface::{StrokeStyle, Surface};

/// Color of the guide line shown while a length is adjusted.
const GUIDE_COLOR: Color32 = Color32::from_rgb(0xDC, 0x5A, 0x5E);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Arc,
    RightTriangle,
}

impl ShapeKind {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'r' => Some(ShapeKind::Rectangle),
            'c' => Some(ShapeKind::Circle),
            'a' => Some(ShapeKind::Arc),
            't' => Some(ShapeKind::RightTriangle),
            _ => None,
        }
    }

    /// Width/height for rectangles and triangles, radius for circles,
    /// radius and sweep for arcs.
    pub fn default_lengths(self) -> &'static [f32] {
        match self {
            ShapeKind::Rectangle | ShapeKind::RightTriangle => &[50.0, 50.0],
            ShapeKind::Circle => &[25.0],
            ShapeKind::Arc => &[25.0, PI],
        }
    }

    pub fn is_rotation_invariant(self) -> bool {
        matches!(self, ShapeKind::Circle | ShapeKind::Arc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeStyle {
    pub color: Color32,
    pub stroke_width: f32,
    pub fill: bool,
}

#[derive(Debug)]
pub struct Shape {
    kind: ShapeKind,
    lengths: Vec<f32>,
    phase: usize,
    /// Clicked corner for rectangles and triangles, center otherwise.
    origin: Pos2,
    angle: f32,
    alpha: Option<f32>,
    squared: bool,
    guide: Option<Pos2>,
    style: ShapeStyle,
}

impl Shape {
    pub fn new(kind: ShapeKind, style: ShapeStyle) -> Self {
        let lengths = kind.default_lengths().to_vec();
        Self {
            phase: lengths.len() + 2,
            kind,
            lengths,
            origin: Pos2::ZERO,
            angle: 0.0,
            alpha: None,
            squared: false,
            guide: None,
            style,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn lengths(&self) -> &[f32] {
        &self.lengths
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn is_floating(&self) -> bool {
        self.phase == self.lengths.len() + 2
    }

    pub fn is_rotating(&self) -> bool {
        self.phase == 1
    }

    pub fn center(&self) -> Pos2 {
        match self.kind {
            ShapeKind::Rectangle | ShapeKind::RightTriangle => {
                self.origin + vec2(self.lengths[0], self.lengths[1]) / 2.0
            }
            ShapeKind::Circle | ShapeKind::Arc => self.origin,
        }
    }

    /// Puts the shape's center under `at` and shows it.
    pub fn place(&mut self, at: Pos2, overlay: &mut Surface) {
        self.origin = match self.kind {
            ShapeKind::Rectangle | ShapeKind::RightTriangle => {
                at - vec2(self.lengths[0], self.lengths[1]) / 2.0
            }
            ShapeKind::Circle | ShapeKind::Arc => at,
        };
        self.render(overlay);
    }

    /// Follows the pointer according to the current phase.
    pub fn update(&mut self, pointer: Pos2, overlay: &mut Surface) {
        let dimensions = self.lengths.len();
        match self.phase {
            0 => return,
            1 => self.rotate_towards(pointer),
            p if p == dimensions + 2 => {
                self.place(pointer, overlay);
                return;
            }
            p => {
                let k = dimensions + 1 - p;
                self.lengths[k] = self.measure(k, pointer);
                self.guide = Some(pointer);
            }
        }
        self.render(overlay);
    }

    /// Advances to the next phase and returns it. Reaching phase 0 draws the
    /// shape onto `owner` and clears the overlay; once there, further calls
    /// do nothing.
    pub fn switch_phase(&mut self, overlay: &mut Surface, owner: &mut Surface) -> usize {
        if self.phase == 0 {
            return 0;
        }
        self.phase -= 1;
        self.guide = None;
        if self.phase == 1 {
            self.squared = true;
            if self.kind.is_rotation_invariant() {
                self.phase = 0;
            } else {
                self.begin_rotation();
            }
        }
        if self.phase == 0 {
            self.finalize(owner);
            self.cancel(overlay);
        } else {
            self.render(overlay);
        }
        log::debug!("{:?} now in phase {}", self.kind, self.phase);
        self.phase
    }

    pub fn begin_rotation(&mut self) {
        self.alpha = None;
    }

    pub fn rotate_towards(&mut self, pointer: Pos2) {
        if self.kind.is_rotation_invariant() {
            return;
        }
        let theta = pointer_angle(self.center(), pointer);
        let alpha = *self.alpha.get_or_insert(self.angle - theta);
        self.angle = theta + alpha;
    }

    pub fn cancel(&mut self, overlay: &mut Surface) {
        overlay.clear();
        overlay.hide();
    }

    /// Outline in surface coordinates, rotated; plus whether it is closed.
    pub fn outline(&self) -> (Vec<Pos2>, bool) {
        let (points, closed) = self.unrotated_outline();
        let center = self.center();
        let points = points
            .into_iter()
            .map(|p| rotate_about(p, center, self.angle))
            .collect();
        (points, closed)
    }

    fn unrotated_outline(&self) -> (Vec<Pos2>, bool) {
        let o = self.origin;
        match self.kind {
            ShapeKind::Rectangle => {
                let (w, h) = (self.lengths[0], self.lengths[1]);
                (
                    vec![o, o + vec2(w, 0.0), o + vec2(w, h), o + vec2(0.0, h)],
                    true,
                )
            }
            ShapeKind::RightTriangle => {
                let (w, h) = (self.lengths[0], self.lengths[1]);
                (vec![o, o + vec2(w, 0.0), o + vec2(0.0, h)], true)
            }
            ShapeKind::Circle => (arc_points(o, self.lengths[0], TAU), true),
            ShapeKind::Arc => (arc_points(o, self.lengths[0], self.lengths[1]), false),
        }
    }

    /// Area the overlay must cover: the outline's box plus the stroke, or
    /// once dimensions are fixed, a square sized to that box's diagonal so
    /// any rotation fits.
    pub fn overlay_rect(&self) -> Rect {
        let (points, _) = self.unrotated_outline();
        let mut rect = Rect::from_points(&points).union(Rect::from_center_size(self.origin, Vec2::ZERO));
        if let Some(guide) = self.guide {
            rect.extend_with(guide);
        }
        let rect = rect.expand(self.style.stroke_width + 2.0);
        if self.squared {
            let side = rect.width().hypot(rect.height()).ceil();
            Rect::from_center_size(self.center(), vec2(side, side))
        } else {
            rect
        }
    }

    fn measure(&self, k: usize, pointer: Pos2) -> f32 {
        let d = pointer - self.origin;
        match (self.kind, k) {
            (ShapeKind::Rectangle | ShapeKind::RightTriangle, 0) => d.x,
            (ShapeKind::Rectangle | ShapeKind::RightTriangle, _) => d.y,
            (ShapeKind::Circle, _) | (ShapeKind::Arc, 0) => d.length(),
            (ShapeKind::Arc, _) => {
                let sweep = (-d.y).atan2(d.x);
                if sweep <= 0.0 { sweep + TAU } else { sweep }
            }
        }
    }

    fn stroke(&self) -> StrokeStyle {
        StrokeStyle::solid(self.style.color, self.style.stroke_width)
    }

    fn fill(&self) -> Paint {
        if self.style.fill {
            Paint::solid(self.style.color)
        } else {
            Paint::NONE
        }
    }

    /// Draws the current state onto the overlay, raster only.
    pub fn render(&self, overlay: &mut Surface) {
        let rect = self.overlay_rect();
        overlay.resize(rect.width().ceil() as u32, rect.height().ceil() as u32);
        overlay.move_to(rect.min);
        let offset = rect.min.to_vec2();
        let (points, closed) = self.outline();
        let local: Vec<Pos2> = points.into_iter().map(|p| p - offset).collect();
        let stroke = self.stroke();
        let canvas = overlay.canvas_mut();
        if let Some(color) = self.fill().color() {
            canvas.fill_path(&[local.clone()], color);
        }
        canvas.stroke_path(&[local], closed, &stroke);
        if let Some(guide) = self.guide {
            let guide_style = StrokeStyle::solid(GUIDE_COLOR, (self.style.stroke_width / 2.0).max(1.0));
            canvas.stroke_path(&[vec![self.origin - offset, guide - offset]], false, &guide_style);
        }
        overlay.show();
    }

    fn finalize(&self, owner: &mut Surface) {
        if self.kind == ShapeKind::Circle {
            owner.draw_circle(self.origin, self.lengths[0].abs(), self.fill(), Some(self.stroke()));
            return;
        }
        let (points, closed) = self.outline();
        owner.draw_path(vec![points], closed, self.fill(), Some(self.stroke()));
    }
}

fn arc_points(center: Pos2, radius: f32, sweep: f32) -> Vec<Pos2> {
    let radius = radius.abs();
    let segments = ((sweep.abs() * radius / 4.0).ceil() as usize).clamp(8, 256);
    (0..=segments)
        .map(|i| {
            let t = sweep * i as f32 / segments as f32;
            pos2(center.x + radius * t.cos(), center.y - radius * t.sin())
        })
        .collect()
}

/// Rotates `p` counter-clockwise on screen by `angle` around `center`.
pub fn rotate_about(p: Pos2, center: Pos2, angle: f32) -> Pos2 {
    if angle == 0.0 {
        return p;
    }
    let d = p - center;
    let (sin, cos) = angle.sin_cos();
    pos2(
        center.x + d.x * cos + d.y * sin,
        center.y - d.x * sin + d.y * cos,
    )
}
