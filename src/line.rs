//! Straight lines drawn from an anchor to the pointer, with optional dash and
//! arrow head.

use std::f32::consts::TAU;

use egui::{Pos2, pos2};

use crate::brush::Brush;
use crate::color::Paint;
use crate::history::History;
use crate::surface::{StrokeStyle, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Arrow,
    Dashed,
    /// Not a line style strictly: fills shapes when they are finalized.
    ShapeFill,
}

impl LineStyle {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'a' => Some(LineStyle::Arrow),
            'd' => Some(LineStyle::Dashed),
            'f' => Some(LineStyle::ShapeFill),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LineStyle::Arrow => "arrow",
            LineStyle::Dashed => "dashed",
            LineStyle::ShapeFill => "shape-fill",
        }
    }
}

/// Per-pen set of toggled styles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStyles {
    arrow: bool,
    dashed: bool,
    shape_fill: bool,
}

impl LineStyles {
    fn slot(&mut self, style: LineStyle) -> &mut bool {
        match style {
            LineStyle::Arrow => &mut self.arrow,
            LineStyle::Dashed => &mut self.dashed,
            LineStyle::ShapeFill => &mut self.shape_fill,
        }
    }

    /// Flips `style` and returns whether it is now on.
    pub fn toggle(&mut self, style: LineStyle) -> bool {
        let slot = self.slot(style);
        *slot = !*slot;
        log::debug!("Style {} {}", style.name(), if *slot { "on" } else { "off" });
        *slot
    }

    pub fn has(&self, style: LineStyle) -> bool {
        match style {
            LineStyle::Arrow => self.arrow,
            LineStyle::Dashed => self.dashed,
            LineStyle::ShapeFill => self.shape_fill,
        }
    }
}

/// Triangle of circumradius `radius` pointing along `start → end`, with its
/// tip on `end`.
pub fn arrow_head(radius: f32, start: Pos2, end: Pos2) -> [Pos2; 3] {
    let theta = (end.y - start.y).atan2(end.x - start.x);
    let alpha = TAU / 3.0;
    std::array::from_fn(|i| {
        let angle = theta + i as f32 * alpha;
        pos2(
            radius * (angle.cos() - theta.cos()) + end.x,
            radius * (angle.sin() - theta.sin()) + end.y,
        )
    })
}

#[derive(Debug, Default)]
pub struct Line {
    start: Option<Pos2>,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, at: Pos2) {
        self.start = Some(at);
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn anchor(&self) -> Option<Pos2> {
        self.start
    }

    /// Redraws the line from the anchor to `to` on top of the last committed
    /// state. Nothing happens before [`start`](Self::start).
    pub fn update(
        &self,
        to: Pos2,
        surface: &mut Surface,
        history: &mut History,
        styles: &LineStyles,
        brush: &Brush,
        light_mode: bool,
    ) {
        let Some(start) = self.start else { return };
        history.travel(0, surface);

        let color = brush.color(light_mode);
        let stroke = StrokeStyle {
            color,
            width: brush.brush_size() * 4.0,
            dashed: styles.has(LineStyle::Dashed),
        };
        surface.draw_path(vec![vec![start, to]], false, Paint::NONE, Some(stroke));

        if styles.has(LineStyle::Arrow) && start != to {
            let head = arrow_head(brush.brush_size() * 8.0, start, to);
            surface.draw_path(
                vec![head.to_vec()],
                true,
                Paint::solid(color),
                Some(StrokeStyle::solid(color, stroke.width)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BrushSettings;
    use crate::surface::{LayerId, SvgRenderer, VectorOp};

    #[test]
    fn arrow_head_tip_sits_on_line_end() {
        let head = arrow_head(8.0, pos2(0.0, 0.0), pos2(100.0, 0.0));
        assert!((head[0] - pos2(100.0, 0.0)).length() < 1e-4);
        // The two back corners straddle the line symmetrically.
        assert!((head[1].y + head[2].y).abs() < 1e-4);
        assert!(head[1].x < 100.0 && head[2].x < 100.0);
    }

    #[test]
    fn previews_do_not_accumulate() {
        let mut surface = Surface::new(LayerId::Pen, 100, 100, Arc::new(SvgRenderer::default()));
        let mut history = History::new(10, &surface);
        let brush = Brush::new(&BrushSettings::default());
        let mut styles = LineStyles::default();
        styles.toggle(LineStyle::Dashed);

        let mut line = Line::new();
        line.update(pos2(50.0, 50.0), &mut surface, &mut history, &styles, &brush, false);
        assert_eq!(surface.record().op_count(), 0, "nothing before start");

        line.start(pos2(10.0, 10.0));
        for x in [20.0, 40.0, 60.0] {
            line.update(pos2(x, 30.0), &mut surface, &mut history, &styles, &brush, false);
        }
        let ops: Vec<_> = surface.record().ops().collect();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            ops[0],
            VectorOp::Path { stroke: Some(StrokeStyle { dashed: true, .. }), closed: false, .. }
        ));
    }

    #[test]
    fn arrow_style_adds_a_filled_head() {
        let mut surface = Surface::new(LayerId::Pen, 100, 100, Arc::new(SvgRenderer::default()));
        let mut history = History::new(10, &surface);
        let brush = Brush::new(&BrushSettings::default());
        let mut styles = LineStyles::default();
        assert!(styles.toggle(LineStyle::Arrow));

        let mut line = Line::new();
        line.start(pos2(10.0, 10.0));
        line.update(pos2(80.0, 10.0), &mut surface, &mut history, &styles, &brush, false);
        assert_eq!(surface.record().op_count(), 2);
        assert!(!styles.toggle(LineStyle::Arrow));
    }
}
