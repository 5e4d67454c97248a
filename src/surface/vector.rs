//! The vector side of a surface: an append-only list of drawing operations
//! that mirrors what was rasterized, serializable as SVG elements.

use std::fmt::Write as _;
use std::sync::Arc;

use egui::{Color32, Pos2, Rect};

use super::fragment::Fragment;
use crate::color::{Paint, to_css};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color32,
    pub width: f32,
    pub dashed: bool,
}

impl StrokeStyle {
    pub fn solid(color: Color32, width: f32) -> Self {
        Self {
            color,
            width,
            dashed: false,
        }
    }
}

/// Region removed from everything painted before it.
#[derive(Debug, Clone, PartialEq)]
pub enum Erase {
    Rect(Rect),
    Circle { center: Pos2, radius: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VectorOp {
    Rect {
        rect: Rect,
        fill: Paint,
        stroke: Option<StrokeStyle>,
    },
    Path {
        subpaths: Vec<Vec<Pos2>>,
        closed: bool,
        fill: Paint,
        stroke: Option<StrokeStyle>,
    },
    Circle {
        center: Pos2,
        radius: f32,
        fill: Paint,
        stroke: Option<StrokeStyle>,
    },
    /// Pre-built SVG elements (text, tables, path primitives).
    Markup(String),
    /// Pixels with no vector form, embedded as a PNG.
    Raster {
        origin: Pos2,
        width: u32,
        height: u32,
        png_base64: String,
    },
    Erase(Erase),
}

/// Operations plus the fragments committed to the surface's persistent
/// vector overlay. Cloning is cheap; snapshots keep their own copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorRecord {
    ops: Vec<Arc<VectorOp>>,
    fragments: Vec<Arc<Fragment>>,
}

impl VectorRecord {
    pub fn push(&mut self, op: VectorOp) {
        self.ops.push(Arc::new(op));
    }

    pub fn ops(&self) -> impl Iterator<Item = &VectorOp> {
        self.ops.iter().map(|op| op.as_ref())
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn commit_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(Arc::new(fragment));
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().map(|f| f.as_ref())
    }

    pub fn has_fragments(&self) -> bool {
        !self.fragments.is_empty()
    }

    pub fn clear_fragments(&mut self) {
        self.fragments.clear();
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.fragments.clear();
    }

    /// Serializes the operations into SVG elements.
    ///
    /// Erase runs become masks applied to everything drawn before them;
    /// their definitions are appended to `defs` under ids starting with
    /// `id_prefix`.
    pub fn to_svg(&self, width: f32, height: f32, id_prefix: &str, defs: &mut Vec<String>) -> String {
        let mut body = String::new();
        let mut pending_erase: Vec<&Erase> = Vec::new();
        let mut mask_count = 0;

        let mut flush = |body: &mut String, erases: &mut Vec<&Erase>| {
            if erases.is_empty() {
                return;
            }
            let id = format!("{id_prefix}-erase-{mask_count}");
            mask_count += 1;
            let mut mask = format!(
                "<mask id=\"{id}\" maskUnits=\"userSpaceOnUse\" x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\">\
                 <rect x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\" fill=\"white\"/>",
                w = num(width),
                h = num(height),
            );
            for erase in erases.drain(..) {
                mask.push_str(&erase_element(erase));
            }
            mask.push_str("</mask>");
            defs.push(mask);
            *body = format!("<g mask=\"url(#{id})\">{body}</g>");
        };

        for op in self.ops() {
            match op {
                VectorOp::Erase(erase) => pending_erase.push(erase),
                other => {
                    flush(&mut body, &mut pending_erase);
                    body.push_str(&element(other));
                }
            }
        }
        flush(&mut body, &mut pending_erase);
        body
    }
}

fn erase_element(erase: &Erase) -> String {
    match erase {
        Erase::Rect(rect) => format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"black\"/>",
            num(rect.min.x),
            num(rect.min.y),
            num(rect.width()),
            num(rect.height())
        ),
        Erase::Circle { center, radius } => format!(
            "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"black\"/>",
            num(center.x),
            num(center.y),
            num(*radius)
        ),
    }
}

fn element(op: &VectorOp) -> String {
    match op {
        VectorOp::Rect { rect, fill, stroke } => format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"{}/>",
            num(rect.min.x),
            num(rect.min.y),
            num(rect.width()),
            num(rect.height()),
            paint_attrs(*fill, stroke.as_ref())
        ),
        VectorOp::Path {
            subpaths,
            closed,
            fill,
            stroke,
        } => format!(
            "<path d=\"{}\"{}/>",
            path_data(subpaths, *closed),
            paint_attrs(*fill, stroke.as_ref())
        ),
        VectorOp::Circle {
            center,
            radius,
            fill,
            stroke,
        } => format!(
            "<circle cx=\"{}\" cy=\"{}\" r=\"{}\"{}/>",
            num(center.x),
            num(center.y),
            num(*radius),
            paint_attrs(*fill, stroke.as_ref())
        ),
        VectorOp::Markup(markup) => markup.clone(),
        VectorOp::Raster {
            origin,
            width,
            height,
            png_base64,
        } => format!(
            "<image x=\"{}\" y=\"{}\" width=\"{width}\" height=\"{height}\" xlink:href=\"data:image/png;base64,{png_base64}\"/>",
            num(origin.x),
            num(origin.y)
        ),
        VectorOp::Erase(erase) => erase_element(erase),
    }
}

fn paint_attrs(fill: Paint, stroke: Option<&StrokeStyle>) -> String {
    let mut out = format!(" fill=\"{}\"", to_css(fill));
    if let Some(stroke) = stroke {
        let _ = write!(
            out,
            " stroke=\"{}\" stroke-width=\"{}\" stroke-linecap=\"round\" stroke-linejoin=\"round\"",
            to_css(stroke.color.into()),
            num(stroke.width)
        );
        if stroke.dashed {
            out.push_str(" stroke-dasharray=\"5 10\"");
        }
    }
    out
}

/// Builds SVG path data from polyline sub-paths.
pub fn path_data(subpaths: &[Vec<Pos2>], closed: bool) -> String {
    let mut d = String::new();
    for points in subpaths {
        for (i, p) in points.iter().enumerate() {
            if !d.is_empty() {
                d.push(' ');
            }
            let cmd = if i == 0 { 'M' } else { 'L' };
            let _ = write!(d, "{cmd}{} {}", num(p.x), num(p.y));
        }
        if closed && !points.is_empty() {
            d.push_str(" Z");
        }
    }
    d
}

/// Formats a coordinate with at most two decimals.
pub fn num(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

/// Escapes text for use inside SVG element content or attributes.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
