use egui::{Color32, Pos2, Rect};
use tiny_skia::{
    BlendMode, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke,
    StrokeDash, Transform,
};

use super::svg_render::SvgRenderer;
use super::vector::StrokeStyle;
use crate::color::to_tiny_skia;
use crate::error::FragmentError;

/// A raster buffer with canvas-like semantics: resizing discards content and
/// zero-sized canvases are allowed (they simply ignore drawing).
#[derive(Clone)]
pub struct Canvas {
    pixmap: Option<Pixmap>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixmap: Pixmap::new(width, height),
            width,
            height,
        }
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            width: pixmap.width(),
            height: pixmap.height(),
            pixmap: Some(pixmap),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixmap = Pixmap::new(width, height);
    }

    pub fn clear(&mut self) {
        if let Some(pixmap) = &mut self.pixmap {
            pixmap.fill(tiny_skia::Color::TRANSPARENT);
        }
    }

    /// Returns true if no pixel has any coverage.
    pub fn is_blank(&self) -> bool {
        self.pixmap
            .as_ref()
            .is_none_or(|p| p.pixels().iter().all(|px| px.alpha() == 0))
    }

    pub fn clear_rect(&mut self, rect: Rect) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(r) = to_skia_rect(rect) {
            pixmap.fill_rect(r, &clear_paint(), Transform::identity(), None);
        }
    }

    pub fn clear_circle(&mut self, center: Pos2, radius: f32) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(path) = PathBuilder::from_circle(center.x, center.y, radius.max(0.5)) {
            pixmap.fill_path(&path, &clear_paint(), FillRule::Winding, Transform::identity(), None);
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color32) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(r) = to_skia_rect(rect) {
            pixmap.fill_rect(r, &solid_paint(color), Transform::identity(), None);
        }
    }

    pub fn stroke_rect(&mut self, rect: Rect, style: &StrokeStyle) {
        let corners = [
            rect.left_top(),
            rect.right_top(),
            rect.right_bottom(),
            rect.left_bottom(),
        ];
        self.stroke_path(&[corners.to_vec()], true, style);
    }

    pub fn fill_path(&mut self, subpaths: &[Vec<Pos2>], color: Color32) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(path) = build_path(subpaths, true) {
            pixmap.fill_path(
                &path,
                &solid_paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    pub fn stroke_path(&mut self, subpaths: &[Vec<Pos2>], closed: bool, style: &StrokeStyle) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(path) = build_path(subpaths, closed) {
            pixmap.stroke_path(
                &path,
                &solid_paint(style.color),
                &skia_stroke(style),
                Transform::identity(),
                None,
            );
        }
    }

    pub fn fill_circle(&mut self, center: Pos2, radius: f32, color: Color32) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(path) = PathBuilder::from_circle(center.x, center.y, radius.max(0.5)) {
            pixmap.fill_path(
                &path,
                &solid_paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    pub fn stroke_circle(&mut self, center: Pos2, radius: f32, style: &StrokeStyle) {
        let Some(pixmap) = &mut self.pixmap else { return };
        if let Some(path) = PathBuilder::from_circle(center.x, center.y, radius.max(0.5)) {
            pixmap.stroke_path(
                &path,
                &solid_paint(style.color),
                &skia_stroke(style),
                Transform::identity(),
                None,
            );
        }
    }

    /// Composites `src` with its top-left corner at `at`, snapped to whole
    /// pixels so that an unrotated copy lands pixel for pixel.
    pub fn draw_pixmap(&mut self, src: &Pixmap, at: Pos2) {
        let Some(pixmap) = &mut self.pixmap else { return };
        pixmap.draw_pixmap(
            at.x.round() as i32,
            at.y.round() as i32,
            src.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    pub fn draw_pixmap_transformed(&mut self, src: &Pixmap, transform: Transform) {
        let Some(pixmap) = &mut self.pixmap else { return };
        let paint = PixmapPaint {
            quality: tiny_skia::FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);
    }

    /// Copies the pixels under `rect` into a new buffer. Parts of the rect
    /// outside the canvas come back transparent.
    pub fn copy_region(&self, rect: Rect) -> Option<Pixmap> {
        let width = rect.width().round() as u32;
        let height = rect.height().round() as u32;
        let mut out = Pixmap::new(width, height)?;
        if let Some(src) = &self.pixmap {
            out.draw_pixmap(
                -(rect.min.x.round() as i32),
                -(rect.min.y.round() as i32),
                src.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Some(out)
    }

    pub fn render_markup(
        &mut self,
        renderer: &SvgRenderer,
        markup: &str,
    ) -> Result<(), FragmentError> {
        let Some(pixmap) = &mut self.pixmap else {
            return Ok(());
        };
        renderer.render_markup(pixmap, markup, Transform::identity())
    }
}

fn solid_paint(color: Color32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_tiny_skia(color));
    paint.anti_alias = true;
    paint
}

fn clear_paint() -> Paint<'static> {
    Paint {
        blend_mode: BlendMode::Clear,
        anti_alias: true,
        ..Paint::default()
    }
}

fn skia_stroke(style: &StrokeStyle) -> Stroke {
    Stroke {
        width: style.width.max(0.1),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        dash: if style.dashed {
            StrokeDash::new(vec![5.0, 10.0], 0.0)
        } else {
            None
        },
        ..Stroke::default()
    }
}

fn to_skia_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_ltrb(rect.min.x, rect.min.y, rect.max.x, rect.max.y)
}

pub(crate) fn build_path(subpaths: &[Vec<Pos2>], closed: bool) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for points in subpaths {
        let Some((first, rest)) = points.split_first() else {
            continue;
        };
        pb.move_to(first.x, first.y);
        if rest.is_empty() {
            // zero-length segment so round caps still leave a dot
            pb.line_to(first.x + 0.01, first.y);
        }
        for p in rest {
            pb.line_to(p.x, p.y);
        }
        if closed {
            pb.close();
        }
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    #[test]
    fn zero_sized_canvas_ignores_drawing() {
        let mut canvas = Canvas::new(0, 0);
        canvas.fill_rect(Rect::from_min_max(pos2(0.0, 0.0), pos2(5.0, 5.0)), Color32::RED);
        assert!(canvas.pixmap().is_none());
        assert!(canvas.is_blank());
    }

    #[test]
    fn copy_region_pads_out_of_bounds() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(Rect::from_min_max(pos2(0.0, 0.0), pos2(4.0, 4.0)), Color32::RED);
        let copy = canvas
            .copy_region(Rect::from_min_max(pos2(2.0, 2.0), pos2(6.0, 6.0)))
            .unwrap();
        assert_eq!(copy.pixel(0, 0).unwrap().alpha(), 255);
        assert_eq!(copy.pixel(3, 3).unwrap().alpha(), 0);
    }

    #[test]
    fn clear_circle_punches_hole() {
        let mut canvas = Canvas::new(20, 20);
        canvas.fill_rect(Rect::from_min_max(pos2(0.0, 0.0), pos2(20.0, 20.0)), Color32::WHITE);
        canvas.clear_circle(pos2(10.0, 10.0), 4.0);
        let pixmap = canvas.pixmap().unwrap();
        assert_eq!(pixmap.pixel(10, 10).unwrap().alpha(), 0);
        assert_eq!(pixmap.pixel(1, 1).unwrap().alpha(), 255);
    }
}
