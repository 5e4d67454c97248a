//! Drawing surfaces: a raster canvas paired with a vector record.
//!
//! Every drawing call paints pixels and appends the equivalent vector
//! operation, so whatever is on screen can also be exported as SVG. Calls on
//! [`Surface::canvas_mut`] are raster-only and used for transient previews.

pub mod canvas;
pub mod export;
pub mod fragment;
pub mod svg_render;
pub mod vector;

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};
use tiny_skia::{Pixmap, Transform};

pub use canvas::Canvas;
pub use export::svg_document;
pub use fragment::{Fragment, FragmentQueue};
pub use svg_render::SvgRenderer;
pub use vector::{Erase, StrokeStyle, VectorOp, VectorRecord};

use crate::color::Paint;
use crate::error::FragmentError;

/// The fixed set of logical layers, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    Background,
    Main,
    Pen,
    Typeset,
    Shape,
    Selection,
    Preview,
}

impl LayerId {
    pub const ALL: [LayerId; 7] = [
        LayerId::Background,
        LayerId::Main,
        LayerId::Pen,
        LayerId::Typeset,
        LayerId::Shape,
        LayerId::Selection,
        LayerId::Preview,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerId::Background => "background",
            LayerId::Main => "main",
            LayerId::Pen => "pen",
            LayerId::Typeset => "typeset",
            LayerId::Shape => "shape",
            LayerId::Selection => "selection",
            LayerId::Preview => "preview",
        }
    }

    /// Layers sized to the viewport, as opposed to floating overlays.
    pub fn is_viewport(self) -> bool {
        matches!(self, LayerId::Background | LayerId::Main | LayerId::Pen)
    }
}

/// Raster and vector content of a surface at one point in time.
#[derive(Clone)]
pub struct SurfaceState {
    pixels: Option<Pixmap>,
    vector: VectorRecord,
}

impl SurfaceState {
    pub fn pixels(&self) -> Option<&Pixmap> {
        self.pixels.as_ref()
    }

    pub fn vector(&self) -> &VectorRecord {
        &self.vector
    }
}

impl std::fmt::Debug for SurfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceState")
            .field(
                "size",
                &self.pixels.as_ref().map(|p| (p.width(), p.height())),
            )
            .field("ops", &self.vector.op_count())
            .finish()
    }
}

pub struct Surface {
    layer: LayerId,
    canvas: Canvas,
    record: VectorRecord,
    /// Raster rendering of committed fragments, drawn above the canvas.
    overlay: Option<Pixmap>,
    position: Pos2,
    rotation: f32,
    visible: bool,
    revision: u64,
    renderer: Arc<SvgRenderer>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("layer", &self.layer)
            .field("size", &(self.width(), self.height()))
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("visible", &self.visible)
            .field("ops", &self.record.op_count())
            .finish()
    }
}

impl Surface {
    pub fn new(layer: LayerId, width: u32, height: u32, renderer: Arc<SvgRenderer>) -> Self {
        Self {
            layer,
            canvas: Canvas::new(width, height),
            record: VectorRecord::default(),
            overlay: None,
            position: Pos2::ZERO,
            rotation: 0.0,
            visible: true,
            revision: 0,
            renderer,
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn size(&self) -> Vec2 {
        vec2(self.width() as f32, self.height() as f32)
    }

    pub fn position(&self) -> Pos2 {
        self.position
    }

    /// Screen rectangle covered by the (unrotated) surface.
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.position, self.size())
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Bumped on every change; used to decide when to re-upload textures.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Raster-only access. Nothing drawn through this reaches the vector
    /// record.
    pub fn canvas_mut(&mut self) -> &mut Canvas {
        self.touch();
        &mut self.canvas
    }

    pub fn record(&self) -> &VectorRecord {
        &self.record
    }

    pub fn overlay(&self) -> Option<&Pixmap> {
        self.overlay.as_ref()
    }

    pub fn renderer(&self) -> &Arc<SvgRenderer> {
        &self.renderer
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Resizes the surface, discarding its content.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.canvas.resize(width, height);
        self.record.clear_ops();
        self.refresh_overlay();
        self.touch();
    }

    pub fn move_to(&mut self, position: Pos2) {
        if self.position != position {
            self.position = position;
            self.touch();
        }
    }

    pub fn set_rotation(&mut self, angle: f32) {
        self.rotation = angle;
        self.touch();
    }

    pub fn show(&mut self) {
        self.visible = true;
        self.touch();
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.touch();
    }

    pub fn is_blank(&self) -> bool {
        self.canvas.is_blank() && !self.record.has_fragments()
    }

    /// Clears pixels, operations and committed fragments.
    pub fn clear(&mut self) {
        self.canvas.clear();
        self.record.clear();
        self.overlay = None;
        self.touch();
    }

    pub fn clear_rect(&mut self, rect: Rect) {
        self.canvas.clear_rect(rect);
        self.record.push(VectorOp::Erase(Erase::Rect(rect)));
        self.touch();
    }

    pub fn clear_circle(&mut self, center: Pos2, radius: f32) {
        self.canvas.clear_circle(center, radius);
        self.record.push(VectorOp::Erase(Erase::Circle { center, radius }));
        self.touch();
    }

    pub fn draw_rect(&mut self, rect: Rect, fill: Paint, stroke: Option<StrokeStyle>) {
        if let Some(color) = fill.color() {
            self.canvas.fill_rect(rect, color);
        }
        if let Some(style) = &stroke {
            self.canvas.stroke_rect(rect, style);
        }
        self.record.push(VectorOp::Rect { rect, fill, stroke });
        self.touch();
    }

    pub fn draw_path(
        &mut self,
        subpaths: Vec<Vec<Pos2>>,
        closed: bool,
        fill: Paint,
        stroke: Option<StrokeStyle>,
    ) {
        if subpaths.iter().all(Vec::is_empty) {
            return;
        }
        if let Some(color) = fill.color() {
            self.canvas.fill_path(&subpaths, color);
        }
        if let Some(style) = &stroke {
            self.canvas.stroke_path(&subpaths, closed, style);
        }
        self.record.push(VectorOp::Path {
            subpaths,
            closed,
            fill,
            stroke,
        });
        self.touch();
    }

    pub fn draw_circle(&mut self, center: Pos2, radius: f32, fill: Paint, stroke: Option<StrokeStyle>) {
        if let Some(color) = fill.color() {
            self.canvas.fill_circle(center, radius, color);
        }
        if let Some(style) = &stroke {
            self.canvas.stroke_circle(center, radius, style);
        }
        self.record.push(VectorOp::Circle {
            center,
            radius,
            fill,
            stroke,
        });
        self.touch();
    }

    /// Renders loose SVG elements in surface coordinates and records them.
    pub fn draw_markup(&mut self, markup: String) -> Result<(), FragmentError> {
        let renderer = Arc::clone(&self.renderer);
        self.canvas.render_markup(&renderer, &markup)?;
        self.record.push(VectorOp::Markup(markup));
        self.touch();
        Ok(())
    }

    /// Composites pixels at `at` and records them as an embedded PNG.
    pub fn draw_pixmap(&mut self, src: &Pixmap, at: Pos2) {
        self.canvas.draw_pixmap(src, at);
        match encode_png(src) {
            Ok(png) => self.record.push(VectorOp::Raster {
                origin: pos2(at.x.round(), at.y.round()),
                width: src.width(),
                height: src.height(),
                png_base64: BASE64.encode(png),
            }),
            Err(err) => log::warn!("Raster patch left out of the vector record: {}", err),
        }
        self.touch();
    }

    /// Replaces the content with `src`, resizing to fit. Raster-only; used
    /// by overlays whose content is never exported directly.
    pub fn load_pixmap(&mut self, src: &Pixmap) {
        self.canvas.resize(src.width(), src.height());
        self.record.clear_ops();
        self.canvas.draw_pixmap(src, Pos2::ZERO);
        self.touch();
    }

    pub fn copy_region(&self, rect: Rect) -> Option<Pixmap> {
        self.canvas.copy_region(rect)
    }

    /// Redraws the content rotated by `angle` (radians, counter-clockwise on
    /// screen) into a square sized to the diagonal, keeping the center in
    /// place. Resets the display rotation.
    pub fn rotate_redraw(&mut self, angle: f32) {
        let Some(src) = self.canvas.pixmap().cloned() else {
            return;
        };
        let (w, h) = (src.width() as f32, src.height() as f32);
        let side = w.hypot(h).ceil();
        let center = self.rect().center();
        let transform = Transform::from_translate(side / 2.0, side / 2.0)
            .pre_rotate(-angle.to_degrees())
            .pre_translate(-w / 2.0, -h / 2.0);
        self.canvas.resize(side as u32, side as u32);
        self.record.clear_ops();
        self.canvas.draw_pixmap_transformed(&src, transform);
        self.position = center - vec2(side / 2.0, side / 2.0);
        self.rotation = 0.0;
        self.touch();
    }

    pub fn state(&self) -> SurfaceState {
        SurfaceState {
            pixels: self.canvas.pixmap().cloned(),
            vector: self.record.clone(),
        }
    }

    /// Replaces the visible content with `state`, keeping the current size.
    pub fn restore(&mut self, state: &SurfaceState) {
        self.canvas.clear();
        if let Some(pixels) = &state.pixels {
            self.canvas.draw_pixmap(pixels, Pos2::ZERO);
        }
        self.record = state.vector.clone();
        self.refresh_overlay();
        self.touch();
    }

    /// Adds a fragment to the persistent vector overlay. Fails without
    /// touching the surface if the fragment does not render.
    pub fn commit_fragment(&mut self, fragment: Fragment) -> Result<(), FragmentError> {
        let mut probe = self
            .overlay
            .clone()
            .or_else(|| Pixmap::new(self.width().max(1), self.height().max(1)))
            .ok_or(FragmentError::InvalidTarget {
                width: self.width(),
                height: self.height(),
            })?;
        self.renderer
            .render_markup(&mut probe, &fragment.markup(), Transform::identity())?;
        self.overlay = Some(probe);
        self.record.commit_fragment(fragment);
        self.touch();
        Ok(())
    }

    pub fn clear_fragments(&mut self) {
        if self.record.has_fragments() {
            self.record.clear_fragments();
            self.overlay = None;
            self.touch();
        }
    }

    fn refresh_overlay(&mut self) {
        self.overlay = None;
        if !self.record.has_fragments() {
            return;
        }
        let Some(mut pixmap) = Pixmap::new(self.width().max(1), self.height().max(1)) else {
            return;
        };
        for fragment in self.record.fragments() {
            if let Err(err) =
                self.renderer
                    .render_markup(&mut pixmap, &fragment.markup(), Transform::identity())
            {
                log::warn!("Fragment {} failed to re-render: {}", fragment.id(), err);
            }
        }
        self.overlay = Some(pixmap);
    }

    /// Canvas plus fragment overlay, flattened.
    pub fn flattened(&self) -> Option<Pixmap> {
        let mut out = self.canvas.pixmap()?.clone();
        if let Some(overlay) = &self.overlay {
            out.draw_pixmap(
                0,
                0,
                overlay.as_ref(),
                &tiny_skia::PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Some(out)
    }
}

/// The surfaces that exist for the lifetime of the board.
#[derive(Debug)]
pub struct Layers {
    pub background: Surface,
    pub main: Surface,
    pub pen: Surface,
    pub typeset: Surface,
    pub shape: Surface,
    pub selection: Surface,
    pub preview: Surface,
}

impl Layers {
    pub fn new(width: u32, height: u32, renderer: Arc<SvgRenderer>) -> Self {
        let overlay = |layer| {
            let mut surface = Surface::new(layer, 0, 0, Arc::clone(&renderer));
            surface.hide();
            surface
        };
        Self {
            background: Surface::new(LayerId::Background, width, height, Arc::clone(&renderer)),
            main: Surface::new(LayerId::Main, width, height, Arc::clone(&renderer)),
            pen: Surface::new(LayerId::Pen, width, height, Arc::clone(&renderer)),
            typeset: overlay(LayerId::Typeset),
            shape: overlay(LayerId::Shape),
            selection: overlay(LayerId::Selection),
            preview: Surface::new(LayerId::Preview, 0, 0, Arc::clone(&renderer)),
        }
    }

    pub fn get(&self, id: LayerId) -> &Surface {
        match id {
            LayerId::Background => &self.background,
            LayerId::Main => &self.main,
            LayerId::Pen => &self.pen,
            LayerId::Typeset => &self.typeset,
            LayerId::Shape => &self.shape,
            LayerId::Selection => &self.selection,
            LayerId::Preview => &self.preview,
        }
    }

    pub fn get_mut(&mut self, id: LayerId) -> &mut Surface {
        match id {
            LayerId::Background => &mut self.background,
            LayerId::Main => &mut self.main,
            LayerId::Pen => &mut self.pen,
            LayerId::Typeset => &mut self.typeset,
            LayerId::Shape => &mut self.shape,
            LayerId::Selection => &mut self.selection,
            LayerId::Preview => &mut self.preview,
        }
    }

    /// Bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &Surface> {
        LayerId::ALL.into_iter().map(|id| self.get(id))
    }

    pub fn viewport_size(&self) -> Vec2 {
        self.main.size()
    }

    /// Resizes the viewport layers. Background and main are cleared; the
    /// pen layer's content must be restored by its owner.
    pub fn resize_viewport(&mut self, width: u32, height: u32) {
        self.background.resize(width, height);
        self.main.resize(width, height);
        self.pen.resize(width, height);
    }

    /// Flattens the visible viewport layers under `rect`.
    pub fn composite_region(&self, rect: Rect) -> Option<Pixmap> {
        let mut out = Pixmap::new(rect.width().round() as u32, rect.height().round() as u32)?;
        for surface in [&self.background, &self.main, &self.pen] {
            if !surface.is_visible() {
                continue;
            }
            if let Some(flat) = surface.flattened() {
                out.draw_pixmap(
                    (surface.position().x - rect.min.x).round() as i32,
                    (surface.position().y - rect.min.y).round() as i32,
                    flat.as_ref(),
                    &tiny_skia::PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
        }
        Some(out)
    }
}

/// Converts premultiplied pixels to a straight-alpha image.
pub fn to_rgba_image(pixmap: &Pixmap) -> image::RgbaImage {
    let mut img = image::RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    img
}

pub fn from_rgba_image(img: &image::RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(to_rgba_image(pixmap))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Reads one pixel as straight-alpha color; transparent outside the canvas.
pub fn pixel_at(surface: &Surface, x: u32, y: u32) -> Color32 {
    surface
        .canvas()
        .pixmap()
        .and_then(|p| p.pixel(x, y))
        .map(|px| {
            let c = px.demultiply();
            Color32::from_rgba_unmultiplied(c.red(), c.green(), c.blue(), c.alpha())
        })
        .unwrap_or(Color32::TRANSPARENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(w: u32, h: u32) -> Surface {
        Surface::new(LayerId::Main, w, h, Arc::new(SvgRenderer::default()))
    }

    #[test]
    fn drawing_records_vector_ops() {
        let mut s = surface(20, 20);
        s.draw_rect(
            Rect::from_min_size(pos2(2.0, 2.0), vec2(4.0, 4.0)),
            Paint::solid(Color32::RED),
            None,
        );
        s.canvas_mut().fill_circle(pos2(10.0, 10.0), 3.0, Color32::BLUE);
        assert_eq!(s.record().op_count(), 1, "raster-only draws are not recorded");
        assert_eq!(pixel_at(&s, 3, 3), Color32::RED);
    }

    #[test]
    fn restore_brings_back_pixels_and_record() {
        let mut s = surface(10, 10);
        let blank = s.state();
        s.draw_circle(pos2(5.0, 5.0), 3.0, Paint::solid(Color32::WHITE), None);
        assert!(!s.is_blank());
        s.restore(&blank);
        assert!(s.is_blank());
        assert_eq!(s.record().op_count(), 0);
    }

    #[test]
    fn rotate_redraw_keeps_center() {
        let mut s = Surface::new(LayerId::Selection, 30, 40, Arc::new(SvgRenderer::default()));
        s.move_to(pos2(100.0, 100.0));
        s.canvas_mut()
            .fill_rect(Rect::from_min_size(Pos2::ZERO, vec2(30.0, 40.0)), Color32::RED);
        let center = s.rect().center();
        s.rotate_redraw(std::f32::consts::FRAC_PI_2);
        assert_eq!((s.width(), s.height()), (50, 50));
        assert!((s.rect().center() - center).length() < 0.5);
        assert_eq!(s.rotation(), 0.0);
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let mut s = surface(3, 2);
        s.canvas_mut()
            .fill_rect(Rect::from_min_size(Pos2::ZERO, vec2(3.0, 2.0)), Color32::from_rgb(10, 200, 30));
        let png = encode_png(s.canvas().pixmap().unwrap()).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(1, 1).0, [10, 200, 30, 255]);
    }

    #[test]
    fn composite_region_stacks_viewport_layers() {
        let renderer = Arc::new(SvgRenderer::default());
        let mut layers = Layers::new(10, 10, renderer);
        layers.main.canvas_mut().fill_rect(
            Rect::from_min_size(Pos2::ZERO, vec2(10.0, 10.0)),
            Color32::RED,
        );
        layers.pen.canvas_mut().fill_rect(
            Rect::from_min_size(pos2(5.0, 5.0), vec2(5.0, 5.0)),
            Color32::BLUE,
        );
        let region = layers
            .composite_region(Rect::from_min_size(pos2(4.0, 4.0), vec2(4.0, 4.0)))
            .unwrap();
        let at = |x, y| region.pixel(x, y).unwrap().demultiply();
        assert_eq!(at(0, 0).red(), 255);
        assert_eq!(at(2, 2).blue(), 255);
    }
}
