//! The closed set of primitives the controller can draw, as they arrive on
//! the wire, and how each one lands on a [`Surface`].

use std::f32::consts::TAU;
use std::fmt::Write as _;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use egui::{Color32, Pos2, Rect, pos2, vec2};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::color::{Paint, to_css};
use crate::error::DrawError;
use crate::protocol::expand_home;
use crate::surface::vector::{num, xml_escape};
use crate::surface::{StrokeStyle, Surface, from_rgba_image};
use crate::typeset::TypesetRequest;

static ITALICS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_(.*?)_").expect("valid regex"));
static TEX_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\text\{(.*?)\}").expect("valid regex"));

/// Table cell metrics, in pixels.
const CELL_FONT_SIZE: f32 = 16.0;
const CELL_CHAR_WIDTH: f32 = 9.0;
const CELL_PADDING: f32 = 10.0;
const ROW_HEIGHT: f32 = 26.0;

fn white() -> Paint {
    Paint::solid(Color32::WHITE)
}

fn one() -> f32 {
    1.0
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Primitive {
    Rect(RectArgs),
    Curve(CurveArgs),
    Arc(ArcArgs),
    Image(ImageArgs),
    Text(TextArgs),
    #[serde(alias = "typeset")]
    Latex(LatexArgs),
    Svg(SvgArgs),
    Table(TableArgs),
}

/// Rectangle centered on `point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectArgs {
    pub point: [f32; 2],
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub fill_color: Paint,
    #[serde(default)]
    pub border_color: Paint,
    #[serde(default = "one")]
    pub border_width: f32,
}

/// A coordinate of a curve point; the framer turns `Infinity` literals into
/// strings, which mark a break in the curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coord {
    Finite(f32),
    Break(BreakToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakToken {
    Infinity,
}

impl Coord {
    fn value(self) -> Option<f32> {
        match self {
            Coord::Finite(v) if v.is_finite() => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveArgs {
    pub points: Vec<[Coord; 2]>,
    #[serde(default = "white")]
    pub color: Paint,
    #[serde(default = "one")]
    pub width: f32,
    #[serde(default)]
    pub smooth: bool,
    #[serde(default)]
    pub fill_color: Paint,
    #[serde(default)]
    pub dashed: bool,
    #[serde(default)]
    pub arrow_head: Vec<[f32; 2]>,
}

impl CurveArgs {
    /// The points split into runs at every break.
    pub fn subpaths(&self) -> Vec<Vec<Pos2>> {
        let mut subpaths = Vec::new();
        let mut current = Vec::new();
        for [x, y] in &self.points {
            match (x.value(), y.value()) {
                (Some(x), Some(y)) => current.push(pos2(x, y)),
                _ => {
                    if !current.is_empty() {
                        subpaths.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            subpaths.push(current);
        }
        subpaths
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcArgs {
    pub point: [f32; 2],
    pub radius: f32,
    #[serde(rename = "theta_1")]
    pub theta_1: f32,
    #[serde(rename = "theta_2")]
    pub theta_2: f32,
    #[serde(default)]
    pub fill_color: Paint,
    #[serde(default)]
    pub border_color: Paint,
    #[serde(default)]
    pub border_width: f32,
    #[serde(default = "yes")]
    pub anticlockwise: bool,
}

impl ArcArgs {
    /// Polyline approximation in screen angles (y down), walking from
    /// `theta_1` to `theta_2` in the requested direction.
    pub fn points(&self) -> Vec<Pos2> {
        let [cx, cy] = self.point;
        let delta = if self.anticlockwise {
            self.theta_1 - self.theta_2
        } else {
            self.theta_2 - self.theta_1
        };
        let sweep = if delta >= TAU { TAU } else { delta.rem_euclid(TAU) };
        let direction = if self.anticlockwise { -1.0 } else { 1.0 };
        let radius = self.radius.abs();
        let segments = ((sweep * radius / 4.0).ceil() as usize).clamp(8, 512);
        (0..=segments)
            .map(|i| {
                let t = self.theta_1 + direction * sweep * i as f32 / segments as f32;
                pos2(cx + radius * t.cos(), cy + radius * t.sin())
            })
            .collect()
    }
}

/// Image with its top-left corner at `point`. A zero height means the
/// natural height; a zero width keeps the aspect ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageArgs {
    pub src: String,
    pub point: [f32; 2],
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    /// Delete the file once it has been read.
    #[serde(default)]
    pub is_temporary: bool,
}

/// Text centered on `(x, y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextArgs {
    pub text: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub font_spec: String,
    #[serde(default = "white")]
    pub color: Paint,
    #[serde(default)]
    pub stroked: bool,
    /// Render `_spans_` in italics.
    #[serde(default)]
    pub markdown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatexArgs {
    pub source: String,
    pub point: [f32; 2],
    #[serde(default, alias = "font_size")]
    pub font_size: Option<f32>,
    #[serde(default = "white")]
    pub color: Paint,
}

/// Path data filled after scaling by `(sx, sy)` and translating by
/// `point + (tx, ty)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvgArgs {
    pub data: String,
    pub point: [f32; 2],
    #[serde(default = "identity")]
    pub transform: [f32; 4],
    #[serde(default = "white")]
    pub fill_color: Paint,
}

fn identity() -> [f32; 4] {
    [1.0, 1.0, 0.0, 0.0]
}

/// Table centered on `point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableArgs {
    pub data: Vec<Vec<String>>,
    #[serde(default)]
    pub headers: Vec<String>,
    pub point: [f32; 2],
    #[serde(default = "white")]
    pub color: Paint,
}

/// What remains to be done after a primitive was drawn.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    Done,
    /// The primitive needs the typesetter; the block goes centered on
    /// `center` once rendered.
    Typeset {
        request: TypesetRequest,
        center: Pos2,
    },
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Rect(_) => "rect",
            Primitive::Curve(_) => "curve",
            Primitive::Arc(_) => "arc",
            Primitive::Image(_) => "image",
            Primitive::Text(_) => "text",
            Primitive::Latex(_) => "latex",
            Primitive::Svg(_) => "svg",
            Primitive::Table(_) => "table",
        }
    }

    pub fn draw(&self, surface: &mut Surface, default_font_size: f32) -> Result<DrawOutcome, DrawError> {
        match self {
            Primitive::Rect(args) => {
                let [x, y] = args.point;
                let rect = Rect::from_center_size(pos2(x, y), vec2(args.width, args.height));
                let stroke = args.border_color.color().map(|color| StrokeStyle {
                    color,
                    width: args.border_width,
                    dashed: false,
                });
                surface.draw_rect(rect, args.fill_color, stroke);
            }
            Primitive::Curve(args) => draw_curve(surface, args),
            Primitive::Arc(args) => {
                let stroke = args
                    .border_color
                    .color()
                    .filter(|_| args.border_width > 0.0)
                    .map(|color| StrokeStyle::solid(color, args.border_width));
                surface.draw_path(vec![args.points()], false, args.fill_color, stroke);
            }
            Primitive::Image(args) => draw_image(surface, args)?,
            Primitive::Text(args) => surface.draw_markup(text_markup(args))?,
            Primitive::Latex(args) => {
                let [x, y] = args.point;
                return Ok(DrawOutcome::Typeset {
                    request: TypesetRequest {
                        source: args.source.clone(),
                        font_size: args.font_size.unwrap_or(default_font_size),
                        color: args.color.color().unwrap_or(Color32::WHITE),
                    },
                    center: pos2(x, y),
                });
            }
            Primitive::Svg(args) => {
                let [x, y] = args.point;
                let [sx, sy, tx, ty] = args.transform;
                surface.draw_markup(format!(
                    "<path d=\"{}\" transform=\"matrix({} 0 0 {} {} {})\" fill=\"{}\"/>",
                    xml_escape(&args.data),
                    sx,
                    sy,
                    num(tx + x),
                    num(ty + y),
                    to_css(args.fill_color)
                ))?;
            }
            Primitive::Table(args) => surface.draw_markup(table_markup(args))?,
        }
        Ok(DrawOutcome::Done)
    }
}

fn draw_curve(surface: &mut Surface, args: &CurveArgs) {
    let color = args.color.color();
    let stroke = color.map(|color| StrokeStyle {
        color,
        width: args.width,
        dashed: args.dashed,
    });
    surface.draw_path(args.subpaths(), false, args.fill_color, stroke);

    if args.arrow_head.len() >= 3 {
        if let Some(color) = color {
            let head = args.arrow_head.iter().map(|&[x, y]| pos2(x, y)).collect();
            surface.draw_path(
                vec![head],
                true,
                Paint::solid(color),
                Some(StrokeStyle::solid(color, args.width)),
            );
        }
    }
}

fn draw_image(surface: &mut Surface, args: &ImageArgs) -> Result<(), DrawError> {
    let load_error = |source| DrawError::ImageLoad {
        src: args.src.clone(),
        source,
    };
    let decoded = match args.src.strip_prefix("data:") {
        Some(data_url) => {
            let payload = data_url.split_once(',').map(|(_, p)| p).unwrap_or_default();
            let bytes = BASE64.decode(payload).map_err(|err| {
                load_error(image::ImageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    err,
                )))
            })?;
            image::load_from_memory(&bytes).map_err(load_error)?
        }
        None => {
            let path = expand_home(&args.src);
            let decoded = image::open(&path).map_err(load_error)?;
            if args.is_temporary {
                if let Err(err) = std::fs::remove_file(&path) {
                    log::warn!("Could not remove temporary image {}: {}", path.display(), err);
                }
            }
            decoded
        }
    };
    log::debug!("Loaded image {}x{} from {}", decoded.width(), decoded.height(), args.src);

    let rgba = decoded.to_rgba8();
    let (natural_w, natural_h) = (rgba.width() as f32, rgba.height() as f32);
    let height = if args.height > 0.0 { args.height } else { natural_h };
    let width = if args.width > 0.0 {
        args.width
    } else {
        natural_w * height / natural_h.max(1.0)
    };
    let (w, h) = (width.round().max(1.0) as u32, height.round().max(1.0) as u32);
    let rgba = if (w, h) == (rgba.width(), rgba.height()) {
        rgba
    } else {
        image::imageops::resize(&rgba, w, h, image::imageops::FilterType::Triangle)
    };
    if let Some(pixmap) = from_rgba_image(&rgba) {
        let [x, y] = args.point;
        surface.draw_pixmap(&pixmap, pos2(x, y));
    }
    Ok(())
}

/// Font attributes read from a CSS font shorthand such as
/// `"italic 20px Helvetica"`.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub italic: bool,
    pub bold: bool,
    pub size: f32,
    pub family: String,
}

impl FontSpec {
    pub fn parse(spec: &str) -> Self {
        let mut font = FontSpec {
            italic: false,
            bold: false,
            size: 16.0,
            family: String::new(),
        };
        let mut family = Vec::new();
        for token in spec.split_whitespace() {
            match token {
                "italic" | "oblique" => font.italic = true,
                "bold" | "bolder" => font.bold = true,
                "normal" => {}
                _ if family.is_empty() && parse_font_size(token).is_some() => {
                    font.size = parse_font_size(token).unwrap_or(font.size);
                }
                _ => family.push(token.trim_matches(|c| c == '"' || c == '\'')),
            }
        }
        font.family = if family.is_empty() {
            "sans-serif".to_owned()
        } else {
            family.join(" ")
        };
        font
    }

    fn attributes(&self) -> String {
        let mut out = format!(
            "font-family=\"{}\" font-size=\"{}\"",
            xml_escape(&self.family),
            num(self.size)
        );
        if self.italic {
            out.push_str(" font-style=\"italic\"");
        }
        if self.bold {
            out.push_str(" font-weight=\"bold\"");
        }
        out
    }
}

fn parse_font_size(token: &str) -> Option<f32> {
    let (number, factor) = if let Some(n) = token.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = token.strip_suffix("pt") {
        (n, 96.0 / 72.0)
    } else {
        (token, 1.0)
    };
    number.parse::<f32>().ok().filter(|v| *v > 0.0).map(|v| v * factor)
}

fn paint_attributes(color: Paint, stroked: bool) -> String {
    if stroked {
        format!("fill=\"none\" stroke=\"{}\"", to_css(color))
    } else {
        format!("fill=\"{}\"", to_css(color))
    }
}

/// Splits `_italic_` spans out of `text`. Returns `(segment, italic)` pairs.
pub fn markdown_spans(text: &str) -> Vec<(String, bool)> {
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in ITALICS.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push((text[last..whole.start()].to_owned(), false));
        }
        if !inner.as_str().is_empty() {
            spans.push((inner.as_str().to_owned(), true));
        }
        last = whole.end();
    }
    if last < text.len() {
        spans.push((text[last..].to_owned(), false));
    }
    spans
}

fn text_markup(args: &TextArgs) -> String {
    let font = FontSpec::parse(&args.font_spec);
    let mut out = format!(
        "<text x=\"{}\" y=\"{}\" dy=\"0.35em\" text-anchor=\"middle\" {} {}>",
        num(args.x),
        num(args.y),
        font.attributes(),
        paint_attributes(args.color, args.stroked)
    );
    if args.markdown {
        for (segment, italic) in markdown_spans(&args.text) {
            if italic {
                let _ = write!(out, "<tspan font-style=\"italic\">{}</tspan>", xml_escape(&segment));
            } else {
                out.push_str(&xml_escape(&segment));
            }
        }
    } else {
        out.push_str(&xml_escape(&args.text));
    }
    out.push_str("</text>");
    out
}

/// Strips the TeX wrappers table cells arrive in.
fn clean_cell(cell: &str) -> String {
    TEX_TEXT.replace_all(cell, "$1").replace("\\$", "$")
}

fn table_markup(args: &TableArgs) -> String {
    let rows: Vec<Vec<String>> = std::iter::once(&args.headers)
        .filter(|h| !h.is_empty())
        .chain(args.data.iter())
        .map(|row| row.iter().map(|c| clean_cell(c)).collect())
        .collect();
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }
    let widths: Vec<f32> = (0..columns)
        .map(|c| {
            let chars = rows
                .iter()
                .filter_map(|row| row.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0);
            chars as f32 * CELL_CHAR_WIDTH + CELL_PADDING * 2.0
        })
        .collect();
    let total_w: f32 = widths.iter().sum();
    let total_h = rows.len() as f32 * ROW_HEIGHT;
    let [cx, cy] = args.point;
    let origin = pos2(cx - total_w / 2.0, cy - total_h / 2.0);
    let color = to_css(args.color);

    let mut out = format!(
        "<g font-family=\"sans-serif\" font-size=\"{}\" fill=\"{color}\">",
        num(CELL_FONT_SIZE)
    );
    let has_headers = !args.headers.is_empty();
    for (r, row) in rows.iter().enumerate() {
        let baseline = origin.y + r as f32 * ROW_HEIGHT + ROW_HEIGHT * 0.7;
        let mut left = origin.x;
        for (c, width) in widths.iter().enumerate() {
            if let Some(cell) = row.get(c) {
                let numeric = cell.trim().parse::<f64>().is_ok();
                let (x, anchor) = if numeric {
                    (left + width - CELL_PADDING, "end")
                } else {
                    (left + CELL_PADDING, "start")
                };
                let weight = if has_headers && r == 0 { " font-weight=\"bold\"" } else { "" };
                let _ = write!(
                    out,
                    "<text x=\"{}\" y=\"{}\" text-anchor=\"{anchor}\"{weight}>{}</text>",
                    num(x),
                    num(baseline),
                    xml_escape(cell)
                );
            }
            left += width;
        }
    }
    if has_headers {
        let y = origin.y + ROW_HEIGHT;
        let _ = write!(
            out,
            "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{color}\" stroke-width=\"1\"/>",
            num(origin.x),
            num(y),
            num(origin.x + total_w),
            num(y)
        );
    }
    out.push_str("</g>");
    out
}
