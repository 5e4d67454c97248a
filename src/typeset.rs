//! Typesetting service boundary.
//!
//! The board never lays out math itself: it hands source text to a
//! [`Typesetter`] and gets back an SVG block with its intrinsic size. Renders
//! may finish later, so the result arrives through a [`PendingTypeset`] that
//! the caller polls once per frame.

use egui::Color32;
use futures::channel::oneshot;

use crate::color::{Paint, to_css};
use crate::error::TypesetError;
use crate::surface::vector::{num, xml_escape};

/// Points to pixels.
const PT_TO_PX: f32 = 96.0 / 72.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TypesetRequest {
    pub source: String,
    /// In points.
    pub font_size: f32,
    pub color: Color32,
}

/// A rendered block: a complete `<svg>` document and its size in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TypesetBlock {
    pub svg: String,
    pub width: f32,
    pub height: f32,
}

pub trait Typesetter: Send + Sync {
    fn render(&self, request: TypesetRequest) -> PendingTypeset;
}

/// A render that may not have finished yet. Dropping it abandons the
/// result.
#[derive(Debug)]
pub struct PendingTypeset {
    receiver: oneshot::Receiver<Result<TypesetBlock, TypesetError>>,
    done: bool,
}

impl PendingTypeset {
    /// A pending render and the sender that completes it.
    pub fn channel() -> (oneshot::Sender<Result<TypesetBlock, TypesetError>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                receiver,
                done: false,
            },
        )
    }

    /// An already finished render.
    pub fn ready(result: Result<TypesetBlock, TypesetError>) -> Self {
        let (sender, pending) = Self::channel();
        // The receiver is alive right here, so this cannot fail.
        let _ = sender.send(result);
        pending
    }

    /// Returns the result once, as soon as it is available. A sender dropped
    /// without answering resolves to [`TypesetError::Canceled`].
    pub fn poll(&mut self) -> Option<Result<TypesetBlock, TypesetError>> {
        if self.done {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(None) => return None,
            Ok(Some(result)) => result,
            Err(oneshot::Canceled) => Err(TypesetError::Canceled),
        };
        self.done = true;
        Some(result)
    }
}

/// Plain-text fallback used when no math renderer is configured: the source
/// is set in a single `<text>` element.
#[derive(Debug, Default, Clone)]
pub struct TextTypesetter;

impl TextTypesetter {
    pub fn typeset(&self, request: &TypesetRequest) -> Result<TypesetBlock, TypesetError> {
        if request.source.trim().is_empty() {
            return Err(TypesetError::Failed("empty source".to_owned()));
        }
        let px = request.font_size * PT_TO_PX;
        let width = (request.source.chars().count() as f32 * px * 0.6).ceil().max(1.0);
        let height = (px * 1.4).ceil().max(1.0);
        let svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\
             <text x=\"0\" y=\"{baseline}\" font-family=\"serif\" font-style=\"italic\" font-size=\"{px}\" fill=\"{fill}\">{text}</text></svg>",
            w = num(width),
            h = num(height),
            baseline = num(px * 1.05),
            px = num(px),
            fill = to_css(Paint::solid(request.color)),
            text = xml_escape(&request.source),
        );
        Ok(TypesetBlock { svg, width, height })
    }
}

impl Typesetter for TextTypesetter {
    fn render(&self, request: TypesetRequest) -> PendingTypeset {
        PendingTypeset::ready(self.typeset(&request))
    }
}

/// Parses the typeset prompt: `source[;fontSize]`, with an optional `\( \)`
/// wrapper around the source. Returns `None` when there is nothing to set.
pub fn parse_prompt(input: &str, default_font_size: f32) -> Option<(String, f32)> {
    let (source, size) = match input.split_once(';') {
        Some((source, size)) => (
            source,
            size.trim()
                .parse::<f32>()
                .ok()
                .filter(|s| *s > 0.0)
                .unwrap_or(default_font_size),
        ),
        None => (input, default_font_size),
    };
    let source = source.trim();
    let source = source
        .strip_prefix("\\(")
        .and_then(|s| s.strip_suffix("\\)"))
        .unwrap_or(source)
        .trim();
    if source.is_empty() {
        None
    } else {
        Some((source.to_owned(), size))
    }
}
