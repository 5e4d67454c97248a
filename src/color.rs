//! CSS color strings as sent by the controller and stored in palettes.

use egui::Color32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A color that may be fully transparent ("no paint").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Paint(pub Option<Color32>);

impl Paint {
    pub const NONE: Paint = Paint(None);

    pub fn solid(color: Color32) -> Self {
        Self(Some(color))
    }

    pub fn color(self) -> Option<Color32> {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0.is_none()
    }
}

impl From<Color32> for Paint {
    fn from(color: Color32) -> Self {
        Self(Some(color))
    }
}

impl Serialize for Paint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_css(*self))
    }
}

impl<'de> Deserialize<'de> for Paint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_css(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color `{text}`")))
    }
}

/// Parses the subset of CSS colors the controller emits: hex forms,
/// `rgb()`/`rgba()`, `transparent`/`none` and a handful of names.
pub fn parse_css(text: &str) -> Option<Paint> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("transparent") || text.eq_ignore_ascii_case("none") {
        return Some(Paint::NONE);
    }
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex).map(Paint::solid);
    }
    let lower = text.to_ascii_lowercase();
    if let Some(body) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_function(body).map(Paint::solid);
    }
    named(&lower).map(Paint::solid)
}

/// Parses a color, falling back to `fallback` on anything unreadable.
pub fn parse_or(text: &str, fallback: Color32) -> Color32 {
    match parse_css(text) {
        Some(Paint(Some(color))) => color,
        Some(Paint(None)) => Color32::TRANSPARENT,
        None => {
            log::warn!("Unreadable color `{}`, using fallback", text);
            fallback
        }
    }
}

fn parse_hex(hex: &str) -> Option<Color32> {
    let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
    let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some(Color32::from_rgb(
            digit(0)? * 17,
            digit(1)? * 17,
            digit(2)? * 17,
        )),
        4 => Some(Color32::from_rgba_unmultiplied(
            digit(0)? * 17,
            digit(1)? * 17,
            digit(2)? * 17,
            digit(3)? * 17,
        )),
        6 => Some(Color32::from_rgb(pair(0)?, pair(2)?, pair(4)?)),
        8 => Some(Color32::from_rgba_unmultiplied(
            pair(0)?,
            pair(2)?,
            pair(4)?,
            pair(6)?,
        )),
        _ => None,
    }
}

fn parse_rgb_function(body: &str) -> Option<Color32> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() < 3 || parts.len() > 4 {
        return None;
    }
    let channel = |s: &str| s.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
    let alpha = match parts.get(3) {
        Some(a) => (a.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
        None => 255,
    };
    Some(Color32::from_rgba_unmultiplied(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha,
    ))
}

fn named(name: &str) -> Option<Color32> {
    let color = match name {
        "black" => Color32::BLACK,
        "white" => Color32::WHITE,
        "red" => Color32::from_rgb(255, 0, 0),
        "green" => Color32::from_rgb(0, 128, 0),
        "blue" => Color32::from_rgb(0, 0, 255),
        "yellow" => Color32::from_rgb(255, 255, 0),
        "orange" => Color32::from_rgb(255, 165, 0),
        "gray" | "grey" => Color32::from_rgb(128, 128, 128),
        _ => return None,
    };
    Some(color)
}

/// Formats a paint as `#rrggbb`, `#rrggbbaa` or `none`.
pub fn to_css(paint: Paint) -> String {
    match paint.0 {
        None => "none".to_owned(),
        Some(color) => {
            let [r, g, b, a] = color.to_srgba_unmultiplied();
            if a == 255 {
                format!("#{r:02x}{g:02x}{b:02x}")
            } else {
                format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
            }
        }
    }
}

pub fn to_tiny_skia(color: Color32) -> tiny_skia::Color {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    tiny_skia::Color::from_rgba8(r, g, b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_css("#fff"), Some(Paint::solid(Color32::WHITE)));
        assert_eq!(
            parse_css("#6CA17A"),
            Some(Paint::solid(Color32::from_rgb(0x6c, 0xa1, 0x7a)))
        );
        assert_eq!(parse_css("#12345"), None);
    }

    #[test]
    fn parses_functions_and_names() {
        assert_eq!(
            parse_css("rgba(255, 0, 0, 0.5)"),
            Some(Paint::solid(Color32::from_rgba_unmultiplied(255, 0, 0, 128)))
        );
        assert_eq!(parse_css("transparent"), Some(Paint::NONE));
        assert_eq!(parse_css("black"), Some(Paint::solid(Color32::BLACK)));
    }

    #[test]
    fn formats_back_to_hex() {
        assert_eq!(to_css(Paint::solid(Color32::from_rgb(0xcc, 0x66, 0x66))), "#cc6666");
        assert_eq!(to_css(Paint::NONE), "none");
    }
}
