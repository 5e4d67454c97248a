//! Standalone SVG fragments: typeset blocks and other markup that cannot be
//! expressed as canvas operations, positioned in absolute coordinates.

use std::collections::HashSet;
use std::sync::LazyLock;

use egui::Pos2;
use regex::Regex;
use uuid::Uuid;

use super::vector::num;

static DEFS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<defs\b[^>]*>(.*?)</defs>|<defs\b[^>]*/>").expect("valid regex"));
static PROLOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>|<!--.*?-->").expect("valid regex"));
static SVG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b[^>]*?(/?)>|</svg\s*>").expect("valid regex"));
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// A normalized fragment: definitions split out, nested documents replaced
/// by groups carrying their coordinate correction.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    id: Uuid,
    defs: Vec<String>,
    body: String,
}

impl Fragment {
    /// Normalizes a raw, already positioned fragment.
    pub fn normalize(raw: &str) -> Option<Fragment> {
        let cleaned = PROLOG.replace_all(raw, "");
        let mut defs = Vec::new();
        let without_defs = DEFS.replace_all(&cleaned, |caps: &regex::Captures<'_>| {
            if let Some(inner) = caps.get(1) {
                let inner = inner.as_str().trim();
                if !inner.is_empty() {
                    defs.push(inner.to_owned());
                }
            }
            String::new()
        });
        let body = unwrap_documents(without_defs.trim());
        if body.trim().is_empty() {
            return None;
        }
        Some(Fragment {
            id: Uuid::new_v4(),
            defs,
            body,
        })
    }

    /// Places a full SVG document (e.g. a typeset block at its natural
    /// size) with its top-left corner at `at`.
    pub fn place(svg: &str, at: Pos2) -> Option<Fragment> {
        let positioned = format!(
            "<g transform=\"translate({} {})\">{svg}</g>",
            num(at.x),
            num(at.y)
        );
        Fragment::normalize(&positioned)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn defs(&self) -> &[String] {
        &self.defs
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Definitions followed by the body, renderable on its own.
    pub fn markup(&self) -> String {
        let mut out = String::new();
        if !self.defs.is_empty() {
            out.push_str("<defs>");
            for d in &self.defs {
                out.push_str(d);
            }
            out.push_str("</defs>");
        }
        out.push_str(&self.body);
        out
    }
}

/// Raw fragments produced by controller typeset draws, merged into the next
/// export and then discarded.
#[derive(Debug, Default)]
pub struct FragmentQueue {
    raw: Vec<String>,
}

impl FragmentQueue {
    pub fn push(&mut self, raw: String) {
        self.raw.push(raw);
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
    }

    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.raw)
    }
}

/// Keeps the first occurrence of every distinct string.
pub fn dedup_preserving_order<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Replaces every `<svg>` element in `markup` (outermost first) with a
/// `<g>` whose transform maps its viewBox into the parent's coordinates.
fn unwrap_documents(markup: &str) -> String {
    let mut text = markup.to_owned();
    // each pass removes one svg element, so this terminates
    while let Some(unwrapped) = unwrap_first_document(&text) {
        text = unwrapped;
    }
    text
}

fn unwrap_first_document(text: &str) -> Option<String> {
    let mut tags = SVG_TAG.captures_iter(text);
    let open = tags.find(|c| c.get(0).is_some_and(|m| m.as_str().starts_with("<svg")))?;
    let open_match = open.get(0)?;
    let self_closing = open.get(1).is_some_and(|m| !m.as_str().is_empty());
    if self_closing {
        return Some(format!(
            "{}{}",
            &text[..open_match.start()],
            &text[open_match.end()..]
        ));
    }

    let mut depth = 1;
    let mut close = None;
    for caps in tags {
        let Some(m) = caps.get(0) else { continue };
        if m.as_str().starts_with("</") {
            depth -= 1;
            if depth == 0 {
                close = Some(m);
                break;
            }
        } else if caps.get(1).is_none_or(|s| s.as_str().is_empty()) {
            depth += 1;
        }
    }
    let inner_end = close.map_or(text.len(), |m| m.start());
    let after = close.map_or(text.len(), |m| m.end());
    let inner = &text[open_match.end()..inner_end];
    let transform = document_transform(open_match.as_str());
    let group = if transform.is_empty() {
        format!("<g>{inner}</g>")
    } else {
        format!("<g transform=\"{transform}\">{inner}</g>")
    };
    Some(format!(
        "{}{}{}",
        &text[..open_match.start()],
        group,
        &text[after..]
    ))
}

/// Transform equivalent to an svg element's x/y, width/height and viewBox.
fn document_transform(open_tag: &str) -> String {
    let mut x = 0.0;
    let mut y = 0.0;
    let mut width = None;
    let mut height = None;
    let mut view_box = None;
    for caps in ATTR.captures_iter(open_tag) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        match name {
            "x" => x = parse_length(value).unwrap_or(0.0),
            "y" => y = parse_length(value).unwrap_or(0.0),
            "width" => width = parse_length(value),
            "height" => height = parse_length(value),
            "viewBox" => view_box = parse_view_box(value),
            _ => {}
        }
    }

    let mut parts = Vec::new();
    if x != 0.0 || y != 0.0 {
        parts.push(format!("translate({} {})", num(x), num(y)));
    }
    if let Some([min_x, min_y, vb_w, vb_h]) = view_box {
        let sx = width.map_or(1.0, |w| if vb_w > 0.0 { w / vb_w } else { 1.0 });
        let sy = height.map_or(sx, |h| if vb_h > 0.0 { h / vb_h } else { 1.0 });
        if (sx - 1.0).abs() > f32::EPSILON || (sy - 1.0).abs() > f32::EPSILON {
            parts.push(format!("scale({} {})", scale_num(sx), scale_num(sy)));
        }
        if min_x != 0.0 || min_y != 0.0 {
            parts.push(format!("translate({} {})", num(-min_x), num(-min_y)));
        }
    }
    parts.join(" ")
}

fn scale_num(value: f32) -> String {
    let rounded = (value * 10000.0).round() / 10000.0;
    format!("{rounded}")
}

/// Parses an SVG length, converting the common absolute and font-relative
/// units to pixels.
pub fn parse_length(value: &str) -> Option<f32> {
    const UNITS: [(&str, f32); 7] = [
        ("px", 1.0),
        ("pt", 4.0 / 3.0),
        ("em", 16.0),
        ("ex", 8.0),
        ("in", 96.0),
        ("cm", 96.0 / 2.54),
        ("mm", 96.0 / 25.4),
    ];
    let value = value.trim();
    let (number, factor) = UNITS
        .iter()
        .find_map(|(unit, factor)| value.strip_suffix(unit).map(|n| (n, *factor)))
        .unwrap_or((value, 1.0));
    let n: f32 = number.trim().parse().ok()?;
    n.is_finite().then_some(n * factor)
}

fn parse_view_box(value: &str) -> Option<[f32; 4]> {
    let nums: Vec<f32> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match nums.as_slice() {
        [a, b, c, d] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    #[test]
    fn splits_defs_and_unwraps_root() {
        let raw = r##"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" viewBox="-5 -10 20 20"><defs><path id="g1" d="M0 0"/></defs><use href="#g1"/></svg>"##;
        let fragment = Fragment::normalize(raw).unwrap();
        assert_eq!(fragment.defs(), ["<path id=\"g1\" d=\"M0 0\"/>".to_owned()]);
        assert_eq!(fragment.body(), "<g transform=\"translate(5 10)\"><use href=\"#g1\"/></g>");
    }

    #[test]
    fn nested_document_keeps_outer_translate() {
        let raw = r#"<g transform="translate(100,50)"><svg width="40" height="20" viewBox="0 -10 20 10"><path d="M0 0"/></svg></g>"#;
        let fragment = Fragment::normalize(raw).unwrap();
        assert_eq!(
            fragment.body(),
            "<g transform=\"translate(100,50)\"><g transform=\"scale(2 2) translate(0 10)\"><path d=\"M0 0\"/></g></g>"
        );
    }

    #[test]
    fn sibling_documents_are_both_unwrapped() {
        let raw = "<g><svg><a/></svg><svg viewBox=\"1 1 2 2\"><b/></svg></g>";
        let fragment = Fragment::normalize(raw).unwrap();
        assert!(!fragment.body().contains("<svg"));
        assert!(fragment.body().contains("<g><a/></g>"));
        assert!(fragment.body().contains("translate(-1 -1)"));
    }

    #[test]
    fn empty_fragments_are_rejected() {
        assert!(Fragment::normalize("<defs><x/></defs>   ").is_none());
    }

    #[test]
    fn parses_units() {
        assert_eq!(parse_length("12"), Some(12.0));
        assert!((parse_length("3pt").unwrap() - 4.0).abs() < 1e-4);
        assert_eq!(parse_length("2ex"), Some(16.0));
        assert_eq!(parse_length("1.5e1px"), Some(15.0));
        assert_eq!(parse_length("auto"), None);
    }

    #[test]
    fn dedup_keeps_first() {
        let items = vec!["a".to_owned(), "b".to_owned(), "a".to_owned()];
        assert_eq!(dedup_preserving_order(items), vec!["a", "b"]);
    }
}
