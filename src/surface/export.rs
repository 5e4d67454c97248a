use super::fragment::{Fragment, dedup_preserving_order};
use super::svg_render::{SvgRenderer, wrap_document};
use super::vector::num;
use super::Surface;

/// Builds one SVG document from the vector records of `surfaces` (bottom to
/// top), their committed fragments and the `queued` raw fragments.
///
/// Fragments are deduplicated and all definitions end up in a single
/// `<defs>` block. A queued fragment that does not parse is left out.
pub fn svg_document(
    width: f32,
    height: f32,
    surfaces: &[&Surface],
    queued: Vec<String>,
    renderer: &SvgRenderer,
) -> String {
    let mut defs = Vec::new();
    let mut layers = String::new();
    let mut fragments = Vec::new();

    for surface in surfaces {
        let name = surface.layer().name();
        let body = surface
            .record()
            .to_svg(surface.width() as f32, surface.height() as f32, name, &mut defs);
        if !body.is_empty() {
            let offset = surface.position();
            if offset.x != 0.0 || offset.y != 0.0 {
                layers.push_str(&format!(
                    "<g id=\"layer-{name}\" transform=\"translate({} {})\">{body}</g>",
                    num(offset.x),
                    num(offset.y)
                ));
            } else {
                layers.push_str(&format!("<g id=\"layer-{name}\">{body}</g>"));
            }
        }
        for fragment in surface.record().fragments() {
            defs.extend(fragment.defs().iter().cloned());
            fragments.push(fragment.body().to_owned());
        }
    }

    for raw in dedup_preserving_order(queued) {
        let Some(fragment) = Fragment::normalize(&raw) else {
            continue;
        };
        let probe = wrap_document(&fragment.markup(), width.max(1.0), height.max(1.0));
        if let Err(err) = renderer.parse(&probe) {
            log::warn!("Dropping queued fragment from export: {}", err);
            continue;
        }
        defs.extend(fragment.defs().iter().cloned());
        fragments.push(fragment.body().to_owned());
    }

    let defs = dedup_preserving_order(defs);
    let fragments = dedup_preserving_order(fragments);

    let mut out = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
         width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
        w = num(width),
        h = num(height)
    );
    if !defs.is_empty() {
        out.push_str("<defs>");
        for d in &defs {
            out.push_str(d);
        }
        out.push_str("</defs>");
    }
    out.push_str(&layers);
    for body in &fragments {
        out.push_str(body);
    }
    out.push_str("</svg>");
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use egui::{Color32, pos2};

    use super::*;
    use crate::color::Paint;
    use crate::surface::LayerId;

    #[test]
    fn merges_layers_and_fragments() {
        let renderer = Arc::new(SvgRenderer::default());
        let mut main = Surface::new(LayerId::Main, 50, 50, Arc::clone(&renderer));
        main.draw_circle(pos2(10.0, 10.0), 5.0, Paint::solid(Color32::RED), None);
        let mut pen = Surface::new(LayerId::Pen, 50, 50, Arc::clone(&renderer));
        let committed = Fragment::place(
            "<svg viewBox=\"0 0 10 10\"><defs><path id=\"a\" d=\"M0 0 L5 5\"/></defs><use href=\"#a\"/></svg>",
            pos2(20.0, 20.0),
        )
        .unwrap();
        pen.commit_fragment(committed).unwrap();

        let queued = vec![
            "<g transform=\"translate(1,2)\"><svg viewBox=\"0 0 5 5\"><defs><path id=\"a\" d=\"M0 0 L5 5\"/></defs><rect width=\"5\" height=\"5\"/></svg></g>".to_owned(),
            "<g transform=\"translate(1,2)\"><svg viewBox=\"0 0 5 5\"><defs><path id=\"a\" d=\"M0 0 L5 5\"/></defs><rect width=\"5\" height=\"5\"/></svg></g>".to_owned(),
            "<g><unclosed>".to_owned(),
        ];
        let doc = svg_document(50.0, 50.0, &[&main, &pen], queued, &renderer);

        assert_eq!(doc.matches("<defs>").count(), 1);
        assert_eq!(doc.matches("<path id=\"a\"").count(), 1, "shared defs merged");
        assert_eq!(doc.matches("<rect width=\"5\"").count(), 1, "duplicate fragment dropped");
        assert!(!doc.contains("unclosed"));
        assert!(doc.contains("<g id=\"layer-main\"><circle"));
        assert!(renderer.parse(&doc).is_ok());
    }
}
