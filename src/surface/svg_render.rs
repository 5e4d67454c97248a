use tiny_skia::{Pixmap, Transform};

use crate::error::FragmentError;

/// Parses and rasterizes SVG markup with a shared font database.
pub struct SvgRenderer {
    options: usvg::Options<'static>,
}

impl std::fmt::Debug for SvgRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgRenderer")
            .field("fonts", &self.options.fontdb.len())
            .finish()
    }
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            options: usvg::Options::default(),
        }
    }
}

impl SvgRenderer {
    /// Creates a renderer that can shape text with the fonts installed on
    /// the system. Loading them takes a while, so do this once at startup.
    pub fn with_system_fonts() -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        log::info!("Loaded {} font faces", options.fontdb.len());
        Self { options }
    }

    pub fn parse(&self, svg: &str) -> Result<usvg::Tree, FragmentError> {
        if svg.trim().is_empty() {
            return Err(FragmentError::Empty);
        }
        Ok(usvg::Tree::from_str(svg, &self.options)?)
    }

    /// Renders loose SVG elements (no root) into `target`, in target pixel
    /// coordinates, after applying `transform`.
    pub fn render_markup(
        &self,
        target: &mut Pixmap,
        markup: &str,
        transform: Transform,
    ) -> Result<(), FragmentError> {
        let document = wrap_document(markup, target.width() as f32, target.height() as f32);
        let tree = self.parse(&document)?;
        resvg::render(&tree, transform, &mut target.as_mut());
        Ok(())
    }

    /// Rasterizes a full SVG document scaled to `width`x`height`.
    pub fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Pixmap, FragmentError> {
        let tree = self.parse(svg)?;
        let mut pixmap =
            Pixmap::new(width, height).ok_or(FragmentError::InvalidTarget { width, height })?;
        let size = tree.size();
        let transform = Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        Ok(pixmap)
    }
}

/// Wraps loose elements into a root `<svg>` of the given size.
pub fn wrap_document(body: &str, width: f32, height: f32) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
         width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">{body}</svg>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rect_markup() {
        let renderer = SvgRenderer::default();
        let mut pixmap = Pixmap::new(10, 10).unwrap();
        renderer
            .render_markup(
                &mut pixmap,
                "<rect x=\"0\" y=\"0\" width=\"10\" height=\"10\" fill=\"#ff0000\"/>",
                Transform::identity(),
            )
            .unwrap();
        let px = pixmap.pixel(5, 5).unwrap();
        assert_eq!((px.red(), px.alpha()), (255, 255));
    }

    #[test]
    fn rejects_garbage() {
        let renderer = SvgRenderer::default();
        assert!(renderer.parse("<svg><g>").is_err());
        assert!(matches!(renderer.parse("  "), Err(FragmentError::Empty)));
    }
}
