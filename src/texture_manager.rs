use std::collections::HashMap;

use egui::{ColorImage, Context, TextureHandle, TextureId, TextureOptions};
use thiserror::Error;
use tiny_skia::Pixmap;

use crate::surface::{LayerId, Surface};

/// Errors that can occur while uploading a layer
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TextureGenerationError {
    #[error("Layer has no pixels")]
    Empty,
    #[error("Invalid texture dimensions {0}x{1}")]
    InvalidDimensions(u32, u32),
}

/// One uploaded texture per layer, replaced whenever the layer's revision
/// moves on.
#[derive(Default)]
pub struct TextureManager {
    textures: HashMap<LayerId, (u64, TextureHandle)>,
    uploads: u64,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the texture for `layer` at `revision`, calling `generator`
    /// only when the cached one is stale.
    pub fn get_or_create_texture<F>(
        &mut self,
        layer: LayerId,
        revision: u64,
        generator: F,
        ctx: &Context,
    ) -> Result<TextureId, TextureGenerationError>
    where
        F: FnOnce() -> Result<ColorImage, TextureGenerationError>,
    {
        if let Some((cached, handle)) = self.textures.get(&layer) {
            if *cached == revision {
                return Ok(handle.id());
            }
        }

        let image = generator()?;
        self.uploads += 1;
        match self.textures.get_mut(&layer) {
            Some((cached, handle)) => {
                handle.set(image, TextureOptions::LINEAR);
                *cached = revision;
                Ok(handle.id())
            }
            None => {
                let handle = ctx.load_texture(format!("layer_{}", layer.name()), image, TextureOptions::LINEAR);
                let id = handle.id();
                self.textures.insert(layer, (revision, handle));
                Ok(id)
            }
        }
    }

    /// Texture for the flattened content of `surface`.
    pub fn surface_texture(
        &mut self,
        surface: &Surface,
        ctx: &Context,
    ) -> Result<TextureId, TextureGenerationError> {
        self.get_or_create_texture(
            surface.layer(),
            surface.revision(),
            || {
                let pixels = surface.flattened().ok_or(TextureGenerationError::Empty)?;
                color_image(&pixels)
            },
            ctx,
        )
    }

    /// Drops the texture of `layer`; the next request uploads again.
    pub fn invalidate(&mut self, layer: LayerId) {
        self.textures.remove(&layer);
    }

    pub fn clear_cache(&mut self) {
        self.textures.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.textures.len()
    }

    /// How many times pixels were sent to the GPU.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

/// Premultiplied pixmap to egui image.
pub fn color_image(pixmap: &Pixmap) -> Result<ColorImage, TextureGenerationError> {
    let (w, h) = (pixmap.width(), pixmap.height());
    if w == 0 || h == 0 {
        return Err(TextureGenerationError::InvalidDimensions(w, h));
    }
    Ok(ColorImage::from_rgba_premultiplied(
        [w as usize, h as usize],
        pixmap.data(),
    ))
}
