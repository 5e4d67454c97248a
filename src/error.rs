use thiserror::Error;

/// Errors raised while decoding a controller message.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("invalid arguments for `{command}`: {source}")]
    InvalidArgs {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while normalizing or rasterizing SVG markup.
#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("fragment is empty")]
    Empty,
    #[error("failed to parse svg: {0}")]
    Parse(#[from] usvg::Error),
    #[error("cannot render into a {width}x{height} target")]
    InvalidTarget { width: u32, height: u32 },
}

/// Errors raised while drawing a primitive onto a surface.
#[derive(Error, Debug)]
pub enum DrawError {
    #[error("failed to load image `{src}`: {source}")]
    ImageLoad {
        src: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to render markup: {0}")]
    Markup(#[from] FragmentError),
}

/// Errors raised by the snippet library file.
#[derive(Error, Debug)]
pub enum SnippetError {
    #[error("snippet file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snippet file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid key chord `{0}`")]
    InvalidChord(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
}

/// Errors reported by a typesetting backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesetError {
    #[error("typesetting failed: {0}")]
    Failed(String),
    #[error("typesetting request was dropped")]
    Canceled,
}

/// Errors raised while writing pixels to disk.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture region is empty")]
    Empty,
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("capture i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
