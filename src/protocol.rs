//! Controller wire protocol: newline-delimited JSON messages in, JSON arrays
//! out.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::primitive::Primitive;
use crate::surface::LayerId;

/// Default frame duration of a sequence, in seconds.
pub(crate) const DEFAULT_FRAME_DURATION: f32 = 0.05;

/// Splits a byte stream into complete lines, carrying partial lines over to
/// the next chunk.
///
/// Non-finite numbers (`Infinity`, `-Infinity`) are not JSON; outside of
/// strings they are rewritten to the string `"Infinity"`, which curves read
/// as a path break.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the lines it completed. Blank lines are
    /// skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(rewrite_non_finite)
            .collect()
    }

    /// Returns whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rewrite_non_finite(&rest))
        }
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }
}

fn rewrite_non_finite(line: &str) -> String {
    const TOKEN: &str = "Infinity";
    let mut out = String::with_capacity(line.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = line;
    while let Some(c) = rest.chars().next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(tail) = rest.strip_prefix(TOKEN).or_else(|| {
            rest.strip_prefix('-')
                .and_then(|r| r.strip_prefix(TOKEN))
        }) {
            out.push_str("\"Infinity\"");
            rest = tail;
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// A message as it arrives: a command name and untyped arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

/// Where a draw lands.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Target {
    #[serde(default)]
    background: bool,
    #[serde(default)]
    canvas: Option<String>,
    #[serde(default)]
    layer: Option<String>,
}

impl Target {
    fn layer(&self) -> LayerId {
        match self.layer.as_deref().or(self.canvas.as_deref()) {
            Some("pen") => LayerId::Pen,
            Some("background") => LayerId::Background,
            _ if self.background => LayerId::Background,
            _ => LayerId::Main,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClearArgs {
    #[serde(default = "yes")]
    pub background: bool,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitEventArgs {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AwaitPropertiesArgs {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceArgs {
    pub frames: Vec<Vec<Primitive>>,
    pub background: Vec<Primitive>,
    /// Seconds per frame.
    pub frame_duration: f32,
    /// Directory frames are written to, if any.
    pub save_path: Option<PathBuf>,
    pub awaits_completion: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSequenceArgs {
    #[serde(default)]
    frames: Vec<Vec<Value>>,
    #[serde(default)]
    background: Vec<Value>,
    #[serde(default)]
    frame_duration: Option<f32>,
    #[serde(default)]
    save_path: Option<String>,
    #[serde(default)]
    awaits_completion: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackgroundStyleArgs {
    #[serde(alias = "style")]
    pub background: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureArgs {
    pub save_path: String,
    #[serde(default)]
    pub awaits_reply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ResizeArgs {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Draw {
        layer: LayerId,
        primitive: Primitive,
    },
    DrawGroup {
        layer: LayerId,
        primitives: Vec<Primitive>,
    },
    Clear(ClearArgs),
    ClearVectorOverlay,
    AwaitEvent(AwaitEventArgs),
    AwaitProperties(AwaitPropertiesArgs),
    RenderSequence(SequenceArgs),
    ToggleBackground,
    SetLightMode,
    SetDarkMode,
    SetBackgroundStyle(BackgroundStyleArgs),
    CaptureArea(CaptureArgs),
    ResizeWindow(ResizeArgs),
}

impl Command {
    /// Parses one framed line.
    pub fn parse(line: &str) -> Result<Command, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(line)?;
        Command::from_raw(raw)
    }

    pub fn from_raw(raw: RawMessage) -> Result<Command, ProtocolError> {
        let RawMessage { command, args } = raw;
        let args = match args {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let cmd = match command.as_str() {
            "draw" => {
                let inner = unwrap_nested_args(args);
                let layer = decode::<Target>(&command, inner.clone())?.layer();
                Command::Draw {
                    layer,
                    primitive: decode(&command, inner)?,
                }
            }
            "drawGroup" => {
                #[derive(Deserialize)]
                struct Group {
                    #[serde(default, alias = "primitives")]
                    shapes: Vec<Value>,
                }
                let layer = decode::<Target>(&command, args.clone())?.layer();
                let group: Group = decode(&command, args)?;
                Command::DrawGroup {
                    layer,
                    primitives: primitives_lenient(group.shapes),
                }
            }
            "clear" => Command::Clear(decode(&command, args)?),
            "clearVectorOverlay" => Command::ClearVectorOverlay,
            "awaitEvent" => Command::AwaitEvent(decode(&command, args)?),
            "awaitProperties" => Command::AwaitProperties(decode(&command, args)?),
            "renderSequence" | "renderScene" => {
                let raw: RawSequenceArgs = decode(&command, args)?;
                Command::RenderSequence(SequenceArgs {
                    frames: raw.frames.into_iter().map(primitives_lenient).collect(),
                    background: primitives_lenient(raw.background),
                    frame_duration: raw
                        .frame_duration
                        .filter(|d| Duration::try_from_secs_f32(*d).is_ok())
                        .unwrap_or(DEFAULT_FRAME_DURATION),
                    save_path: raw
                        .save_path
                        .filter(|p| !p.is_empty() && p != "none")
                        .map(|p| expand_home(&p)),
                    awaits_completion: raw.awaits_completion,
                })
            }
            "toggleBackground" => Command::ToggleBackground,
            "setLightMode" => Command::SetLightMode,
            "setDarkMode" => Command::SetDarkMode,
            "setBackgroundStyle" | "setBackground" => {
                Command::SetBackgroundStyle(decode(&command, args)?)
            }
            "captureArea" => Command::CaptureArea(decode(&command, args)?),
            "resizeWindow" => Command::ResizeWindow(decode(&command, args)?),
            _ => return Err(ProtocolError::UnknownCommand(command)),
        };
        Ok(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Draw { .. } => "draw",
            Command::DrawGroup { .. } => "drawGroup",
            Command::Clear(_) => "clear",
            Command::ClearVectorOverlay => "clearVectorOverlay",
            Command::AwaitEvent(_) => "awaitEvent",
            Command::AwaitProperties(_) => "awaitProperties",
            Command::RenderSequence(_) => "renderSequence",
            Command::ToggleBackground => "toggleBackground",
            Command::SetLightMode => "setLightMode",
            Command::SetDarkMode => "setDarkMode",
            Command::SetBackgroundStyle(_) => "setBackgroundStyle",
            Command::CaptureArea(_) => "captureArea",
            Command::ResizeWindow(_) => "resizeWindow",
        }
    }

    /// Whether the controller blocks on a reply to this command.
    pub fn expects_reply(&self) -> bool {
        match self {
            Command::AwaitEvent(_) | Command::AwaitProperties(_) | Command::ResizeWindow(_) => true,
            Command::RenderSequence(args) => args.awaits_completion,
            Command::CaptureArea(args) => args.awaits_reply,
            _ => false,
        }
    }
}

fn decode<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(args).map_err(|source| ProtocolError::InvalidArgs {
        command: command.to_owned(),
        source,
    })
}

/// Some clients send `{"args": {...primitive}, "canvas": "pen"}` for single
/// draws; the outer target fields are folded into the primitive.
fn unwrap_nested_args(args: Value) -> Value {
    match args {
        Value::Object(mut outer) if outer.get("args").is_some_and(Value::is_object) && !outer.contains_key("type") => {
            let Some(Value::Object(mut inner)) = outer.remove("args") else {
                return Value::Object(outer);
            };
            for (key, value) in outer {
                inner.entry(key).or_insert(value);
            }
            Value::Object(inner)
        }
        other => other,
    }
}

/// Decodes each primitive on its own, dropping (and logging) the bad ones.
fn primitives_lenient(values: Vec<Value>) -> Vec<Primitive> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Primitive>(value) {
            Ok(primitive) => Some(primitive),
            Err(err) => {
                log::warn!("Dropping malformed primitive: {}", err);
                None
            }
        })
        .collect()
}

/// Expands a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

/// Serializes a reply: a JSON array terminated by a newline.
pub fn encode_reply(values: &[Value]) -> String {
    let mut out = Value::Array(values.to_vec()).to_string();
    out.push('\n');
    out
}
