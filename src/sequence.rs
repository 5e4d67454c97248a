//! Timed frame playback for `renderSequence`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use egui::{Pos2, Rect};

use crate::error::CaptureError;
use crate::primitive::{DrawOutcome, Primitive};
use crate::protocol::{DEFAULT_FRAME_DURATION, SequenceArgs};
use crate::state::AppState;
use crate::surface::{Layers, Surface, encode_png};
use crate::typeset::TypesetRequest;

/// What a call to [`Sequence::tick`] did.
#[derive(Debug, PartialEq)]
pub enum Tick {
    /// Not yet time for the next frame.
    Waiting,
    /// A frame went up. Typeset primitives in it still need rendering.
    Drew {
        index: usize,
        typesets: Vec<(TypesetRequest, Pos2)>,
    },
    /// All frames have been shown, or playback was stopped.
    Finished { awaits_completion: bool },
}

#[derive(Debug)]
pub struct Sequence {
    frames: Vec<Vec<Primitive>>,
    background: Vec<Primitive>,
    frame_duration: Duration,
    save_path: Option<PathBuf>,
    awaits_completion: bool,
    next_frame: usize,
    due: Option<Instant>,
    playing: bool,
}

impl Sequence {
    pub fn new(args: SequenceArgs) -> Self {
        Self {
            frames: args.frames,
            background: args.background,
            frame_duration: frame_duration(args.frame_duration),
            save_path: args.save_path,
            awaits_completion: args.awaits_completion,
            next_frame: 0,
            due: None,
            playing: false,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn awaits_completion(&self) -> bool {
        self.awaits_completion
    }

    /// Frames shown so far.
    pub fn position(&self) -> usize {
        self.next_frame
    }

    /// Draws the static background; the first frame follows on the next tick.
    pub fn start(&mut self, layers: &mut Layers, font_size: f32) {
        self.playing = true;
        self.next_frame = 0;
        self.due = None;
        draw_all(&self.background, &mut layers.background, font_size);
        if let Some(dir) = &self.save_path {
            if let Err(err) = std::fs::create_dir_all(dir) {
                log::error!("Cannot create frame directory {}: {}", dir.display(), err);
            }
        }
        log::info!(
            "Playing {} frame(s) at {:?} per frame",
            self.frames.len(),
            self.frame_duration
        );
    }

    /// Shows the next frame once its time has come. Empty frames are passed
    /// over without waiting.
    pub fn tick(
        &mut self,
        now: Instant,
        layers: &mut Layers,
        state: &mut AppState,
        font_size: f32,
    ) -> Tick {
        if !self.playing {
            return self.finish();
        }
        if self.due.is_some_and(|due| now < due) {
            return Tick::Waiting;
        }
        loop {
            let Some(frame) = self.frames.get(self.next_frame) else {
                return self.finish();
            };
            let index = self.next_frame;
            self.next_frame += 1;
            layers.main.clear();
            if frame.is_empty() {
                continue;
            }

            if state.rerender_background {
                layers.background.clear();
                draw_all(&self.background, &mut layers.background, font_size);
                state.rerender_background = false;
            }
            let typesets = draw_all(frame, &mut layers.main, font_size);
            if let Some(dir) = &self.save_path {
                if let Err(err) = save_frame(layers, dir, index) {
                    log::error!("Failed to save frame {}: {}", index, err);
                }
            }
            self.due = Some(now + self.frame_duration);
            return Tick::Drew { index, typesets };
        }
    }

    /// Stops before the next frame. The completion signal is still owed.
    pub fn stop(&mut self) {
        if self.playing {
            log::info!("Sequence stopped after {} frame(s)", self.next_frame);
        }
        self.playing = false;
    }

    fn finish(&mut self) -> Tick {
        self.playing = false;
        Tick::Finished {
            awaits_completion: std::mem::take(&mut self.awaits_completion),
        }
    }
}

/// Seconds to a frame duration. Values a `Duration` cannot hold fall back to
/// the default.
fn frame_duration(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds).unwrap_or_else(|_| {
        log::warn!("Frame duration {} out of range, using the default", seconds);
        Duration::from_secs_f32(DEFAULT_FRAME_DURATION)
    })
}

/// Draws `primitives` in order, logging the ones that fail.
pub(crate) fn draw_all(
    primitives: &[Primitive],
    surface: &mut Surface,
    font_size: f32,
) -> Vec<(TypesetRequest, Pos2)> {
    let mut typesets = Vec::new();
    for primitive in primitives {
        match primitive.draw(surface, font_size) {
            Ok(DrawOutcome::Done) => {}
            Ok(DrawOutcome::Typeset { request, center }) => typesets.push((request, center)),
            Err(err) => log::warn!("Failed to draw {}: {}", primitive.kind(), err),
        }
    }
    typesets
}

fn save_frame(layers: &Layers, dir: &Path, index: usize) -> Result<(), CaptureError> {
    let size = layers.viewport_size();
    let pixels = layers
        .composite_region(Rect::from_min_size(Pos2::ZERO, size))
        .ok_or(CaptureError::Empty)?;
    let bytes = encode_png(&pixels)?;
    std::fs::write(dir.join(format!("frame-{index:05}.png")), bytes)?;
    Ok(())
}
