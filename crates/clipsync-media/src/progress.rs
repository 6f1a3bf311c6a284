//! FFmpeg progress parsing.
//!
//! FFmpeg is run with `-progress pipe:2`, so stderr carries `key=value`
//! status lines interleaved with ordinary diagnostics. [`ProgressParser`]
//! consumes those lines one at a time and recognizes three signals:
//! a frame-count update, the `progress=end` completion marker, and the
//! "already exists" refusal printed when `-n` finds an existing output.

use serde::{Deserialize, Serialize};

/// Maximum number of diagnostic lines kept for error reports.
const MAX_DIAGNOSTIC_LINES: usize = 20;

/// Frame-level progress for one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Frames written so far
    pub frames_done: u64,
    /// Frame count of the source, when known
    pub total_frames: Option<u64>,
}

impl ProgressEvent {
    /// Progress percentage, capped at 100.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_frames {
            Some(total) if total > 0 => {
                Some(((self.frames_done as f64 / total as f64) * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// A recognized signal from the encoder status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderSignal {
    /// Cumulative frames written
    Frames(u64),
    /// `progress=end`
    Completed,
    /// Output already existed and the encoder refused to overwrite it
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ParserState {
    #[default]
    Running,
    Completed,
    AlreadyExists,
}

/// Line-oriented state machine over the encoder's status stream.
///
/// Once a terminal marker is seen, later lines are ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    state: ParserState,
    frames_done: u64,
    diagnostics: Vec<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the signal it carries, if any.
    pub fn feed(&mut self, line: &str) -> Option<EncoderSignal> {
        if self.state != ParserState::Running {
            return None;
        }

        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.contains("already exists") {
            self.state = ParserState::AlreadyExists;
            return Some(EncoderSignal::AlreadyExists);
        }

        match line.split_once('=') {
            Some(("frame", value)) => {
                let frames = value.trim().parse::<u64>().ok()?;
                self.frames_done = frames;
                Some(EncoderSignal::Frames(frames))
            }
            Some(("progress", value)) if value.trim() == "end" => {
                self.state = ParserState::Completed;
                Some(EncoderSignal::Completed)
            }
            Some((key, _)) if is_progress_key(key) => None,
            _ => {
                self.remember(line);
                None
            }
        }
    }

    pub fn frames_done(&self) -> u64 {
        self.frames_done
    }

    pub fn is_completed(&self) -> bool {
        self.state == ParserState::Completed
    }

    pub fn is_already_exists(&self) -> bool {
        self.state == ParserState::AlreadyExists
    }

    /// Non-progress lines seen so far, newest last.
    pub fn diagnostics(&self) -> Option<String> {
        if self.diagnostics.is_empty() {
            None
        } else {
            Some(self.diagnostics.join("\n"))
        }
    }

    fn remember(&mut self, line: &str) {
        if self.diagnostics.len() == MAX_DIAGNOSTIC_LINES {
            self.diagnostics.remove(0);
        }
        self.diagnostics.push(line.to_string());
    }
}

/// Keys FFmpeg emits in `-progress` blocks that carry no signal we use.
fn is_progress_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
