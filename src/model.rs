//! Typed views of the worker protocol: the transcription payload the
//! worker prints between delimiter fences, and the line commands the
//! supervisor writes to its stdin.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::WxResult;

// ---------------------------------------------------------------------------
// Transcription payload
// ---------------------------------------------------------------------------

/// One aligned word inside a segment. Alignment can fail per word, so
/// the timing fields are optional; `score` is the worker's confidence
/// in 0..=1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// One transcript segment with optional word-level detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Vec<WordTiming>,
}

/// The complete payload the worker emits for one transcription run.
///
/// Produced atomically from a single fenced JSON block; a new result
/// replaces any prior one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub transcript: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub audio_duration: Option<f64>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptionResult {
    /// Parse the raw text of a fenced JSON block.
    ///
    /// Failure here is advisory for the session (the worker already
    /// moved on); the caller surfaces it as a status hint.
    pub fn parse(json_text: &str) -> WxResult<Self> {
        Ok(serde_json::from_str(json_text)?)
    }

    /// Total number of aligned words across all segments.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.words.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Model catalog
// ---------------------------------------------------------------------------

/// Models the worker knows how to load, with approximate download sizes.
pub const AVAILABLE_MODELS: &[(&str, &str)] = &[
    ("tiny", "~39 MB"),
    ("tiny.en", "~39 MB"),
    ("base", "~74 MB"),
    ("base.en", "~74 MB"),
    ("small", "~244 MB"),
    ("small.en", "~244 MB"),
    ("medium", "~769 MB"),
    ("medium.en", "~769 MB"),
    ("large", "~1550 MB"),
    ("large-v1", "~1550 MB"),
    ("large-v2", "~1550 MB"),
    ("large-v3", "~1550 MB"),
];

#[must_use]
pub fn is_known_model(name: &str) -> bool {
    AVAILABLE_MODELS.iter().any(|(model, _)| *model == name)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A command accepted by the worker's stdin, one line per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    LoadModel(String),
    TranscribeAudio(PathBuf),
    Shutdown,
}

impl WorkerCommand {
    /// Exact single-line wire form, trailing newline included.
    ///
    /// Audio paths are normalized to forward slashes; the worker strips
    /// surrounding quotes itself.
    #[must_use]
    pub fn wire_form(&self) -> String {
        match self {
            Self::LoadModel(model) => format!("load-model({model})\n"),
            Self::TranscribeAudio(path) => {
                let normalized = path.display().to_string().replace('\\', "/");
                format!("transcribe-audio(\"{normalized}\")\n")
            }
            Self::Shutdown => "exit()\n".to_owned(),
        }
    }
}
