//! Line protocol codec for the worker's stdout stream.
//!
//! The worker emits free-text log lines, `progress=<n>` markers, and a
//! single JSON payload fenced between two 60-character `=` delimiter
//! lines. Status classification is substring matching against known
//! worker phrasing; it is best-effort heuristics over a log stream, not
//! a grammar, and is kept as a declarative rule table so the phrase set
//! is auditable in one place.

use std::sync::LazyLock;

use regex::Regex;

/// Fence line that opens and closes the embedded JSON payload.
pub const JSON_DELIMITER: &str =
    "============================================================";

/// One decoded observation from a single worker output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Verbatim log line (every non-fence, non-captured line emits one).
    Log(String),
    /// `progress=<n>` marker, clamped to 0..=100.
    Progress(u8),
    /// The worker reported a model as loaded, with the quoted name.
    ModelLoaded(String),
    /// Human-readable status derived from known worker phrasing.
    StatusHint(String),
    /// The worker finished environment setup and accepts commands.
    WorkerReady,
    /// A complete fenced JSON payload (raw text, validity unchecked).
    JsonBlock(String),
}

struct StatusRule {
    any_of: &'static [&'static str],
    hint: &'static str,
    marks_ready: bool,
}

/// First match wins, mirroring the worker's known output phrasing.
const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        any_of: &["Starting", "Setting up"],
        hint: "Starting service...",
        marks_ready: false,
    },
    StatusRule {
        any_of: &["Environment setup complete"],
        hint: "Service running",
        marks_ready: true,
    },
    StatusRule {
        any_of: &["Transcribing"],
        hint: "Transcribing audio...",
        marks_ready: false,
    },
    StatusRule {
        any_of: &["Downloading", "Loading model"],
        hint: "Loading model...",
        marks_ready: false,
    },
    StatusRule {
        any_of: &["Transcription completed"],
        hint: "Processing transcription...",
        marks_ready: false,
    },
];

static MODEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Model '([^']+)'").expect("valid model-name regex"));

/// Incremental decoder; holds only the JSON capture state between lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    capturing_json: bool,
    json_lines: Vec<String>,
}

impl LineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while inside an open delimiter fence.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing_json
    }

    /// Decode one raw line as read from the pipe. Invalid UTF-8 is
    /// replaced rather than refused, so a mojibake line degrades to a
    /// garbled log entry instead of stalling the stream.
    pub fn decode_bytes(&mut self, raw: &[u8]) -> Vec<LineEvent> {
        let text = String::from_utf8_lossy(raw);
        self.decode_line(text.trim_end_matches(['\r', '\n']))
    }

    /// Decode one line already stripped of its terminator.
    pub fn decode_line(&mut self, line: &str) -> Vec<LineEvent> {
        if line == JSON_DELIMITER {
            if self.capturing_json {
                self.capturing_json = false;
                let text = self.json_lines.join("\n");
                self.json_lines.clear();
                return vec![LineEvent::JsonBlock(text)];
            }
            self.capturing_json = true;
            return Vec::new();
        }

        if self.capturing_json {
            // No status scanning inside the fence; the payload is opaque
            // until the closing delimiter arrives.
            self.json_lines.push(line.to_owned());
            return Vec::new();
        }

        let mut events = vec![LineEvent::Log(line.to_owned())];

        if let Some(percent) = parse_progress(line) {
            events.push(LineEvent::Progress(percent));
        }

        if line.contains("Model")
            && line.contains("loaded")
            && let Some(captures) = MODEL_NAME_RE.captures(line)
        {
            events.push(LineEvent::ModelLoaded(captures[1].to_owned()));
        }

        if let Some((_, rest)) = line.split_once("Error:") {
            events.push(LineEvent::StatusHint(format!("Error: {}", rest.trim())));
        } else if let Some(rule) = STATUS_RULES
            .iter()
            .find(|rule| rule.any_of.iter().any(|needle| line.contains(needle)))
        {
            events.push(LineEvent::StatusHint(rule.hint.to_owned()));
            if rule.marks_ready {
                events.push(LineEvent::WorkerReady);
            }
        }

        events
    }
}

fn parse_progress(line: &str) -> Option<u8> {
    let value: u32 = line.strip_prefix("progress=")?.parse().ok()?;
    // Display-only field; out-of-range markers clamp instead of failing.
    Some(value.min(100) as u8)
}
