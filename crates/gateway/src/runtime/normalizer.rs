//! Reduces the provider's run events into ordered ticks.
//!
//! [`RunNormalizer`] is a pure reducer: it owns the accumulated text, the
//! current step label and the citation stubs of one turn, and answers each
//! [`RunEvent`] with at most one [`NormalizedTick`].  It performs no I/O.
//!
//! Text deltas only ever append.  Citation placeholders are rewritten once,
//! when the provider reports the finished message, by replacing the
//! accumulated text of that message with its final, substituted form.

use fr_domain::citation::CitationStub;
use fr_domain::wire::TurnUpdate;
use fr_providers::{Annotation, AnnotationKind, RunEvent, RunStatus, ToolKind};

pub const STEP_PROCESSING: &str = "PROCESSING...";
pub const STEP_SEARCHING: &str = "SEARCHING DOCUMENTS...";
pub const STEP_GENERATING: &str = "GENERATING RESPONSE...";
pub const STEP_RUNNING_CODE: &str = "RUNNING CODE...";
pub const STEP_COMPLETE: &str = "COMPLETE";

pub const TIMEOUT_MESSAGE: &str = "ASSISTANT RESPONSE TIMEOUT - PLEASE TRY AGAIN";
pub const NO_FINAL_STATUS_MESSAGE: &str = "ASSISTANT RUN ENDED WITHOUT A FINAL STATUS";

const UNKNOWN_SOURCE: &str = "Unknown source";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ticks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Completed,
    Failed { reason: Option<String> },
    Cancelled,
    /// Expired, incomplete, requires_action or anything unrecognized.
    Ended(RunStatus),
}

impl Terminal {
    pub fn from_status(status: &RunStatus, last_error: Option<&str>) -> Self {
        match status {
            RunStatus::Completed => Terminal::Completed,
            RunStatus::Failed => Terminal::Failed {
                reason: last_error.map(str::to_owned),
            },
            RunStatus::Cancelled => Terminal::Cancelled,
            other => Terminal::Ended(other.clone()),
        }
    }

    /// The user-facing error text, or `None` for a completed run.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Terminal::Completed => None,
            Terminal::Failed { reason } => Some(format!(
                "ASSISTANT RUN FAILED: {}",
                reason.as_deref().filter(|r| !r.is_empty()).unwrap_or("UNKNOWN ERROR")
            )),
            Terminal::Cancelled => Some("ASSISTANT RUN WAS CANCELLED".into()),
            Terminal::Ended(status) => Some(format!("ASSISTANT RUN ENDED WITH STATUS: {status}")),
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Terminal::Completed => "completed",
            Terminal::Failed { .. } => "failed",
            Terminal::Cancelled => "cancelled",
            Terminal::Ended(_) => "ended",
        }
    }
}

/// The turn's visible state after one event.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTick {
    pub text: String,
    pub step: String,
    pub citations: Vec<CitationStub>,
    /// Set once a message has completed.
    pub message_id: Option<String>,
    pub terminal: Option<Terminal>,
}

impl NormalizedTick {
    /// The `update` frame for this tick, with lean citation data.
    pub fn to_update(&self) -> TurnUpdate {
        TurnUpdate {
            content: self.text.clone(),
            citations: self.citations.iter().map(CitationStub::label).collect(),
            step: self.step.clone(),
            citation_data: self.citations.iter().map(Into::into).collect(),
            openai_message_id: self.message_id.clone(),
            sources: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reducer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RunNormalizer {
    /// Final text of messages that already completed in this run.
    committed: String,
    /// Deltas of the message currently being written.
    current: String,
    step: String,
    citations: Vec<CitationStub>,
    message_id: Option<String>,
    terminal: Option<Terminal>,
}

impl Default for RunNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RunNormalizer {
    pub fn new() -> Self {
        Self {
            committed: String::new(),
            current: String::new(),
            step: STEP_PROCESSING.to_owned(),
            citations: Vec::new(),
            message_id: None,
            terminal: None,
        }
    }

    /// Fold one event.  Returns the tick to forward, if the event changed
    /// anything a client can see.  Events after the terminal one are ignored.
    pub fn apply(&mut self, event: &RunEvent) -> Option<NormalizedTick> {
        if self.terminal.is_some() {
            return None;
        }

        match event {
            RunEvent::RunCreated { .. } => return None,
            RunEvent::StepCreated { step_type } => {
                self.step = format!("STEP {}...", step_type.to_uppercase());
            }
            RunEvent::StepDelta { tool_kinds } => {
                if !tool_kinds.contains(&ToolKind::FileSearch) || self.step == STEP_SEARCHING {
                    return None;
                }
                self.step = STEP_SEARCHING.to_owned();
            }
            RunEvent::TextCreated => {
                self.step = STEP_GENERATING.to_owned();
            }
            RunEvent::TextDelta { value } => {
                if value.is_empty() {
                    return None;
                }
                self.current.push_str(value);
            }
            RunEvent::ToolCallCreated { kind } => {
                self.step = tool_step_label(kind);
            }
            RunEvent::MessageDone { message } => {
                let first = self.citations.len() as u32 + 1;
                let (text, stubs) = substitute_citations(&message.text, &message.annotations, first);
                if !text.is_empty() {
                    if !self.committed.is_empty() {
                        self.committed.push_str("\n\n");
                    }
                    self.committed.push_str(&text);
                }
                self.current.clear();
                self.citations.extend(stubs);
                self.message_id = Some(message.id.clone());
                self.step = STEP_COMPLETE.to_owned();
            }
            RunEvent::RunFinished { status, last_error } => {
                self.terminal = Some(Terminal::from_status(status, last_error.as_deref()));
            }
        }

        Some(self.tick())
    }

    /// Settle a run whose event stream closed without a terminal status.
    ///
    /// A run that already produced a complete message counts as completed.
    pub fn finish_without_status(&mut self) -> Result<NormalizedTick, &'static str> {
        if self.terminal.is_some() {
            return Ok(self.tick());
        }
        if self.message_id.is_some() {
            self.terminal = Some(Terminal::Completed);
            Ok(self.tick())
        } else {
            Err(NO_FINAL_STATUS_MESSAGE)
        }
    }

    pub fn text(&self) -> String {
        match (self.committed.is_empty(), self.current.is_empty()) {
            (_, true) => self.committed.clone(),
            (true, false) => self.current.clone(),
            (false, false) => format!("{}\n\n{}", self.committed, self.current),
        }
    }

    pub fn citations(&self) -> &[CitationStub] {
        &self.citations
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn tick(&self) -> NormalizedTick {
        NormalizedTick {
            text: self.text(),
            step: self.step.clone(),
            citations: self.citations.clone(),
            message_id: self.message_id.clone(),
            terminal: self.terminal.clone(),
        }
    }
}

pub fn tool_step_label(kind: &ToolKind) -> String {
    match kind {
        ToolKind::FileSearch => STEP_SEARCHING.to_owned(),
        ToolKind::CodeInterpreter => STEP_RUNNING_CODE.to_owned(),
        ToolKind::Other(name) => format!("USING {}...", name.to_uppercase()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Citation substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replace each `file_citation` annotation span in `text` with `[n]`.
///
/// Spans are located by their character offsets when those match the
/// annotation text, otherwise by searching forward from the previous
/// match.  Stubs are numbered from `first_number` in order of position.
/// Annotations that cannot be located, and non-citation annotations, are
/// left alone.
pub fn substitute_citations(
    text: &str,
    annotations: &[Annotation],
    first_number: u32,
) -> (String, Vec<CitationStub>) {
    let chars: Vec<char> = text.chars().collect();
    let mut spans: Vec<(usize, usize, String, String, String)> = Vec::new();
    let mut cursor = 0usize;

    for ann in annotations {
        let AnnotationKind::FileCitation { file_id, quote } = &ann.kind else {
            continue;
        };
        let needle: Vec<char> = ann.text.chars().collect();
        if needle.is_empty() {
            continue;
        }

        let overlaps = |s: usize, e: usize, spans: &[(usize, usize, String, String, String)]| {
            spans.iter().any(|(a, b, ..)| s < *b && *a < e)
        };

        let by_offset = match (ann.start_index, ann.end_index) {
            (Some(s), Some(e)) if e <= chars.len() && s < e && chars[s..e] == needle[..] => Some((s, e)),
            _ => None,
        }
        .filter(|(s, e)| !overlaps(*s, *e, &spans));

        let located = by_offset.or_else(|| {
            let mut from = cursor;
            while let Some(s) = find_chars(&chars, &needle, from) {
                let e = s + needle.len();
                if !overlaps(s, e, &spans) {
                    return Some((s, e));
                }
                from = s + 1;
            }
            None
        });

        let Some((start, end)) = located else {
            tracing::debug!(annotation = %ann.text, "citation span not found in message text");
            continue;
        };
        cursor = end;

        let quote = quote
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(if ann.text.trim().is_empty() { UNKNOWN_SOURCE } else { ann.text.as_str() })
            .to_owned();
        spans.push((start, end, file_id.clone(), quote, ann.text.clone()));
    }

    spans.sort_by_key(|(start, ..)| *start);

    let mut out = String::with_capacity(text.len());
    let mut stubs = Vec::with_capacity(spans.len());
    let mut pos = 0usize;
    for (i, (start, end, file_id, quote, marker)) in spans.into_iter().enumerate() {
        let number = first_number + i as u32;
        out.extend(&chars[pos..start]);
        out.push_str(&format!("[{number}]"));
        pos = end;
        stubs.push(CitationStub::new(number, file_id, quote).with_marker(marker));
    }
    out.extend(&chars[pos..]);

    (out, stubs)
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
