use crate::llm::RawDelta;
use crate::state::MessageContent;
use std::time::Duration;
use tokio::time::Instant;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Event forwarded to the renderer while a turn is streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Reasoning {
        text: String,
    },
    Content {
        text: String,
        /// Whole seconds spent in the reasoning phase, fixed at the
        /// reasoning-to-answer transition. Absent when the turn never had a
        /// reasoning phase.
        elapsed_reasoning_secs: Option<u64>,
    },
}

/// Completed turn as accumulated by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub reasoning: String,
    pub answer: String,
    pub elapsed_reasoning_secs: Option<u64>,
}

impl AssistantReply {
    /// Collapse into message content. A turn with no reasoning is stored as
    /// plain text on every call path, never as a degenerate phased record.
    pub fn into_content(self) -> MessageContent {
        if self.reasoning.is_empty() {
            MessageContent::Plain(self.answer)
        } else {
            MessageContent::Phased {
                reasoning: self.reasoning,
                answer: self.answer,
                elapsed_reasoning_secs: self.elapsed_reasoning_secs,
            }
        }
    }
}

/// Classifies a raw delta stream into reasoning and answer phases.
///
/// Phases: idle, reasoning, answering. A turn enters the reasoning phase on
/// the first delta with a reasoning-channel fragment, or on an inline
/// `<think>` marker from providers that have no separate channel. The
/// reasoning clock starts at most once; the elapsed value is fixed at the
/// first transition to the answer phase and attached to every content event
/// from then on.
///
/// One instance serves one turn; [`StreamInterpreter::finish`] consumes it.
#[derive(Debug, Default)]
pub struct StreamInterpreter {
    reasoning: String,
    answer: String,
    in_reasoning: bool,
    inline_reasoning: bool,
    reasoning_started: Option<Instant>,
    elapsed_secs: Option<u64>,
}

impl StreamInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one delta and return the events it produced, in order.
    ///
    /// Phase transitions key on the presence of a channel, not on the text
    /// being non-empty; empty fragments transition silently.
    pub fn feed(&mut self, delta: &RawDelta) -> Vec<LiveEvent> {
        let mut events = Vec::new();

        if let Some(text) = &delta.reasoning {
            self.enter_reasoning();
            self.push_reasoning(text, &mut events);
            return events;
        }

        let Some(text) = &delta.content else {
            return events;
        };
        let mut text = text.clone();

        if !self.in_reasoning
            && self.reasoning_started.is_none()
            && self.answer.is_empty()
            && text.contains(THINK_OPEN)
        {
            self.inline_reasoning = true;
            self.enter_reasoning();
            text = text.replacen(THINK_OPEN, "", 1);
        }

        if self.in_reasoning && self.inline_reasoning {
            // Everything rides the content channel until the closing marker;
            // the marker itself contributes no visible text.
            match text.split_once(THINK_CLOSE) {
                Some((thought, rest)) => {
                    let (thought, rest) = (thought.to_string(), rest.to_string());
                    self.push_reasoning(&thought, &mut events);
                    self.leave_reasoning();
                    self.push_answer(&rest, &mut events);
                }
                None => self.push_reasoning(&text, &mut events),
            }
            return events;
        }

        if self.in_reasoning {
            // A content-channel delta while the reasoning channel was in use
            // flips the phase, even when its text is empty.
            self.leave_reasoning();
        }
        self.push_answer(&text, &mut events);
        events
    }

    /// Consume the interpreter once the delta stream is exhausted.
    ///
    /// A stream that ends while still reasoning fixes the elapsed value here,
    /// so it is present exactly when reasoning text is.
    pub fn finish(self) -> AssistantReply {
        let elapsed_secs = if self.reasoning.is_empty() {
            None
        } else {
            self.elapsed_secs
                .or_else(|| self.reasoning_started.map(|started| round_secs(started.elapsed())))
        };
        AssistantReply {
            reasoning: self.reasoning,
            answer: self.answer,
            elapsed_reasoning_secs: elapsed_secs,
        }
    }

    fn enter_reasoning(&mut self) {
        if self.reasoning_started.is_none() {
            self.reasoning_started = Some(Instant::now());
        }
        self.in_reasoning = true;
    }

    fn leave_reasoning(&mut self) {
        self.in_reasoning = false;
        if self.elapsed_secs.is_none() {
            if let Some(started) = self.reasoning_started {
                self.elapsed_secs = Some(round_secs(started.elapsed()));
            }
        }
    }

    fn push_reasoning(&mut self, text: &str, events: &mut Vec<LiveEvent>) {
        self.reasoning.push_str(text);
        if !text.is_empty() {
            events.push(LiveEvent::Reasoning {
                text: text.to_string(),
            });
        }
    }

    fn push_answer(&mut self, text: &str, events: &mut Vec<LiveEvent>) {
        self.answer.push_str(text);
        if !text.is_empty() {
            events.push(LiveEvent::Content {
                text: text.to_string(),
                elapsed_reasoning_secs: self.elapsed_secs,
            });
        }
    }
}

fn round_secs(elapsed: Duration) -> u64 {
    elapsed.as_secs_f64().round() as u64
}
