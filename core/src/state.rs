use crate::error::{ChatError, Result};
use crate::llm::{ChatBackend, OPAQUE_MODEL_PROVIDER};
use crate::stream::{LiveEvent, StreamInterpreter};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Message body. Assistant turns that went through a reasoning phase keep the
/// phase split; everything else is plain text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Plain(String),
    Phased {
        reasoning: String,
        answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_reasoning_secs: Option<u64>,
    },
}

impl MessageContent {
    /// The text replayed to a provider as context. Reasoning is deliberately
    /// excluded: it is turn-specific, not conversational content.
    pub fn answer_text(&self) -> &str {
        match self {
            MessageContent::Plain(text) => text,
            MessageContent::Phased { answer, .. } => answer,
        }
    }

    pub fn reasoning_text(&self) -> Option<&str> {
        match self {
            MessageContent::Plain(_) => None,
            MessageContent::Phased { reasoning, .. } => Some(reasoning),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: MessageContent,
    /// Opaque file references, set only on user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>, attachments: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            content: MessageContent::Plain(content.into()),
            attachments,
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::System,
            content: MessageContent::Plain(content.into()),
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::Assistant,
            content,
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Provider-ready message, flattened back to plain text.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// Ordered conversation record owned by exactly one session. Insertion order
/// is chronological order and is never rearranged.
#[derive(Debug, Default)]
pub struct SessionHistory {
    messages: Vec<Message>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Provider-compatible view of the conversation; phased assistant content
    /// contributes only its answer text.
    pub fn flatten(&self) -> Vec<WireMessage> {
        self.messages
            .iter()
            .map(|message| WireMessage {
                role: message.role.as_str().to_string(),
                content: message.content.answer_text().to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
}

/// Progress report for an in-flight turn, forwarded over the streaming
/// channel.
#[derive(Debug, Clone)]
pub enum TurnUpdate {
    Event(LiveEvent),
    Completed(Message),
}

/// Binds a backend, a history, and a per-turn interpreter into one chat
/// session. One session owns its history; at most one turn streams at a time.
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    inner: Arc<RwLock<SessionInner>>,
}

#[derive(Default)]
struct SessionInner {
    history: SessionHistory,
    selection: Option<ModelSelection>,
    streaming: bool,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            inner: Arc::new(RwLock::new(SessionInner::default())),
        }
    }

    pub fn selection(&self) -> Option<ModelSelection> {
        self.inner.read().selection.clone()
    }

    /// Select the (provider, model) pair for subsequent turns. The model must
    /// appear in the provider's configured list, except for the provider
    /// whose deployment ids are opaque.
    pub fn select_model(&self, provider: &str, model: &str) -> Result<()> {
        if !self.backend.validate_model(provider, model)? && provider != OPAQUE_MODEL_PROVIDER {
            return Err(ChatError::Configuration(format!(
                "model '{model}' is not available for provider '{provider}'"
            )));
        }
        self.inner.write().selection = Some(ModelSelection {
            provider: provider.to_string(),
            model: model.to_string(),
        });
        Ok(())
    }

    /// Snapshot of the conversation for rendering.
    pub fn history(&self) -> Vec<Message> {
        self.inner.read().history.messages().to_vec()
    }

    /// Reset the conversation. Provider configuration and the current model
    /// selection are untouched.
    pub fn clear(&self) {
        self.inner.write().history.clear();
    }

    /// Run one complete turn: append the user message, stream the completion,
    /// forward each interpreter event to `on_event` as it is produced, then
    /// append and return the assistant message.
    ///
    /// On a mid-stream provider error no assistant message is appended; the
    /// user message stays in history so the turn can be resubmitted.
    pub async fn submit_turn(
        &self,
        text: impl Into<String>,
        attachments: Vec<String>,
        mut on_event: impl FnMut(&LiveEvent) + Send,
    ) -> Result<Message> {
        let selection = self.inner.read().selection.clone().ok_or_else(|| {
            ChatError::Validation("select a provider and model before sending".to_string())
        })?;
        {
            let mut inner = self.inner.write();
            if inner.streaming {
                return Err(ChatError::Validation(
                    "a turn is already streaming in this session".to_string(),
                ));
            }
            inner.streaming = true;
        }
        let result = self
            .run_turn(&selection, text.into(), attachments, &mut on_event)
            .await;
        self.inner.write().streaming = false;
        result
    }

    async fn run_turn(
        &self,
        selection: &ModelSelection,
        text: String,
        attachments: Vec<String>,
        on_event: &mut (impl FnMut(&LiveEvent) + Send),
    ) -> Result<Message> {
        let context = {
            let mut inner = self.inner.write();
            inner.history.push(Message::user(text, attachments));
            inner.history.flatten()
        };

        let mut stream = self
            .backend
            .stream_completion(&selection.provider, &selection.model, &context)
            .await?;

        let mut interpreter = StreamInterpreter::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            for event in interpreter.feed(&delta) {
                on_event(&event);
            }
        }

        let message = Message::assistant(interpreter.finish().into_content());
        self.inner.write().history.push(message.clone());
        Ok(message)
    }

    /// Channel-based wrapper around [`ChatSession::submit_turn`] for a UI that
    /// repaints per event. Must be called from within a tokio runtime.
    ///
    /// The receiver yields `TurnUpdate::Event` per interpreter event, then
    /// either `TurnUpdate::Completed` with the appended assistant message or
    /// a single error for a failed turn.
    pub fn submit_turn_streaming(
        &self,
        text: impl Into<String>,
        attachments: Vec<String>,
    ) -> Result<mpsc::UnboundedReceiver<Result<TurnUpdate>>> {
        {
            let inner = self.inner.read();
            if inner.selection.is_none() {
                return Err(ChatError::Validation(
                    "select a provider and model before sending".to_string(),
                ));
            }
            if inner.streaming {
                return Err(ChatError::Validation(
                    "a turn is already streaming in this session".to_string(),
                ));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.clone();
        let text = text.into();
        tokio::spawn(async move {
            let event_tx = tx.clone();
            let result = session
                .submit_turn(text, attachments, move |event| {
                    let _ = event_tx.send(Ok(TurnUpdate::Event(event.clone())));
                })
                .await;
            let outcome = match result {
                Ok(message) => tx.send(Ok(TurnUpdate::Completed(message))),
                Err(err) => tx.send(Err(err)),
            };
            if outcome.is_err() {
                tracing::warn!("ui dropped before turn completion");
            }
        });
        Ok(rx)
    }
}
