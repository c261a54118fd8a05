use thiserror::Error;

/// Errors surfaced by the Ponder core.
///
/// The interpreter and the registry never swallow these; [`crate::state::ChatSession`]
/// is the single place that decides what partial state survives a failure.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing or invalid provider definition, unresolved credential, or an
    /// unknown provider/model at setup time. Fatal to the attempted operation
    /// only; existing history is untouched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure, non-2xx response, or malformed delta during an
    /// active stream. Aborts only the current turn.
    #[error("provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    /// A completion was requested before the session was ready for one.
    #[error("{0}")]
    Validation(String),
}

impl ChatError {
    /// Wrap a transport or protocol failure, annotated with the provider name.
    pub fn provider(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Provider {
            provider: name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
