pub mod config;
pub mod error;
pub mod llm;
pub mod state;
pub mod stream;
pub mod telemetry;


pub use config::ProviderSettings;
pub use error::ChatError;
pub use llm::{ChatBackend, MockBackend, ProviderRegistry, RawDelta};
pub use state::{ChatSession, Message, MessageContent, MessageRole, SessionHistory, TurnUpdate};
pub use stream::{AssistantReply, LiveEvent, StreamInterpreter};
