use crate::config::{load_provider_settings, ProviderSettings};
use crate::error::{ChatError, Result};
use crate::state::WireMessage;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// Ark deployment ids are provisioned per account and cannot be enumerated in
/// a static model list, so this provider skips the membership check.
pub const OPAQUE_MODEL_PROVIDER: &str = "volcengine";

/// One incremental fragment of a streamed completion. A provider populates at
/// most one channel per delta; both may be absent on keep-alive chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDelta {
    pub reasoning: Option<String>,
    pub content: Option<String>,
}

impl RawDelta {
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            content: None,
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            reasoning: None,
            content: Some(text.into()),
        }
    }
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<RawDelta>> + Send>>;

/// Seam between the session orchestrator and whatever issues the provider
/// call. [`ProviderRegistry`] implements it over HTTP; [`MockBackend`] stands
/// in for tests and smoke runs.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// True iff `model` is a (delimiter-stripped) member of the provider's
    /// configured model list. An unknown provider is a configuration error.
    fn validate_model(&self, provider: &str, model: &str) -> Result<bool>;

    /// Issue the streaming chat call and return the decoded delta sequence.
    async fn stream_completion(
        &self,
        provider: &str,
        model: &str,
        messages: &[WireMessage],
    ) -> Result<DeltaStream>;
}

/// Named provider configurations plus a lazily built, cached client per
/// provider. Loaded once at process start; read-only afterwards.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderSettings>,
    clients: RwLock<HashMap<String, Arc<ProviderClient>>>,
}

impl ProviderRegistry {
    pub fn new(providers: BTreeMap<String, ProviderSettings>) -> Self {
        Self {
            providers,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Load from `path`, or from the default candidate locations.
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        Ok(Self::new(load_provider_settings(path)?))
    }

    /// Read-only snapshot of the provider map.
    pub fn configs(&self) -> &BTreeMap<String, ProviderSettings> {
        &self.providers
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Model identifiers for a provider, display annotations stripped.
    pub fn models(&self, provider: &str) -> Result<Vec<String>> {
        let settings = self
            .providers
            .get(provider)
            .ok_or_else(|| unknown_provider(provider))?;
        Ok(settings
            .model_list
            .iter()
            .map(|entry| split_model_entry(entry).0.to_string())
            .collect())
    }

    /// Human-readable name for a model: the ` # annotation` from the model
    /// list when present, the identifier itself otherwise.
    pub fn display_name(&self, provider: &str, model: &str) -> String {
        self.providers
            .get(provider)
            .and_then(|settings| {
                settings.model_list.iter().find_map(|entry| {
                    let (id, name) = split_model_entry(entry);
                    (id == model).then(|| name.unwrap_or(id).to_string())
                })
            })
            .unwrap_or_else(|| model.to_string())
    }

    /// Cached client bound to the provider's endpoint and credential. The
    /// first call constructs and caches; later calls return the same instance.
    pub fn client(&self, provider: &str) -> Result<Arc<ProviderClient>> {
        if let Some(client) = self.clients.read().get(provider) {
            return Ok(client.clone());
        }
        let settings = self
            .providers
            .get(provider)
            .ok_or_else(|| unknown_provider(provider))?;
        if settings.key.trim().is_empty() {
            return Err(ChatError::Configuration(format!(
                "provider '{provider}' has an empty credential"
            )));
        }
        let mut clients = self.clients.write();
        let client = clients
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(ProviderClient::new(provider, settings)));
        Ok(client.clone())
    }
}

#[async_trait]
impl ChatBackend for ProviderRegistry {
    fn validate_model(&self, provider: &str, model: &str) -> Result<bool> {
        let settings = self
            .providers
            .get(provider)
            .ok_or_else(|| unknown_provider(provider))?;
        Ok(settings
            .model_list
            .iter()
            .any(|entry| split_model_entry(entry).0 == model))
    }

    async fn stream_completion(
        &self,
        provider: &str,
        model: &str,
        messages: &[WireMessage],
    ) -> Result<DeltaStream> {
        self.client(provider)?.stream_chat(model, messages).await
    }
}

fn unknown_provider(provider: &str) -> ChatError {
    ChatError::Configuration(format!("unknown provider '{provider}'"))
}

/// Split a model-list entry into the wire identifier and the optional display
/// annotation after the `#` delimiter.
fn split_model_entry(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once('#') {
        Some((id, name)) => (id.trim(), Some(name.trim())),
        None => (entry.trim(), None),
    }
}

/// HTTP client bound to one provider's endpoint and credential. Speaks the
/// OpenAI-compatible streaming chat-completions protocol.
#[derive(Debug)]
pub struct ProviderClient {
    provider: String,
    http: reqwest::Client,
    url: String,
    key: String,
}

impl ProviderClient {
    fn new(provider: &str, settings: &ProviderSettings) -> Self {
        Self {
            provider: provider.to_string(),
            http: reqwest::Client::new(),
            url: settings.url.trim_end_matches('/').to_string(),
            key: settings.key.clone(),
        }
    }

    pub async fn stream_chat(
        &self,
        model: &str,
        messages: &[WireMessage],
    ) -> Result<DeltaStream> {
        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ChatError::provider(&self.provider, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::provider(
                &self.provider,
                format!("HTTP {status}: {body}"),
            ));
        }

        let provider_for_io = self.provider.clone();
        let provider_for_decode = self.provider.clone();
        let stream = response
            .bytes_stream()
            .map(move |result| {
                result.map_err(|err| {
                    ChatError::provider(&provider_for_io, format!("stream error: {err}"))
                })
            })
            .scan(
                (String::new(), false),
                move |state: &mut (String, bool), result| {
                    let (buffer, done) = state;
                    if *done {
                        return futures::future::ready(None);
                    }
                    let bytes = match result {
                        Ok(bytes) => bytes,
                        Err(err) => return futures::future::ready(Some(vec![Err(err)])),
                    };
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    let mut deltas = Vec::new();
                    while let Some(line_end) = buffer.find('\n') {
                        let line = buffer[..line_end].trim().to_string();
                        buffer.drain(..=line_end);

                        if line.is_empty() || line.starts_with(':') {
                            continue;
                        }
                        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                            continue;
                        };
                        if data == "[DONE]" {
                            *done = true;
                            break;
                        }
                        match serde_json::from_str::<ChatCompletionChunk>(data) {
                            Ok(chunk) => {
                                let Some(choice) = chunk.choices.into_iter().next() else {
                                    continue;
                                };
                                let delta = choice.delta;
                                let raw = if delta.reasoning_content.is_some() {
                                    RawDelta {
                                        reasoning: delta.reasoning_content,
                                        content: None,
                                    }
                                } else {
                                    RawDelta {
                                        reasoning: None,
                                        content: delta.content,
                                    }
                                };
                                if raw.reasoning.is_some() || raw.content.is_some() {
                                    deltas.push(Ok(raw));
                                }
                            }
                            Err(err) => deltas.push(Err(ChatError::provider(
                                &provider_for_decode,
                                format!("malformed delta: {err}"),
                            ))),
                        }
                    }
                    futures::future::ready(Some(deltas))
                },
            )
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Scripted backend for tests and the xtask smoke run: replays a fixed delta
/// sequence, optionally failing partway through.
#[derive(Debug, Default)]
pub struct MockBackend {
    deltas: Vec<RawDelta>,
    fail_after: Option<usize>,
    stall: bool,
}

impl MockBackend {
    pub fn scripted(deltas: Vec<RawDelta>) -> Self {
        Self {
            deltas,
            fail_after: None,
            stall: false,
        }
    }

    /// Yield the first `fail_after` deltas, then a provider error.
    pub fn failing_after(deltas: Vec<RawDelta>, fail_after: usize) -> Self {
        Self {
            deltas,
            fail_after: Some(fail_after),
            stall: false,
        }
    }

    /// Yield the script, then keep the stream open forever.
    pub fn stalling(deltas: Vec<RawDelta>) -> Self {
        Self {
            deltas,
            fail_after: None,
            stall: true,
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn validate_model(&self, _provider: &str, _model: &str) -> Result<bool> {
        Ok(true)
    }

    async fn stream_completion(
        &self,
        provider: &str,
        _model: &str,
        _messages: &[WireMessage],
    ) -> Result<DeltaStream> {
        let take = self.fail_after.unwrap_or(self.deltas.len());
        let mut items: Vec<Result<RawDelta>> = self
            .deltas
            .iter()
            .take(take)
            .cloned()
            .map(Ok)
            .collect();
        if self.fail_after.is_some() {
            items.push(Err(ChatError::provider(provider, "mock stream failure")));
        }
        let replay = futures::stream::iter(items);
        if self.stall {
            Ok(Box::pin(replay.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(replay))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated_registry() -> ProviderRegistry {
        let mut providers = BTreeMap::new();
        providers.insert(
            "p".to_string(),
            ProviderSettings {
                url: "https://example.com/v1".to_string(),
                key: "sk-test".to_string(),
                model_list: vec!["m1".to_string(), "m2 # Pretty Two".to_string()],
            },
        );
        ProviderRegistry::new(providers)
    }

    #[test]
    fn validates_annotated_model_entries() {
        let registry = annotated_registry();
        assert!(registry.validate_model("p", "m1").unwrap());
        assert!(registry.validate_model("p", "m2").unwrap());
        assert!(!registry.validate_model("p", "m3").unwrap());
    }

    #[test]
    fn display_name_comes_from_annotation() {
        let registry = annotated_registry();
        assert_eq!(registry.display_name("p", "m2"), "Pretty Two");
        assert_eq!(registry.display_name("p", "m1"), "m1");
    }

    #[test]
    fn models_are_stripped_of_annotations() {
        let registry = annotated_registry();
        assert_eq!(registry.models("p").unwrap(), vec!["m1", "m2"]);
    }

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let registry = annotated_registry();
        let err = registry.validate_model("nope", "m1").unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
    }

    #[test]
    fn client_construction_is_idempotent() {
        let registry = annotated_registry();
        let first = registry.client("p").expect("client");
        let second = registry.client("p").expect("client");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_credential_fails_client_construction() {
        let mut providers = BTreeMap::new();
        providers.insert(
            "p".to_string(),
            ProviderSettings {
                url: "https://example.com/v1".to_string(),
                key: "  ".to_string(),
                model_list: vec![],
            },
        );
        let registry = ProviderRegistry::new(providers);
        let err = registry.client("p").unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
    }

    #[tokio::test]
    async fn mock_backend_replays_script() {
        let backend = MockBackend::scripted(vec![
            RawDelta::reasoning("hmm"),
            RawDelta::content("hi"),
        ]);
        let mut stream = backend.stream_completion("mock", "m", &[]).await.unwrap();
        let mut collected = Vec::new();
        while let Some(delta) = stream.next().await {
            collected.push(delta.unwrap());
        }
        assert_eq!(
            collected,
            vec![RawDelta::reasoning("hmm"), RawDelta::content("hi")]
        );
    }

    #[tokio::test]
    async fn mock_backend_fails_partway() {
        let backend = MockBackend::failing_after(vec![RawDelta::content("He")], 1);
        let mut stream = backend.stream_completion("mock", "m", &[]).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(ChatError::Provider { .. })
        ));
        assert!(stream.next().await.is_none());
    }
}
