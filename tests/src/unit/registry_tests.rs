use ponder_core::error::ChatError;
use ponder_core::llm::{ChatBackend, ProviderRegistry};
use ponder_core::state::ChatSession;
use std::io::Write;
use std::sync::Arc;

const SAMPLE_CONFIG: &str = r#"
providers:
  deepseek:
    url: https://api.deepseek.com/v1
    key: ${PONDER_TESTS_DEEPSEEK_KEY}
    model_list:
      - deepseek-chat
      - "deepseek-reasoner # DeepSeek R1"
  volcengine:
    url: https://ark.cn-beijing.volces.com/api/v3
    key: literal-ark-key
    model_list: []
"#;

fn write_config() -> tempfile::NamedTempFile {
    std::env::set_var("PONDER_TESTS_DEEPSEEK_KEY", "sk-tests");
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    file.write_all(SAMPLE_CONFIG.as_bytes()).expect("write config");
    file
}

#[test]
fn registry_loads_from_a_config_file() {
    let file = write_config();
    let registry = ProviderRegistry::from_file(Some(file.path())).expect("registry");

    assert_eq!(registry.provider_names(), vec!["deepseek", "volcengine"]);
    assert_eq!(registry.configs()["deepseek"].key, "sk-tests");
    assert_eq!(
        registry.models("deepseek").unwrap(),
        vec!["deepseek-chat", "deepseek-reasoner"]
    );
    assert_eq!(
        registry.display_name("deepseek", "deepseek-reasoner"),
        "DeepSeek R1"
    );
}

#[test]
fn validate_model_strips_display_annotations() {
    let file = write_config();
    let registry = ProviderRegistry::from_file(Some(file.path())).expect("registry");

    assert!(registry.validate_model("deepseek", "deepseek-reasoner").unwrap());
    assert!(!registry.validate_model("deepseek", "DeepSeek R1").unwrap());
    assert!(matches!(
        registry.validate_model("unknown", "m"),
        Err(ChatError::Configuration(_))
    ));
}

#[test]
fn sessions_veto_unlisted_models_except_for_opaque_deployments() {
    let file = write_config();
    let registry = Arc::new(ProviderRegistry::from_file(Some(file.path())).expect("registry"));
    let session = ChatSession::new(registry);

    let err = session.select_model("deepseek", "made-up-model").unwrap_err();
    assert!(matches!(err, ChatError::Configuration(_)));

    // Ark deployment ids are not enumerable in advance, so any id is accepted.
    session
        .select_model("volcengine", "ep-20250207110456-k72nb")
        .expect("opaque deployment id accepted");
}

#[test]
fn missing_config_file_is_a_configuration_error() {
    let err = ProviderRegistry::from_file(Some(std::path::Path::new(
        "/definitely/not/a/real/providers.yaml",
    )))
    .unwrap_err();
    assert!(matches!(err, ChatError::Configuration(_)));
}
