use crate::error::{ChatError, Result};
use directories::BaseDirs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// One provider definition from `providers.yaml`, with the credential already
/// resolved. Loaded once at startup and treated as read-only afterwards.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub url: String,
    pub key: String,
    /// Permitted model identifiers. Entries may carry a ` # display name`
    /// annotation, used only for display and stripped before wire use.
    pub model_list: Vec<String>,
}

/// Load provider settings from `path`, or from the first existing candidate
/// location when no path is given.
pub fn load_provider_settings(path: Option<&Path>) -> Result<BTreeMap<String, ProviderSettings>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => locate_config_file().ok_or_else(|| {
            ChatError::Configuration(
                "no providers.yaml found; create config/providers.yaml with provider credentials"
                    .to_string(),
            )
        })?,
    };
    let contents = fs::read_to_string(&path).map_err(|err| {
        ChatError::Configuration(format!("failed to read {}: {err}", path.display()))
    })?;
    parse_provider_settings(&contents)
}

pub fn parse_provider_settings(contents: &str) -> Result<BTreeMap<String, ProviderSettings>> {
    let raw: RawProvidersFile = serde_yaml::from_str(contents)
        .map_err(|err| ChatError::Configuration(format!("invalid providers.yaml: {err}")))?;
    let sections = raw.providers.ok_or_else(|| {
        ChatError::Configuration("missing `providers` section in providers.yaml".to_string())
    })?;

    let mut settings = BTreeMap::new();
    for (name, section) in sections {
        let endpoint = section.url.trim().to_string();
        if endpoint.is_empty() {
            return Err(ChatError::Configuration(format!(
                "missing url for provider '{name}'"
            )));
        }
        Url::parse(&endpoint).map_err(|err| {
            ChatError::Configuration(format!("invalid url for provider '{name}': {err}"))
        })?;
        let key = resolve_secret(&section.key, &name)?;
        settings.insert(
            name,
            ProviderSettings {
                url: endpoint,
                key,
                model_list: section.model_list,
            },
        );
    }
    Ok(settings)
}

/// Resolve a `${VAR}` environment indirection in a credential field.
///
/// Resolution happens once, at load time; an unset or empty target fails the
/// whole load rather than deferring the error to the first request.
fn resolve_secret(raw: &str, provider: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Configuration(format!(
            "missing key for provider '{provider}'"
        )));
    }
    let resolved = match trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(var) => std::env::var(var).map_err(|_| {
            ChatError::Configuration(format!(
                "environment variable {var} is not set for provider '{provider}'"
            ))
        })?,
        None => trimmed.to_string(),
    };
    if resolved.trim().is_empty() {
        return Err(ChatError::Configuration(format!(
            "key for provider '{provider}' resolved to an empty value"
        )));
    }
    Ok(resolved)
}

fn locate_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|path| path.exists())
}

fn config_candidates() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("config/providers.yaml"),
        PathBuf::from("providers.yaml"),
    ];
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("ponder");
        paths.push(config_dir.join("providers.yaml"));
        paths.push(config_dir.join("providers.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct RawProvidersFile {
    providers: Option<BTreeMap<String, RawProviderSection>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProviderSection {
    #[serde(default)]
    url: String,
    #[serde(default)]
    key: String,
    #[serde(default)]
    model_list: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_keys_and_model_lists() {
        let yaml = r#"
providers:
  deepseek:
    url: https://api.deepseek.com/v1
    key: sk-literal
    model_list:
      - deepseek-chat
      - deepseek-reasoner
"#;
        let settings = parse_provider_settings(yaml).expect("settings");
        let deepseek = settings.get("deepseek").expect("deepseek entry");
        assert_eq!(deepseek.url, "https://api.deepseek.com/v1");
        assert_eq!(deepseek.key, "sk-literal");
        assert_eq!(deepseek.model_list.len(), 2);
    }

    #[test]
    fn resolves_env_indirection() {
        std::env::set_var("PONDER_TEST_KEY_RESOLVES", "sk-from-env");
        let yaml = r#"
providers:
  openai:
    url: https://api.openai.com/v1
    key: ${PONDER_TEST_KEY_RESOLVES}
    model_list: [gpt-4o]
"#;
        let settings = parse_provider_settings(yaml).expect("settings");
        assert_eq!(settings["openai"].key, "sk-from-env");
    }

    #[test]
    fn errors_when_env_target_is_unset() {
        std::env::remove_var("PONDER_TEST_KEY_MISSING");
        let yaml = r#"
providers:
  openai:
    url: https://api.openai.com/v1
    key: ${PONDER_TEST_KEY_MISSING}
    model_list: [gpt-4o]
"#;
        let err = parse_provider_settings(yaml).unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(err.to_string().contains("PONDER_TEST_KEY_MISSING"));
    }

    #[test]
    fn errors_on_missing_url() {
        let yaml = r#"
providers:
  broken:
    key: sk-x
    model_list: [m]
"#;
        let err = parse_provider_settings(yaml).unwrap_err();
        assert!(err.to_string().contains("missing url"));
    }

    #[test]
    fn errors_on_invalid_url() {
        let yaml = r#"
providers:
  broken:
    url: not a url
    key: sk-x
    model_list: [m]
"#;
        let err = parse_provider_settings(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid url"));
    }
}
