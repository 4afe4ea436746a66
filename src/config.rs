use crate::client::ClientSettings;
use crate::provider::Provider;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Provider used when `--provider` is not given.
    pub provider: Option<Provider>,

    /// `max_tokens` for Anthropic-compatible requests.
    pub max_tokens: Option<u32>,

    pub request_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,

    /// Prepended to every conversation as a system message.
    pub system_prompt: Option<String>,

    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub google: ProviderConfig,
}

/// Per-provider table, e.g. `[anthropic]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    pub fn provider_table(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::Google => &self.google,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        let defaults = ClientSettings::default();
        ClientSettings {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            idle_timeout: self
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: Config = toml::from_str(
            r#"
provider = "claude"
max_tokens = 1024
idle_timeout_secs = 10
system_prompt = "Be brief."

[anthropic]
api_key = "sk-ant"
model = "claude-3-haiku"

[google]
endpoint = "http://localhost:8080/v1beta"
"#,
        )
        .unwrap();

        assert_eq!(cfg.provider, Some(Provider::Anthropic));
        assert_eq!(cfg.provider_table(Provider::Anthropic).api_key.as_deref(), Some("sk-ant"));
        assert_eq!(
            cfg.provider_table(Provider::Google).endpoint.as_deref(),
            Some("http://localhost:8080/v1beta")
        );
        assert!(cfg.provider_table(Provider::OpenAi).model.is_none());

        let settings = cfg.client_settings();
        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.idle_timeout, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.provider.is_none());
        assert_eq!(cfg.client_settings().max_tokens, 4096);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("llmchat-missing-dir").join("config.toml");
        assert!(Config::load_optional(path).unwrap().is_none());
    }
}
