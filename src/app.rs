use crate::cli::Args;
use crate::client::{error_hint, ClientEvent, ClientSettings, Lane, LlmClient, Transport};
use crate::config::Config;
use crate::provider::{CatalogSpec, ChatMessage, Provider, RequestSpec, Role};
use anyhow::Context;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connection settings after applying CLI flags, environment, config file
/// and provider defaults, in that order.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub provider: Provider,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub settings: ClientSettings,
}

impl Resolved {
    pub fn chat_spec(&self, messages: Vec<ChatMessage>) -> RequestSpec {
        RequestSpec {
            provider: self.provider,
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            messages,
        }
    }

    pub fn catalog_spec(&self) -> CatalogSpec {
        CatalogSpec {
            provider: self.provider,
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
        }
    }

    /// Fresh conversation history: the system prompt, if any.
    pub fn new_history(&self) -> Vec<ChatMessage> {
        self.system_prompt
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| ChatMessage::new(Role::System, s.as_str()))
            .collect()
    }

    /// Point at another provider, taking its endpoint, key and model from
    /// config or defaults.
    pub fn switch_provider(&mut self, provider: Provider, cfg: Option<&Config>) {
        let table = cfg.map(|c| c.provider_table(provider));
        self.provider = provider;
        self.endpoint = table
            .and_then(|t| t.endpoint.clone())
            .unwrap_or_else(|| provider.default_endpoint().to_string());
        self.api_key = non_empty(std::env::var(provider.api_key_env()).ok())
            .or_else(|| table.and_then(|t| t.api_key.clone()))
            .unwrap_or_default();
        self.model = table
            .and_then(|t| t.model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());
    }
}

pub fn resolve(args: &Args, cfg: Option<&Config>) -> anyhow::Result<Resolved> {
    resolve_with(args, cfg, |name| std::env::var(name).ok())
}

fn resolve_with(
    args: &Args,
    cfg: Option<&Config>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Resolved> {
    let provider = match &args.provider {
        Some(name) => name.parse::<Provider>().context("invalid --provider")?,
        None => cfg.and_then(|c| c.provider).unwrap_or(Provider::OpenAi),
    };
    let table = cfg.map(|c| c.provider_table(provider));

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| table.and_then(|t| t.endpoint.clone()))
        .unwrap_or_else(|| provider.default_endpoint().to_string());

    let api_key = non_empty(args.api_key.clone())
        .or_else(|| non_empty(env(provider.api_key_env())))
        .or_else(|| table.and_then(|t| t.api_key.clone()))
        .unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(%provider, env = provider.api_key_env(), "no API key configured");
    }

    let model = args
        .model
        .clone()
        .or_else(|| table.and_then(|t| t.model.clone()))
        .unwrap_or_else(|| provider.default_model().to_string());

    let system_prompt = args
        .system
        .clone()
        .or_else(|| cfg.and_then(|c| c.system_prompt.clone()));

    let mut settings = cfg.map(Config::client_settings).unwrap_or_default();
    if let Some(max_tokens) = args.max_tokens {
        settings.max_tokens = max_tokens;
    }

    Ok(Resolved {
        provider,
        endpoint,
        api_key,
        model,
        system_prompt,
        settings,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Error text plus a help sentence when one applies.
pub fn describe_error(message: &str) -> String {
    match error_hint(message) {
        Some(hint) => format!("{message}\n{hint}"),
        None => message.to_string(),
    }
}

/// One-shot chat: stream the reply to `out`. Ctrl-C cancels the request.
pub async fn run_chat(
    transport: Arc<dyn Transport>,
    resolved: &Resolved,
    prompt: String,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (client, mut events) = LlmClient::spawn(transport, resolved.settings.clone());

    let mut messages = resolved.new_history();
    messages.push(ChatMessage::new(Role::User, prompt));
    client.send_chat(resolved.chat_spec(messages))?;

    let mut failure = None;
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ClientEvent::TextDelta(text)) => {
                    write!(out, "{text}").context("failed to write response")?;
                    out.flush().ok();
                }
                Some(ClientEvent::Error { message, .. }) => failure = Some(message),
                Some(ClientEvent::Done { lane: Lane::Chat }) | None => break,
                Some(_) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                client.cancel()?;
            }
        }
    }
    writeln!(out).ok();

    match failure {
        Some(message) => anyhow::bail!("{}", describe_error(&message)),
        None => Ok(()),
    }
}

/// Print the provider's chat model ids, one per line.
pub async fn run_models(
    transport: Arc<dyn Transport>,
    resolved: &Resolved,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (client, mut events) = LlmClient::spawn(transport, resolved.settings.clone());
    client.fetch_models(resolved.catalog_spec())?;

    let ids = wait_for_models(&mut events).await?;
    if ids.is_empty() {
        tracing::warn!(provider = %resolved.provider, "no chat models matched");
    }
    for id in ids {
        writeln!(out, "{id}").context("failed to write model list")?;
    }
    Ok(())
}

async fn wait_for_models(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> anyhow::Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut failure = None;
    while let Some(ev) = events.recv().await {
        match ev {
            ClientEvent::ModelsReceived(list) => ids = list,
            ClientEvent::Error { message, .. } => failure = Some(message),
            ClientEvent::Done { lane: Lane::Catalog } => break,
            _ => {}
        }
    }

    match failure {
        Some(message) => anyhow::bail!("{}", describe_error(&message)),
        None => Ok(ids),
    }
}
