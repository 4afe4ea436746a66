use super::scan::find_string_value;
use crate::provider::{messages_json, CatalogSpec, Provider, RequestSpec};
use anyhow::Context;
use reqwest::Url;
use serde::Serialize;
use serde_json::value::RawValue;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Provider-shaped HTTP request, independent of the HTTP client that runs it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL without the query string (the Google API key travels there).
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: &'a RawValue,
    stream: bool,
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    max_tokens: u32,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl RequestBuilder {
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }

    pub fn chat(&self, spec: &RequestSpec) -> anyhow::Result<HttpRequest> {
        let messages = messages_json(&spec.messages).context("failed to serialize messages")?;
        self.chat_with_messages(spec.provider, &spec.endpoint, &spec.api_key, &spec.model, messages)
    }

    /// Build a streaming chat request from an already serialized
    /// `[{"role":..,"content":..}]` list.
    pub fn chat_with_messages(
        &self,
        provider: Provider,
        endpoint: &str,
        api_key: &str,
        model: &str,
        messages: String,
    ) -> anyhow::Result<HttpRequest> {
        let base = normalize_endpoint(endpoint);
        let mut headers = vec![("content-type", "application/json".to_string())];

        let (url, body) = match provider {
            Provider::OpenAi => {
                headers.push(("authorization", format!("Bearer {api_key}")));
                let url = parse_url(&format!("{base}chat/completions"))?;
                (url, self.json_body(model, None, messages)?)
            }
            Provider::Anthropic => {
                headers.extend(anthropic_headers(api_key));
                let url = parse_url(&format!("{base}messages"))?;
                (url, self.json_body(model, Some(self.max_tokens), messages)?)
            }
            Provider::Google => {
                let mut url = parse_url(&format!("{base}models/{model}:streamGenerateContent"))?;
                url.query_pairs_mut()
                    .append_pair("alt", "sse")
                    .append_pair("key", api_key);
                (url, google_contents(&messages))
            }
        };

        Ok(HttpRequest {
            method: Method::Post,
            url,
            headers,
            body: Some(body),
        })
    }

    pub fn models(&self, spec: &CatalogSpec) -> anyhow::Result<HttpRequest> {
        let base = normalize_endpoint(&spec.endpoint);
        let mut url = parse_url(&format!("{base}models"))?;
        let mut headers = Vec::new();

        match spec.provider {
            Provider::OpenAi => headers.push(("authorization", format!("Bearer {}", spec.api_key))),
            Provider::Anthropic => headers.extend(anthropic_headers(&spec.api_key)),
            Provider::Google => {
                url.query_pairs_mut().append_pair("key", &spec.api_key);
            }
        }

        Ok(HttpRequest {
            method: Method::Get,
            url,
            headers,
            body: None,
        })
    }

    fn json_body(&self, model: &str, max_tokens: Option<u32>, messages: String) -> anyhow::Result<String> {
        let messages = RawValue::from_string(messages).context("messages are not valid JSON")?;
        let body = ChatBody {
            model,
            max_tokens,
            messages: &messages,
            stream: true,
        };
        Ok(serde_json::to_string(&body)?)
    }
}

fn anthropic_headers(api_key: &str) -> [(&'static str, String); 2] {
    [
        ("x-api-key", api_key.to_string()),
        ("anthropic-version", ANTHROPIC_VERSION.to_string()),
    ]
}

/// Endpoint with exactly one trailing slash.
fn normalize_endpoint(endpoint: &str) -> String {
    format!("{}/", endpoint.trim().trim_end_matches('/'))
}

fn parse_url(s: &str) -> anyhow::Result<Url> {
    Url::parse(s).with_context(|| format!("invalid endpoint URL: {s}"))
}

/// Rewrite a serialized message list into Gemini `contents`.
///
/// Single permissive pass: each `"role"` is paired with the next `"content"`;
/// `assistant` becomes `model`, every other role becomes `user`. Content is
/// copied verbatim, so it stays escaped exactly as the caller serialized it.
fn google_contents(messages: &str) -> String {
    let mut body = String::from("{\"contents\":[");
    let mut pos = 0;
    let mut first = true;

    while let Some(role) = find_string_value(messages, "role", pos) {
        let Some(content) = find_string_value(messages, "content", role.end) else {
            break;
        };
        let role = if role.raw == "assistant" { "model" } else { "user" };

        if !first {
            body.push(',');
        }
        first = false;

        body.push_str("{\"role\":\"");
        body.push_str(role);
        body.push_str("\",\"parts\":[{\"text\":\"");
        body.push_str(content.raw);
        body.push_str("\"}]}");

        pos = content.end;
    }

    body.push_str("]}");
    body
}
