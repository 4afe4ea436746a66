use super::decoder::GENERIC_API_ERROR;
use super::scan::{find_string_value, string_values};
use crate::provider::Provider;

const OPENAI_CHAT_MARKERS: [&str; 4] = ["gpt", "o1", "o3", "chatgpt"];

/// Error message carried by a model-list body, if the body is an error document.
pub fn api_error(body: &str) -> Option<String> {
    if !body.contains("\"error\"") {
        return None;
    }
    let message = find_string_value(body, "message", 0)
        .map(|found| found.unescaped())
        .unwrap_or_else(|| GENERIC_API_ERROR.to_string());
    Some(message)
}

/// Chat-capable model ids in order of appearance. Duplicates are kept.
pub fn model_ids(provider: Provider, body: &str) -> Vec<String> {
    match provider {
        Provider::OpenAi => string_values(body, "id")
            .map(|f| f.unescaped())
            .filter(|id| OPENAI_CHAT_MARKERS.iter().any(|m| id.contains(m)))
            .collect(),
        Provider::Anthropic => string_values(body, "id")
            .map(|f| f.unescaped())
            .filter(|id| id.contains("claude"))
            .collect(),
        Provider::Google => string_values(body, "name")
            .map(|f| {
                let name = f.unescaped();
                match name.strip_prefix("models/") {
                    Some(rest) => rest.to_string(),
                    None => name,
                }
            })
            .filter(|name| name.contains("gemini"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_filter_keeps_chat_models_in_order() {
        let body = r#"{"object":"list","data":[
            {"id":"gpt-4","object":"model","owned_by":"openai"},
            {"id":"text-embedding-3","object":"model"},
            {"id":"o1-preview","object":"model"}
        ]}"#;
        assert_eq!(model_ids(Provider::OpenAi, body), vec!["gpt-4", "o1-preview"]);
    }

    #[test]
    fn openai_keeps_duplicates() {
        let body = r#"{"data":[{"id":"gpt-4o"},{"id":"dall-e-3"},{"id":"gpt-4o"},{"id":"chatgpt-4o-latest"}]}"#;
        assert_eq!(
            model_ids(Provider::OpenAi, body),
            vec!["gpt-4o", "gpt-4o", "chatgpt-4o-latest"]
        );
    }

    #[test]
    fn anthropic_filter() {
        let body = r#"{"data":[{"type":"model","id":"claude-sonnet-4-20250514","display_name":"Claude Sonnet 4"},{"type":"model","id":"other"}],"has_more":false,"first_id":"claude-sonnet-4-20250514"}"#;
        assert_eq!(
            model_ids(Provider::Anthropic, body),
            vec!["claude-sonnet-4-20250514"]
        );
    }

    #[test]
    fn google_strips_prefix_and_filters() {
        let body = r#"{"models":[
            {"name":"models/gemini-2.0-flash","displayName":"Gemini 2.0 Flash"},
            {"name":"models/embedding-001","displayName":"Embedding 001"},
            {"name":"gemini-pro"}
        ],"nextPageToken":"abc"}"#;
        assert_eq!(
            model_ids(Provider::Google, body),
            vec!["gemini-2.0-flash", "gemini-pro"]
        );
    }

    #[test]
    fn malformed_body_returns_what_was_collected() {
        let body = r#"{"data":[{"id":"gpt-4"},{"id":"gpt-3.5-tur"#;
        assert_eq!(model_ids(Provider::OpenAi, body), vec!["gpt-4"]);
        assert!(model_ids(Provider::OpenAi, "").is_empty());
    }

    #[test]
    fn error_document_is_detected() {
        let body = r#"{"error":{"message":"Incorrect API key provided: sk-xx","type":"invalid_request_error"}}"#;
        assert_eq!(
            api_error(body).as_deref(),
            Some("Incorrect API key provided: sk-xx")
        );
        assert_eq!(
            api_error(r#"{"error":{"code":401}}"#).as_deref(),
            Some(GENERIC_API_ERROR)
        );
        assert_eq!(api_error(r#"{"data":[]}"#), None);
    }
}
