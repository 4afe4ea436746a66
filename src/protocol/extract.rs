use super::scan::find_string_value;
use crate::provider::Provider;

const DATA_PREFIX: &str = "data: ";
const EVENT_PREFIX: &str = "event: ";

/// Event label carried between Anthropic `event:` and `data:` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnthropicState {
    pub event: String,
}

/// Per-provider text delta extraction for one decoded SSE line.
#[derive(Debug, Clone)]
pub enum ChunkExtractor {
    OpenAi,
    Anthropic(AnthropicState),
    Google,
}

impl ChunkExtractor {
    pub fn new(provider: Provider) -> Self {
        match provider {
            Provider::OpenAi => ChunkExtractor::OpenAi,
            Provider::Anthropic => ChunkExtractor::Anthropic(AnthropicState::default()),
            Provider::Google => ChunkExtractor::Google,
        }
    }

    pub fn extract(&mut self, line: &str) -> Option<String> {
        match self {
            ChunkExtractor::OpenAi => openai_delta(line),
            ChunkExtractor::Anthropic(state) => anthropic_delta(line, state),
            ChunkExtractor::Google => google_delta(line),
        }
    }
}

/// `data: {"choices":[{"delta":{"content":"..."}}]}`; `data: [DONE]` ends the stream.
pub fn openai_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    if data == "[DONE]" {
        return None;
    }
    let delta_pos = data.find("\"delta\"")?;
    let found = find_string_value(data, "content", delta_pos)?;
    non_empty(found.unescaped())
}

/// Named-event framing: only `data:` lines following `event: content_block_delta`
/// carry text.
pub fn anthropic_delta(line: &str, state: &mut AnthropicState) -> Option<String> {
    if let Some(event) = line.strip_prefix(EVENT_PREFIX) {
        state.event = event.trim().to_string();
        return None;
    }
    let data = line.strip_prefix(DATA_PREFIX)?;
    if state.event != "content_block_delta" {
        return None;
    }
    let found = find_string_value(data, "text", 0)?;
    non_empty(found.unescaped())
}

/// `data: {"candidates":[{"content":{"parts":[{"text":"..."}]}}]}`
pub fn google_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    let found = find_string_value(data, "text", 0)?;
    non_empty(found.unescaped())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(openai_delta(line).as_deref(), Some("Hi"));
    }

    #[test]
    fn openai_done_and_role_only_chunks_yield_nothing() {
        assert_eq!(openai_delta("data: [DONE]"), None);
        assert_eq!(
            openai_delta(r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#),
            None
        );
        assert_eq!(
            openai_delta(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
    }

    #[test]
    fn openai_ignores_content_before_delta_and_non_data_lines() {
        let line = r#"data: {"content":"nope","choices":[{"delta":{"content":"yes"}}]}"#;
        assert_eq!(openai_delta(line).as_deref(), Some("yes"));
        assert_eq!(openai_delta(": keep-alive"), None);
        assert_eq!(openai_delta(r#"{"choices":[{"delta":{"content":"x"}}]}"#), None);
    }

    #[test]
    fn openai_null_content_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"content":null,"tool_calls":[]}}]}"#;
        assert_eq!(openai_delta(line), None);
    }

    #[test]
    fn anthropic_text_only_after_content_block_delta() {
        let mut st = AnthropicState::default();
        assert_eq!(anthropic_delta("event: content_block_delta", &mut st), None);
        assert_eq!(st.event, "content_block_delta");
        assert_eq!(
            anthropic_delta(r#"data: {"delta":{"text":"Hi"}}"#, &mut st).as_deref(),
            Some("Hi")
        );

        assert_eq!(anthropic_delta("event: message_stop", &mut st), None);
        assert_eq!(
            anthropic_delta(r#"data: {"delta":{"text":"Hi"}}"#, &mut st),
            None
        );
    }

    #[test]
    fn anthropic_data_without_prior_event_is_ignored() {
        let mut st = AnthropicState::default();
        assert_eq!(
            anthropic_delta(r#"data: {"type":"content_block_delta","delta":{"text":"x"}}"#, &mut st),
            None
        );
    }

    #[test]
    fn anthropic_non_text_deltas_yield_nothing() {
        let mut st = AnthropicState {
            event: "content_block_delta".to_string(),
        };
        let line = r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"a\""}}"#;
        assert_eq!(anthropic_delta(line, &mut st), None);
    }

    #[test]
    fn google_text_part() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello\nworld"}],"role":"model"}}]}"#;
        assert_eq!(google_delta(line).as_deref(), Some("Hello\nworld"));
        assert_eq!(google_delta(r#"data: {"usageMetadata":{"totalTokenCount":3}}"#), None);
    }

    #[test]
    fn extractor_dispatches_by_provider() {
        let mut ex = ChunkExtractor::new(Provider::Anthropic);
        assert_eq!(ex.extract("event: content_block_delta"), None);
        assert_eq!(ex.extract(r#"data: {"delta":{"text":"a"}}"#).as_deref(), Some("a"));

        let mut ex = ChunkExtractor::new(Provider::Google);
        assert_eq!(ex.extract(r#"data: {"text":"b"}"#).as_deref(), Some("b"));

        let mut ex = ChunkExtractor::new(Provider::OpenAi);
        assert_eq!(ex.extract(r#"data: {"text":"b"}"#), None);
    }

    #[test]
    fn escaped_content_round_trips_through_extractor() {
        let original = "He said \"hi\"\nthen left\t! C:\\new";
        let escaped = serde_json::to_string(original).unwrap();
        let line = format!(r#"data: {{"choices":[{{"delta":{{"content":{escaped}}}}}]}}"#);
        assert_eq!(openai_delta(&line).as_deref(), Some(original));
    }
}
