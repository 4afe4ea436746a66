use super::extract::ChunkExtractor;
use super::scan::{contains_bytes, find_string_value, unescape, unterminated_string_value};
use crate::provider::Provider;

const ERROR_KEY: &[u8] = b"\"error\"";
const MESSAGE_KEY: &[u8] = b"\"message\"";

pub const GENERIC_API_ERROR: &str = "API returned an error - check your API key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Delta(String),
    /// Provider-reported error; the decoder accepts no further input.
    Error(String),
}

enum ErrorCheck {
    Clear,
    /// Both markers seen but the message value is still arriving.
    Pending,
    Found(String),
}

/// Incremental decoder for one streaming chat response.
///
/// Bytes may be split anywhere, including inside a line or a UTF-8 sequence;
/// only complete lines are decoded.
#[derive(Debug)]
pub struct StreamDecoder {
    extractor: ChunkExtractor,
    buf: Vec<u8>,
    error_key_seen: bool,
    cancelled: bool,
}

impl StreamDecoder {
    pub fn new(provider: Provider) -> Self {
        Self {
            extractor: ChunkExtractor::new(provider),
            buf: Vec::new(),
            error_key_seen: false,
            cancelled: false,
        }
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drop buffered input and ignore everything written afterwards.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.buf.clear();
    }

    pub fn write(&mut self, bytes: &[u8]) -> Vec<DecodeEvent> {
        let mut out = Vec::new();
        if self.cancelled {
            return out;
        }
        self.buf.extend_from_slice(bytes);

        match self.check_error() {
            ErrorCheck::Clear => {}
            ErrorCheck::Pending => return out,
            ErrorCheck::Found(message) => {
                tracing::warn!(%message, "provider returned an error in the response body");
                out.push(DecodeEvent::Error(message));
                self.cancel();
                return out;
            }
        }

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.decode_line(&line, &mut out);
        }
        out
    }

    /// Flush at end of body: decode a final unterminated line and resolve an
    /// error whose message never finished arriving.
    pub fn finish(&mut self) -> Vec<DecodeEvent> {
        let mut out = Vec::new();
        if self.cancelled {
            return out;
        }

        if self.has_error_markers() {
            let text = String::from_utf8_lossy(&self.buf);
            let message = match find_string_value(&text, "message", 0) {
                Some(found) => found.unescaped(),
                None => unterminated_string_value(&text, "message")
                    .map(unescape)
                    .unwrap_or_else(|| GENERIC_API_ERROR.to_string()),
            };
            tracing::warn!(%message, "provider returned an error in the response body");
            out.push(DecodeEvent::Error(message));
        } else if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.decode_line(&rest, &mut out);
        }

        self.cancel();
        out
    }

    fn has_error_markers(&self) -> bool {
        (self.error_key_seen || contains_bytes(&self.buf, ERROR_KEY))
            && contains_bytes(&self.buf, MESSAGE_KEY)
    }

    fn check_error(&self) -> ErrorCheck {
        if !self.has_error_markers() {
            return ErrorCheck::Clear;
        }
        let text = String::from_utf8_lossy(&self.buf);
        match find_string_value(&text, "message", 0) {
            Some(found) => ErrorCheck::Found(found.unescaped()),
            None => ErrorCheck::Pending,
        }
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<DecodeEvent>) {
        let text = String::from_utf8_lossy(raw);
        let line: String = text.chars().filter(|&c| c != '\r' && c != '\n').collect();
        if line.is_empty() {
            return;
        }
        if line.contains("\"error\"") {
            self.error_key_seen = true;
        }

        match self.extractor.extract(&line) {
            Some(delta) => out.push(DecodeEvent::Delta(delta)),
            None => tracing::trace!(%line, "no text delta in line"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(events: &[DecodeEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                DecodeEvent::Delta(d) => Some(d.as_str()),
                DecodeEvent::Error(_) => None,
            })
            .collect()
    }

    #[test]
    fn openai_stream_in_one_write() {
        let mut dec = StreamDecoder::new(Provider::OpenAi);
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let out = dec.write(body.as_bytes());
        assert_eq!(deltas(&out), vec!["Hel", "lo"]);
        assert!(dec.finish().is_empty());
    }

    #[test]
    fn line_split_mid_token_waits_for_newline() {
        let mut dec = StreamDecoder::new(Provider::OpenAi);
        assert!(dec.write(b"data: {\"choices\":[{\"del").is_empty());
        assert!(dec.write(b"ta\":{\"content\":\"Hi\"}}]}").is_empty());
        let out = dec.write(b"\r\n");
        assert_eq!(out, vec![DecodeEvent::Delta("Hi".to_string())]);
    }

    #[test]
    fn utf8_sequence_split_across_writes() {
        let mut dec = StreamDecoder::new(Provider::Google);
        let line = "data: {\"text\":\"caf\u{e9} \u{1F600}\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut out = dec.write(&line[..split]);
        out.extend(dec.write(&line[split..split + 6]));
        out.extend(dec.write(&line[split + 6..]));
        assert_eq!(deltas(&out), vec!["café 😀"]);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let mut dec = StreamDecoder::new(Provider::Anthropic);
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"content\":[]}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \\\"there\\\"\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let mut out = Vec::new();
        for b in body.as_bytes() {
            out.extend(dec.write(std::slice::from_ref(b)));
        }
        assert_eq!(deltas(&out), vec!["Hi \"there\""]);
    }

    #[test]
    fn anthropic_event_and_data_in_separate_writes() {
        let mut dec = StreamDecoder::new(Provider::Anthropic);
        assert!(dec.write(b"event: content_block_delta\n").is_empty());
        let out = dec.write(b"data: {\"delta\":{\"text\":\"Hi\"}}\n\n");
        assert_eq!(deltas(&out), vec!["Hi"]);

        assert!(dec.write(b"event: message_st").is_empty());
        assert!(dec.write(b"op\ndata: {\"delta\":{\"te").is_empty());
        assert!(dec.write(b"xt\":\"late\"}}\n").is_empty());
    }

    #[test]
    fn error_body_split_across_writes_short_circuits_once() {
        let mut dec = StreamDecoder::new(Provider::OpenAi);
        assert!(dec.write(b"{\"error\":{\"mess").is_empty());
        let out = dec.write(b"age\":\"Incorrect API key provided\",\"type\":\"invalid_request_error\"}}");
        assert_eq!(
            out,
            vec![DecodeEvent::Error("Incorrect API key provided".to_string())]
        );
        assert!(dec.is_cancelled());
        assert!(dec.write(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n").is_empty());
        assert!(dec.finish().is_empty());
    }

    #[test]
    fn pretty_printed_error_spanning_consumed_lines() {
        let mut dec = StreamDecoder::new(Provider::OpenAi);
        assert!(dec.write(b"{\n  \"error\": {\n").is_empty());
        let out = dec.write(b"    \"message\": \"The model `gpt-9` does not exist\",\n    \"code\": null\n  }\n}\n");
        assert_eq!(
            out,
            vec![DecodeEvent::Error("The model `gpt-9` does not exist".to_string())]
        );
    }

    #[test]
    fn anthropic_error_event_is_detected() {
        let mut dec = StreamDecoder::new(Provider::Anthropic);
        let out = dec.write(
            b"event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        assert_eq!(out, vec![DecodeEvent::Error("Overloaded".to_string())]);
    }

    #[test]
    fn unterminated_error_message_resolved_on_finish() {
        let mut dec = StreamDecoder::new(Provider::Google);
        assert!(dec.write(b"{\"error\":{\"code\":400,\"message\":\"API key not val").is_empty());
        assert_eq!(
            dec.finish(),
            vec![DecodeEvent::Error("API key not val".to_string())]
        );
    }

    #[test]
    fn message_key_without_error_decodes_normally() {
        let mut dec = StreamDecoder::new(Provider::Anthropic);
        let out = dec.write(
            b"event: message_start\ndata: {\"message\":{\"id\":\"m\"}}\nevent: content_block_delta\ndata: {\"delta\":{\"text\":\"ok\"}}\n",
        );
        assert_eq!(out, vec![DecodeEvent::Delta("ok".to_string())]);
    }

    #[test]
    fn finish_decodes_final_line_without_newline() {
        let mut dec = StreamDecoder::new(Provider::Google);
        assert!(dec.write(b"data: {\"text\":\"tail\"}").is_empty());
        assert_eq!(dec.finish(), vec![DecodeEvent::Delta("tail".to_string())]);
        assert!(dec.write(b"data: {\"text\":\"more\"}\n").is_empty());
    }

    #[test]
    fn cancel_discards_buffer_and_later_input() {
        let mut dec = StreamDecoder::new(Provider::OpenAi);
        assert!(dec.write(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"").is_empty());
        dec.cancel();
        assert!(dec.write(b"}}]}\n").is_empty());
        assert!(dec.finish().is_empty());
    }
}
