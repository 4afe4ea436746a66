/// Failures surfaced to the listener as `ClientEvent::Error`.
///
/// The `Display` text is exactly what the listener receives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed - check your API key and network connection")]
    Transport,

    #[error("Failed to fetch models - check your API key and endpoint")]
    CatalogTransport,

    #[error("Request timed out - no response from the provider")]
    Timeout,

    #[error("Provider returned HTTP {0}")]
    HttpStatus(u16),

    /// Message text extracted from the provider's own error payload.
    #[error("{0}")]
    Api(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// How a transport finished delivering one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Finished { status: u16 },
    Failed(ClientError),
}

impl Completion {
    #[cfg(test)]
    pub fn ok() -> Self {
        Completion::Finished { status: 200 }
    }
}

/// Help sentence for common provider error texts.
///
/// Matches whole words and phrases, so "generate" is not a rate limit.
pub fn error_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    let word = |w: &str| words.iter().any(|x| *x == w);
    let phrase = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if phrase(&["api key", "api_key", "x-api-key"])
        || ["unauthorized", "authentication_error", "401", "403"].iter().any(|w| word(w))
    {
        Some("Please check your API key in the config file or environment.")
    } else if phrase(&["rate limit", "rate_limit", "too many requests"])
        || ["quota", "429"].iter().any(|w| word(w))
    {
        Some("You may have exceeded your API rate limit or quota.")
    } else if ((word("model") || word("models"))
        && (phrase(&["does not exist", "not found", "not available", "not supported"])
            || word("not_found_error")))
        || word("404")
    {
        Some("The selected model may not be available. Try `llmchat models`.")
    } else if word("network") || word("connection") || phrase(&["timed out", "failed to fetch"]) {
        Some("Please check your internet connection.")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_listener_text() {
        assert_eq!(
            ClientError::Transport.to_string(),
            "Request failed - check your API key and network connection"
        );
        assert_eq!(ClientError::Api("Overloaded".into()).to_string(), "Overloaded");
        assert_eq!(ClientError::HttpStatus(503).to_string(), "Provider returned HTTP 503");
    }

    #[test]
    fn hints_follow_error_text() {
        assert!(error_hint("Incorrect API key provided").unwrap().contains("API key"));
        assert!(error_hint("The model `gpt-9` does not exist").unwrap().contains("model"));
        assert!(error_hint("Rate limit reached for requests").unwrap().contains("rate limit"));
        assert!(error_hint(&ClientError::Transport.to_string()).is_some());
        assert_eq!(error_hint("Overloaded"), None);
    }

    #[test]
    fn hints_ignore_partial_words() {
        assert_eq!(error_hint("Could not generate an accurate answer"), None);
        assert_eq!(error_hint("The model is overloaded"), None);
        assert!(error_hint("You exceeded your current quota for this model")
            .unwrap()
            .contains("rate limit"));
        assert!(error_hint("model: claude-9 (not_found_error)").unwrap().contains("model"));
        assert!(error_hint(&ClientError::Timeout.to_string())
            .unwrap()
            .contains("internet"));
    }
}
