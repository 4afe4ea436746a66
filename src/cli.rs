use clap::{Parser, Subcommand};

/// Streaming chat client for OpenAI, Anthropic and Google compatible APIs
#[derive(Debug, Parser)]
#[command(name = "llmchat")]
#[command(version)]
#[command(about = "Streaming LLM chat client", long_about = None)]
pub struct Args {
    /// Provider: openai, anthropic or google (default: config/provider or "openai")
    #[arg(short = 'p', long = "provider", global = true)]
    pub provider: Option<String>,

    /// API base URL, e.g. https://api.openai.com/v1
    #[arg(long = "endpoint", global = true)]
    pub endpoint: Option<String>,

    /// API key (default: provider env var, then config file)
    #[arg(long = "api-key", global = true)]
    pub api_key: Option<String>,

    /// Model name
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// System prompt prepended to the conversation
    #[arg(short = 's', long = "system", global = true)]
    pub system: Option<String>,

    /// max_tokens for Anthropic requests
    #[arg(long = "max-tokens", global = true)]
    pub max_tokens: Option<u32>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch and print the provider's chat models
    Models,

    /// Run an interactive terminal chat UI
    #[cfg(feature = "tui")]
    Tui,
}
