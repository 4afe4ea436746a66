mod app;
mod cli;
mod client;
mod config;
mod paths;
mod protocol;
mod provider;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;
use client::{ReqwestTransport, Transport};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the response text; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let cfg = config::Config::load_optional(&config_path)?;
    tracing::debug!(?config_path, loaded = cfg.is_some(), "resolved config");

    let resolved = app::resolve(&args, cfg.as_ref())?;
    tracing::debug!(
        provider = %resolved.provider,
        endpoint = %resolved.endpoint,
        model = %resolved.model,
        "resolved connection"
    );

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(resolved.settings.request_timeout)
        .build()
        .context("failed to build HTTP client")?;
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(http));

    match args.cmd {
        Some(cli::Command::Models) => {
            return app::run_models(transport, &resolved, &mut std::io::stdout()).await;
        }
        #[cfg(feature = "tui")]
        Some(cli::Command::Tui) => {
            return tui::run_tui(transport, resolved, cfg).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: llmchat \"Hello\", `llmchat models` or `llmchat tui` (feature flag)");
    }

    app::run_chat(transport, &resolved, prompt, &mut std::io::stdout()).await
}
