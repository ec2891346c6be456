// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pullchat::terminal::TerminalApp;
use pullchat::{BackendConfig, ContextPolicy, OllamaClient, SessionController};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "pullchat")]
#[command(version = VERSION)]
#[command(about = "Pull an Ollama model, then chat with it.")]
struct Cli {
    /// Ollama server address (overrides OLLAMA_HOST)
    #[arg(long, value_name = "URL")]
    host: Option<String>,

    /// Model to pull first, skipping the initial prompt
    #[arg(short, long)]
    model: Option<String>,

    /// Send earlier turns along with each message
    #[arg(long)]
    keep_context: bool,

    /// Verbose logging to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match cli.host.as_deref() {
        Some(host) => BackendConfig::with_host(host),
        None => BackendConfig::from_env(),
    };
    tracing::debug!(base_url = %config.base_url, "Using Ollama endpoint");

    // The blocking HTTP client owns its own runtime; build it before ours.
    let backend = Arc::new(OllamaClient::new(config).context("Failed to create Ollama client")?);
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let _enter = runtime.enter();

    let (controller, queue) = SessionController::with_queue(backend);
    if cli.keep_context {
        controller.set_context_policy(ContextPolicy::Conversation);
    }

    let mut app = TerminalApp::new(controller, queue, runtime.handle().clone())
        .context("Failed to initialize terminal")?;
    app.run(cli.model)
}
