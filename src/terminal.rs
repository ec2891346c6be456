// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Interactive terminal front-end.
//!
//! A thin presentation over [`SessionController`]: it reads input with
//! rustyline, issues controller calls, and renders whatever arrives on the
//! [`EventQueue`]. Typing `exit` or `quit` at the chat prompt returns to
//! model selection; at the model prompt it ends the program. A failed chat
//! turn also returns to model selection.

use std::io::{self, Write};

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::controller::{DownloadAxis, SessionController};
use crate::error::{format_error, SessionError, CHAT_FAILED_HINT, DOWNLOAD_FAILED_HINT};
use crate::session::{ChatEvent, DownloadEvent, SessionEvent};
use crate::sink::{coalesce_deltas, DeltaBuffer, EventQueue};

const MODEL_PROMPT: &str =
    "Enter the Ollama model name you want to use (e.g., 'llama3.2' or 'codellama:7b-code'): ";
const CHAT_PROMPT: &str = "Enter your message (or type 'exit' to quit): ";

/// True for the words that leave the current prompt.
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Permanent line printed for a download event, if it gets one.
/// `Progress` only updates the spinner.
pub fn download_line(event: &DownloadEvent, model: &str) -> Option<String> {
    match event {
        DownloadEvent::Progress { .. } => None,
        DownloadEvent::LayerDone { layer_id } => {
            Some(format!("Download complete for layer: {}", layer_id))
        }
        DownloadEvent::Ready => Some("Pull complete.".to_string()),
        DownloadEvent::AlreadyAvailable => {
            Some(format!("Model '{}' is already available locally.", model))
        }
        DownloadEvent::Failed { message } => Some(message.clone()),
    }
}

/// Where the chat loop goes once a turn has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterTurn {
    /// Prompt for the next message.
    NextMessage,
    /// Back to the model prompt.
    ChooseModel,
}

impl AfterTurn {
    /// Next step after `event`; `None` while the reply is still streaming.
    pub fn after(event: &ChatEvent) -> Option<Self> {
        match event {
            ChatEvent::Delta { .. } => None,
            ChatEvent::Done { .. } => Some(Self::NextMessage),
            ChatEvent::Failed { .. } => Some(Self::ChooseModel),
        }
    }
}

/// One-line report for a rejected controller call. Guard rejections are
/// warnings (`[!]`); anything else is an error (`[✗]`).
pub fn rejection_line(err: &SessionError) -> String {
    if err.is_guard_violation() {
        format!("[!] {}", err)
    } else {
        format!("[✗] {}", err)
    }
}

fn print_rejection(err: &SessionError) {
    let line = rejection_line(err);
    if err.is_guard_violation() {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.red());
    }
}

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

/// The interactive download-then-chat loop.
pub struct TerminalApp {
    controller: SessionController,
    queue: EventQueue,
    runtime: Handle,
    editor: DefaultEditor,
}

impl TerminalApp {
    /// `runtime` must be the runtime the controller's workers run on.
    pub fn new(controller: SessionController, queue: EventQueue, runtime: Handle) -> Result<Self> {
        Ok(Self {
            controller,
            queue,
            runtime,
            editor: DefaultEditor::new()?,
        })
    }

    /// Run until the user exits. `initial_model` skips the first model prompt.
    pub fn run(&mut self, initial_model: Option<String>) -> Result<()> {
        if let Err(e) = self.controller.check_backend() {
            tracing::warn!(error = %e, "Backend check failed");
            eprintln!(
                "{}",
                format_error(
                    &e.to_string(),
                    &[],
                    &["Start Ollama: ollama serve", "Point OLLAMA_HOST at a running server"],
                )
                .yellow()
            );
        }

        let mut pending_model = initial_model;
        loop {
            println!("{}", "-".repeat(30));
            let model = match pending_model.take() {
                Some(model) => model,
                None => match self.read_line(MODEL_PROMPT)? {
                    Some(line) => line,
                    None => break,
                },
            };
            let model = model.trim().to_string();

            if is_exit_command(&model) {
                break;
            }
            if model.is_empty() {
                println!("Please enter a model name.");
                continue;
            }

            match self.controller.request_download(&model) {
                Ok(worker) => {
                    self.follow_download(&model)?;
                    self.reap(worker);
                }
                Err(e) => {
                    print_rejection(&e);
                    continue;
                }
            }

            if self.controller.download_axis() != DownloadAxis::Ready {
                continue;
            }
            if !self.chat_loop()? {
                break;
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Chat until `exit` or a failed turn. Returns false when input is closed.
    fn chat_loop(&mut self) -> Result<bool> {
        loop {
            println!();
            let line = match self.read_line(CHAT_PROMPT)? {
                Some(line) => line,
                None => return Ok(false),
            };
            let text = line.trim();

            if is_exit_command(text) {
                return Ok(true);
            }
            if text.is_empty() {
                continue;
            }

            match self.controller.send_message(text) {
                Ok(worker) => {
                    let next = self.follow_chat()?;
                    self.reap(worker);
                    if next == AfterTurn::ChooseModel {
                        return Ok(true);
                    }
                }
                Err(e) => print_rejection(&e),
            }
        }
    }

    fn follow_download(&mut self, model: &str) -> Result<()> {
        let spinner = spinner::create(&format!("Requesting '{}'...", model));

        loop {
            let batch = self.next_batch();
            if batch.is_empty() {
                spinner.finish_and_clear();
                return Ok(());
            }

            for event in batch {
                let SessionEvent::Download(event) = event else {
                    continue;
                };
                let line = download_line(&event, model);
                match event {
                    DownloadEvent::Progress { message } => spinner.set_message(message),
                    DownloadEvent::LayerDone { .. } => {
                        if let Some(line) = line {
                            spinner.println(format!("{} {}", "[✓]".green(), line));
                        }
                    }
                    DownloadEvent::Ready | DownloadEvent::AlreadyAvailable => {
                        spinner.finish_and_clear();
                        if let Some(line) = line {
                            println!("{} {}", "[✓]".green(), line);
                        }
                        return Ok(());
                    }
                    DownloadEvent::Failed { message } => {
                        spinner.finish_and_clear();
                        eprintln!("{}", format_error(&message, &[], &[DOWNLOAD_FAILED_HINT]).red());
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Print the reply in batches of at least 100 characters.
    fn follow_chat(&mut self) -> Result<AfterTurn> {
        let mut stdout = io::stdout();
        let mut pending = DeltaBuffer::default();
        write!(stdout, "{} ", "Assistant:".bright_cyan().bold())?;
        stdout.flush()?;

        loop {
            let batch = self.next_batch();
            if batch.is_empty() {
                if let Some(text) = pending.flush() {
                    write!(stdout, "{}", text)?;
                }
                writeln!(stdout)?;
                return Ok(AfterTurn::ChooseModel);
            }

            for event in batch {
                let SessionEvent::Chat(event) = event else {
                    continue;
                };
                let next = AfterTurn::after(&event);
                let text = match &event {
                    ChatEvent::Delta { fragment } => pending.push(fragment),
                    ChatEvent::Done { .. } | ChatEvent::Failed { .. } => pending.flush(),
                };
                if let Some(text) = text {
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }

                if let ChatEvent::Failed { message } = &event {
                    writeln!(stdout)?;
                    let title = format!("Error during chat session: {}", message);
                    eprintln!("{}", format_error(&title, &[], &[CHAT_FAILED_HINT]).red());
                } else if next.is_some() {
                    writeln!(stdout)?;
                }

                if let Some(next) = next {
                    return Ok(next);
                }
            }
        }
    }

    /// Wait for at least one event, then take everything else already queued.
    fn next_batch(&mut self) -> Vec<SessionEvent> {
        let Some(first) = self.runtime.block_on(self.queue.recv()) else {
            return Vec::new();
        };
        let mut batch = vec![first];
        batch.extend(self.queue.drain());
        coalesce_deltas(batch)
    }

    fn reap<T>(&self, worker: JoinHandle<T>) {
        if let Err(e) = self.runtime.block_on(worker) {
            tracing::warn!(error = %e, "Session worker did not finish cleanly");
        }
    }

    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
