//! Interactive terminal host for an avatar session.
//!
//! Speaks a greeting once the session is ready, then reads commands line by
//! line: `next` speaks the next prompt of the configured list (wrapping around),
//! `status` prints the current state, `quit` closes the session, and any other
//! text is spoken as-is. Status changes reported by the session are printed as
//! they happen.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::core::avatar::{AvatarError, AvatarSession, LifecyclePhase};

/// One line of host input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Next,
    Status,
    Help,
    Quit,
    Say(String),
}

impl HostCommand {
    /// Parse an input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let command = match line.to_lowercase().as_str() {
            "next" | "n" => HostCommand::Next,
            "status" => HostCommand::Status,
            "help" | "?" => HostCommand::Help,
            "quit" | "exit" | "q" => HostCommand::Quit,
            _ => HostCommand::Say(line.to_string()),
        };
        Some(command)
    }
}

/// Prompt list walked by the `next` command.
#[derive(Debug, Clone)]
pub struct PromptCycle {
    prompts: Vec<String>,
    index: usize,
}

impl PromptCycle {
    pub fn new(prompts: Vec<String>) -> Self {
        Self { prompts, index: 0 }
    }

    /// The prompt `next` will speak.
    pub fn current(&self) -> Option<&str> {
        self.prompts.get(self.index).map(String::as_str)
    }

    /// Take the current prompt and move to the following one.
    pub fn advance(&mut self) -> Option<String> {
        let prompt = self.prompts.get(self.index)?.clone();
        self.index = (self.index + 1) % self.prompts.len();
        Some(prompt)
    }
}

/// Drives an [`AvatarSession`] from line-oriented input.
pub struct InteractiveHost {
    session: AvatarSession,
    greeting: String,
    prompts: PromptCycle,
}

impl InteractiveHost {
    /// Wrap `session` and register status printers on it.
    pub fn new(session: AvatarSession, config: HostConfig) -> Self {
        session.on_start_speaking(Arc::new(|| {
            Box::pin(async move {
                println!("Status: Speaking...");
            })
        }));
        session.on_stop_speaking(Arc::new(|| {
            Box::pin(async move {
                println!("Status: Idle.");
            })
        }));
        session.on_session_error(Arc::new(|message| {
            Box::pin(async move {
                println!("Status: {message}");
            })
        }));

        Self {
            session,
            greeting: config.greeting,
            prompts: PromptCycle::new(config.prompts),
        }
    }

    /// Start the session and serve commands from `input` until it ends, the
    /// session fails, `quit` is entered or the process is interrupted. The
    /// session is always closed on return.
    pub async fn run<R>(&mut self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.session.set_prompt(&self.greeting).await?;

        println!("Status: Initializing...");
        self.session
            .start()
            .await
            .map_err(|e| anyhow!("Session did not start: {e}"))?;
        self.print_next_prompt();

        let result = self.serve(input).await;
        self.session.close().await;
        println!("Status: Disconnected.");
        result
    }

    async fn serve<R>(&mut self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut phases = self.session.subscribe_phase();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("Input closed");
                        return Ok(());
                    };
                    let Some(command) = HostCommand::parse(&line) else {
                        continue;
                    };
                    if !self.handle(command).await {
                        return Ok(());
                    }
                }
                changed = phases.changed() => {
                    if changed.is_err() || *phases.borrow() == LifecyclePhase::Disconnected {
                        info!("Session ended");
                        return Ok(());
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    return Ok(());
                }
            }
        }
    }

    /// Returns `false` when the host should stop.
    async fn handle(&mut self, command: HostCommand) -> bool {
        match command {
            HostCommand::Quit => return false,
            HostCommand::Help => {
                println!("Commands: next | status | quit | <any text to speak>");
            }
            HostCommand::Status => {
                println!(
                    "Status: {} ({})",
                    self.session.phase(),
                    self.session.speaking_state()
                );
            }
            HostCommand::Next => {
                let Some(prompt) = self.prompts.advance() else {
                    println!("No prompts configured");
                    return true;
                };
                self.say(&prompt).await;
                self.print_next_prompt();
            }
            HostCommand::Say(text) => self.say(&text).await,
        }
        true
    }

    async fn say(&self, text: &str) {
        match self.session.set_prompt(text).await {
            Ok(()) => {}
            Err(AvatarError::Busy) => println!("Avatar is already speaking, please wait."),
            Err(AvatarError::NotReady) => println!("Session is not ready."),
            Err(e) => warn!("Text was not sent: {}", e),
        }
    }

    fn print_next_prompt(&self) {
        if let Some(prompt) = self.prompts.current() {
            println!("Next question: {prompt}");
        }
    }
}
