//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use anyhow::Result;
use console::{Style, style};
use futures::StreamExt;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use alpine_agent::{CancellationToken, Conversation, ToolDispatchLoop, TurnEvent};

use crate::render;

/// REPL state and configuration.
pub struct Repl {
    dispatch: ToolDispatchLoop,
    conversation: Conversation,
    editor: Editor<(), DefaultHistory>,
    trace: bool,
    json: bool,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(dispatch: ToolDispatchLoop, trace: bool, json: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            dispatch,
            conversation: Conversation::new(),
            editor,
            trace,
            json,
        })
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    if line.starts_with('/') {
                        match self.handle_slash_command(line) {
                            ControlFlow::Continue => continue,
                            ControlFlow::Exit => break,
                        }
                    }

                    if let Err(e) = self.send_message(line).await {
                        self.print_error(&format!("Error: {}", e));
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    /// Run one turn. Ctrl+C cancels it; a cancelled turn is not kept in
    /// the history.
    async fn send_message(&mut self, message: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let mut stream = self.dispatch.run_turn(&self.conversation, message, cancel);
        let quiet = !self.trace && !self.json;
        while let Some(event) = stream.next().await {
            match &event {
                TurnEvent::ToolStart { name, .. } if quiet => {
                    self.print_dim(&format!("[Running: {}]", name));
                    continue;
                }
                TurnEvent::ToolEnd { .. } | TurnEvent::Text { .. } if quiet => continue,
                _ => {}
            }

            render::print_event(&event, self.json)?;
            if let TurnEvent::Done { outcome } = event {
                self.conversation.push(message, outcome.advisory);
            }
        }
        watcher.abort();

        Ok(())
    }

    /// Handle a slash command.
    fn handle_slash_command(&mut self, input: &str) -> ControlFlow {
        let cmd = input[1..].split_whitespace().next().unwrap_or("");

        match cmd {
            "quit" | "q" | "exit" => {
                return ControlFlow::Exit;
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "new" => {
                self.conversation.clear();
                self.print_dim("Conversation cleared");
            }
            "history" => {
                if self.conversation.is_empty() {
                    self.print_dim("No exchanges yet");
                }
                for (i, exchange) in self.conversation.exchanges().iter().enumerate() {
                    println!("{}. {}", i + 1, exchange.user_message);
                }
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        ControlFlow::Continue
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Alpine Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Ask for a ski touring itinerary and press Enter.")
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Forget the conversation", style("/clear, /new").cyan());
        println!("  {}  - List previous questions", style("/history").cyan());
        println!();
        println!("{}", dim.apply_to("Keyboard shortcuts:"));
        println!("  {} - Cancel the running request", dim.apply_to("Ctrl+C"));
        println!("  {} - Exit the REPL", dim.apply_to("Ctrl+D"));
        println!();
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("alpine>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}
