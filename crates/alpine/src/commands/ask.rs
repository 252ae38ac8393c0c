//! Ask command - one-shot question to the advisor.

use anyhow::Result;
use clap::Args;
use console::Style;
use futures::StreamExt;

use alpine_agent::{CancellationToken, Conversation, TurnEnd};

use super::Context;
use crate::render;
use crate::stack;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question, e.g. "a route near Chamonix for tomorrow"
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let dispatch = stack::dispatch_loop(ctx)?;
    let query = args.query.join(" ");

    if ctx.verbose > 0 && !ctx.json_output {
        let dim = Style::new().dim();
        println!(
            "{}",
            dim.apply_to(format!(
                "Model: {} | language: {}",
                dispatch.config().model,
                ctx.language.name()
            ))
        );
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut stream = dispatch.run_turn(&Conversation::new(), &query, cancel);
    let mut end = None;
    while let Some(event) = stream.next().await {
        render::print_event(&event, ctx.json_output)?;
        if let Some(outcome) = event.outcome() {
            end = Some(outcome.end);
        }
    }
    watcher.abort();

    match end {
        Some(TurnEnd::LlmFailure) => anyhow::bail!("the language model request failed"),
        Some(TurnEnd::Cancelled) => anyhow::bail!("interrupted"),
        _ => Ok(()),
    }
}
