//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::repl::Repl;
use crate::stack;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Show tool arguments and step results as they run
    #[arg(long)]
    pub trace: bool,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let dispatch = stack::dispatch_loop(ctx)?;
    let mut repl = Repl::new(dispatch, args.trace, ctx.json_output)?;
    repl.run().await
}
