//! Terminal output for turn events.

use anyhow::Result;
use console::{Style, style};

use alpine_agent::{Advisory, TurnEnd, TurnEvent, TurnOutcome};

/// Print one turn event. JSON mode writes the event as a single line.
pub fn print_event(event: &TurnEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    match event {
        TurnEvent::Text { content } => {
            println!("{}", dim.apply_to(content.trim()));
        }
        TurnEvent::ToolStart {
            ordinal,
            name,
            arguments,
            ..
        } => {
            println!(
                "{}",
                dim.apply_to(format!("[{}] {} {}", ordinal, name, arguments))
            );
        }
        TurnEvent::ToolEnd { record } => {
            let status = if record.succeeded() {
                "done".to_string()
            } else {
                format!("failed: {}", record.outcome.to_llm_content())
            };
            println!("{}", dim.apply_to(format!("[{}]", status)));
        }
        TurnEvent::Done { outcome } | TurnEvent::Cancelled { outcome } => {
            print_outcome(outcome);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    match outcome.end {
        TurnEnd::Answered => {}
        TurnEnd::StepBudgetExceeded => {
            let yellow = Style::new().yellow();
            println!(
                "{}",
                yellow.apply_to(format!("Stopped after {} tool calls", outcome.steps))
            );
        }
        TurnEnd::LlmFailure | TurnEnd::Cancelled => {
            let red = Style::new().red();
            println!("{}", red.apply_to("Error:"));
        }
    }
    print_advisory(&outcome.advisory);
}

/// Print the advisory message followed by its itineraries.
pub fn print_advisory(advisory: &Advisory) {
    println!();
    println!("{}", advisory.message);

    let itineraries = advisory.itineraries();
    if itineraries.is_empty() {
        println!();
        return;
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Itineraries").bold());
    for itinerary in itineraries {
        println!(
            "  {} {} {}",
            style(&itinerary.name).cyan(),
            dim.apply_to(format!("#{}", itinerary.route_id)),
            dim.apply_to(format!(
                "({:.4}, {:.4})",
                itinerary.start.lat(),
                itinerary.start.lon()
            ))
        );
        if !itinerary.detail_link.is_empty() {
            println!("    {}", itinerary.detail_link);
        }
    }
    println!();
}
