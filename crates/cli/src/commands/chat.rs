//! `disha chat` — Interactive or single-message chat in the terminal.

use crate::runtime::{CliResult, build_service, load_config};
use disha_coach::{ChatOutcome, ChatService};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: &Path,
    user: &str,
    message: Option<String>,
    ephemeral: bool,
) -> CliResult {
    let config = load_config(config_path)?;
    let provider_label = format!("{} ({})", config.provider.kind, config.provider.model_name());
    let service = build_service(config, ephemeral).await?;

    if let Some(text) = message {
        eprint!("  Thinking...");
        let result = service.send_message(user, &text).await;
        eprint!("\r              \r");
        print_outcome(&result?);
        service.drain_extractions().await;
        return Ok(());
    }

    let onboarded = service.get_or_create_user(user).await?.onboarding_completed;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Disha — Interactive Chat            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  User:      {user}");
    println!("  Provider:  {provider_label}");
    if !onboarded {
        println!("  Profile:   not onboarded yet, Disha will ask a few questions");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    interactive(&service, user).await?;
    service.drain_extractions().await;

    println!();
    println!("  Take care! 👋");
    println!();
    Ok(())
}

async fn interactive(service: &ChatService, user: &str) -> CliResult {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
            break;
        }
        if !text.is_empty() {
            eprint!("  ...");
            let result = service.send_message(user, text).await;
            eprint!("\r     \r");
            match result {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => eprintln!("  [Error] {e}"),
            }
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_outcome(outcome: &ChatOutcome) {
    println!();
    for line in outcome.reply.lines() {
        println!("  Disha > {line}");
    }
    if !outcome.context.protocols_used.is_empty() {
        println!("          (protocols: {})", outcome.context.protocols_used.join(", "));
    }
    if !outcome.persisted {
        println!("          (not saved, the model did not answer)");
    }
    println!();
}
