//! `disha history` — Print a user's recent messages, oldest first.

use crate::runtime::{CliResult, load_config, read_only_service};
use std::path::Path;

pub async fn run(config_path: &Path, user: &str, limit: usize) -> CliResult {
    let config = load_config(config_path)?;
    let service = read_only_service(config).await?;
    let page = service.history(user, None, limit).await?;

    if page.messages.is_empty() {
        println!("No messages for {user}.");
        return Ok(());
    }

    println!(
        "💬 Last {} of {} message(s) for {user}",
        page.messages.len(),
        page.total
    );
    println!();
    for message in page.messages.iter().rev() {
        println!(
            "  [{}] {:>9} > {}",
            message.created_at.format("%Y-%m-%d %H:%M"),
            message.role.as_str(),
            message.content
        );
    }
    Ok(())
}
