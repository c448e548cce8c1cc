//! `disha memories` — Print what is remembered about a user.

use crate::runtime::{CliResult, load_config, read_only_service};
use std::path::Path;

pub async fn run(config_path: &Path, user: &str) -> CliResult {
    let config = load_config(config_path)?;
    let min_importance = config.memory.min_importance;
    let service = read_only_service(config).await?;
    let memories = service.memories(user).await?;

    if memories.is_empty() {
        println!("No memories for {user} yet.");
        return Ok(());
    }

    println!("🧠 {} memory(ies) for {user}", memories.len());
    println!();
    for memory in &memories {
        let marker = if memory.importance.get() >= min_importance {
            "★"
        } else {
            " "
        };
        println!(
            "  {marker} [{}] {:<16} {}: {}",
            memory.importance.get(),
            memory.category.as_str(),
            memory.key,
            memory.value
        );
    }
    println!();
    println!("  ★ = recalled into prompts (importance ≥ {min_importance})");
    Ok(())
}
