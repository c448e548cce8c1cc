//! `disha protocols` — List the protocol registry.

use crate::runtime::{CliResult, load_config, read_only_service};
use std::path::Path;

pub async fn run(config_path: &Path) -> CliResult {
    let config = load_config(config_path)?;
    let service = read_only_service(config).await?;
    let protocols = service.protocols().await?;

    if protocols.is_empty() {
        println!("No protocols. Run `disha init-db` to seed the built-in set.");
        return Ok(());
    }

    println!("📋 {} protocol(s)", protocols.len());
    println!();
    for protocol in &protocols {
        println!(
            "  {:>2}  {:<22} [{}]  {}",
            protocol.priority,
            protocol.name,
            protocol.category,
            protocol.keywords.join(", ")
        );
    }
    Ok(())
}
