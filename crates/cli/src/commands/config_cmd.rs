//! `disha config` — Configuration management commands.

use crate::runtime::{CliResult, load_config};
use disha_config::AppConfig;
use std::path::Path;

pub fn show(config_path: &Path) -> CliResult {
    let mut config = load_config(config_path)?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(config_path: &Path) {
    let marker = if config_path.exists() { "" } else { " (not created yet)" };
    println!("{}{marker}", config_path.display());
}

pub fn print_default() {
    println!("{}", AppConfig::default_toml());
}

pub fn validate(config_path: &Path) -> CliResult {
    println!("🔍 Validating configuration...");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {} ({})", config.provider.kind, config.provider.model_name());
    println!("   Database:  {}", config.database.url);
    println!(
        "   Gateway:   {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "   Context:   {} tokens, {} reserved for the reply",
        config.context.max_context_tokens, config.context.max_response_tokens
    );
    println!(
        "   Memory:    extract every {} messages, recall top {}",
        config.memory.extraction_interval, config.memory.top_k
    );

    Ok(())
}

/// Problems that are legal but probably unintended.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() && config.provider.kind != disha_config::ProviderKind::Demo {
        warnings.push("No API key set (set DISHA_API_KEY or the vendor variable)");
    }
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0, reachable from other machines");
    }
    if config.memory.top_k == 0 {
        warnings.push("memory.top_k is 0, no memories will be recalled");
    }
    if config.context.history_fetch_limit == 0 {
        warnings.push("context.history_fetch_limit is 0, replies will ignore earlier messages");
    }
    warnings
}
