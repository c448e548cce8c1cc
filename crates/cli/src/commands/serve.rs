//! `disha serve` — Start the HTTP API server.

use crate::runtime::{CliResult, build_service, load_config};
use std::path::Path;

pub async fn run(config_path: &Path, port: Option<u16>, ephemeral: bool) -> CliResult {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    println!("🩺 Disha Gateway");
    println!("   Listening: http://{addr}");
    println!("   Provider:  {} ({})", config.provider.kind, config.provider.model_name());
    if ephemeral {
        println!("   Storage:   in-memory (nothing is kept after exit)");
    } else {
        println!("   Storage:   {}", config.database.url);
    }

    let service = build_service(config, ephemeral).await?;
    if !service.check_provider().await {
        println!("   ⚠️  Provider did not answer its health check, replies may fall back");
    }
    disha_gateway::serve(service, &addr).await?;
    Ok(())
}
