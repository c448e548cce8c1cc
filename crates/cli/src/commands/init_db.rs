//! `disha init-db` — Create the database and seed protocols.

use crate::runtime::{CliResult, load_config, read_only_service};
use std::path::Path;

pub async fn run(config_path: &Path) -> CliResult {
    let config = load_config(config_path)?;
    println!("🗄️  Initializing database at {}", config.database.url);

    let service = read_only_service(config).await?;
    let inserted = service.seed_protocols().await?;
    let total = service.protocols().await?.len();

    println!("   ✅ Tables ready");
    println!("   ✅ {inserted} protocol(s) inserted, {total} total");
    Ok(())
}
