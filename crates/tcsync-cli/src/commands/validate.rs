//! Validate command implementation.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tcsync::SyncConfig;

/// Load a game table and print a summary of it.
pub fn run(config_path: &Path) -> Result<()> {
    let config = SyncConfig::load(config_path)
        .with_context(|| format!("Invalid game table {}", config_path.display()))?;
    print!("{}", summary(&config));
    println!("{}", "Game table is valid".green().bold());
    Ok(())
}

fn summary(config: &SyncConfig) -> String {
    let mut out = String::new();
    let name = if config.game.name.is_empty() {
        "(unnamed)"
    } else {
        config.game.name.as_str()
    };
    out.push_str(&format!("=== {} ===\n", name.bold()));

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for def in config.effects.iter() {
        *kinds.entry(def.effect.kind()).or_default() += 1;
    }
    out.push_str(&format!("Capabilities: {}\n", config.effects.len()));
    for (kind, count) in &kinds {
        out.push_str(&format!("  {:<12} {}\n", kind, count));
    }

    out.push_str(&format!("Regions: {}\n", config.regions.len()));
    for region in &config.regions {
        out.push_str(&format!(
            "  {:<16} {:#010X} {:>4} bytes, {:>4} owned bits\n",
            region.name(),
            region.offset(),
            region.len(),
            region.owned_bit_count()
        ));
    }

    out.push_str(&format!("Areas: {}\n", config.areas.len()));
    out.push_str(&format!("Shops: {}\n", config.shops.len()));
    out.push_str(&format!(
        "Locations: {} in {} rules\n",
        config.location_count(),
        config.locations.len()
    ));
    for rule in &config.locations {
        out.push_str(&format!("  {:<16} {}\n", rule.name(), rule.locations().len()));
    }

    match &config.goal {
        Some(goal) => out.push_str(&format!(
            "Goal: {} capability counts, {} areas\n",
            goal.capabilities.len(),
            goal.areas.len()
        )),
        None => out.push_str(&format!("Goal: {}\n", "none".yellow())),
    }
    match &config.process {
        Some(process) => out.push_str(&format!(
            "Process: {} ({} known builds)\n",
            process.name,
            process.known_builds.len()
        )),
        None => out.push_str(&format!("Process: {}\n", "not configured".yellow())),
    }
    out
}
