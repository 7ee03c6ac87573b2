// src/cli/status.rs — Runtime status display

use crate::core::runtime::Runtime;
use crate::infra::config::Config;
use crate::infra::paths;

/// Display configuration, loaded plugins and their health.
pub fn show_status(runtime: &Runtime, config: &Config, json: bool) -> anyhow::Result<()> {
    let health = runtime.manager().health_report();

    if json {
        let plugins: Vec<_> = health
            .iter()
            .map(|(name, status)| serde_json::json!({"plugin": name, "health": status}))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "plugins_dir": runtime.manager().dir(),
                "classifier": runtime.router().has_classifier(),
                "plugins": plugins,
                "statistics": runtime.statistics(),
            }))?
        );
        return Ok(());
    }

    println!("switchboard v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config_path = paths::config_file_path();
    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }
    println!("  Plugins:    {}", runtime.manager().dir().display());

    match &config.classifier {
        Some(c) => {
            let key = if c.api_key().is_some() { "key set" } else { "no key" };
            println!("  Classifier: {} @ {} ({key})", c.model, c.base_url);
        }
        None => println!("  Classifier: (none, keyword routing only)"),
    }
    println!(
        "  Routing:    threshold {:.2}, {} keyword rules",
        config.router.confidence_threshold,
        config.router.keywords.len()
    );
    println!(
        "  Watcher:    {} (debounce {}ms)",
        if config.watcher.enabled { "enabled" } else { "disabled" },
        config.watcher.debounce_ms
    );

    println!();
    if health.is_empty() {
        println!("  No plugins loaded.");
    } else {
        println!("  Loaded ({}):", health.len());
        for (name, status) in &health {
            println!("    {name:<16} {status}");
        }
    }

    let manager = runtime.manager();
    let failed: Vec<_> = manager
        .discover()
        .into_iter()
        .filter(|c| !manager.contains(&c.name))
        .collect();
    if !failed.is_empty() {
        println!();
        println!("  Not loaded:");
        for c in &failed {
            println!("    {:<16} {}", c.name, c.path.display());
        }
    }

    Ok(())
}
