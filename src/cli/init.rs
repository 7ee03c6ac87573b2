// src/cli/init.rs — First-time setup

use std::path::Path;

use crate::infra::paths;

const SAMPLE_PLUGIN_FILE: &str = "echo_plugin.rhai";

const SAMPLE_PLUGIN: &str = r#"// Sample plugin. Files named <name>_plugin.rhai are picked up automatically
// and reloaded whenever they change.

fn description() { "Echoes the request back" }
fn version() { "0.1.0" }
fn capabilities() { ["echo"] }

fn handle(query, context) {
    log("echo plugin handling: " + query);
    #{ success: true, message: "You said: " + query }
}
"#;

/// Create directories and, if the plugin directory is empty, a sample plugin.
pub async fn run_init(plugins_dir: &Path) -> anyhow::Result<()> {
    println!("switchboard setup");
    println!();

    eprint!("  Creating directories... ");
    paths::ensure_dirs(plugins_dir).await?;
    eprintln!("done");

    let sample = plugins_dir.join(SAMPLE_PLUGIN_FILE);
    if has_scripts(plugins_dir)? {
        println!("  Plugins:  {} (already populated)", plugins_dir.display());
    } else {
        eprint!("  Writing sample plugin... ");
        tokio::fs::write(&sample, SAMPLE_PLUGIN).await?;
        eprintln!("done");
        println!("  Plugin:   {}", sample.display());
    }

    let config_path = paths::config_file_path();
    if config_path.exists() {
        println!("  Config:   {} (already exists)", config_path.display());
    } else {
        println!("  Config:   {} (not created, defaults apply)", config_path.display());
    }

    println!();
    println!("Setup complete!");
    println!();
    println!("Tips:");
    println!("  switchboard \"hello there\"     Route one request");
    println!("  switchboard list              Show loaded plugins");
    println!("  switchboard serve             Interactive mode with hot reload");

    Ok(())
}

fn has_scripts(dir: &Path) -> anyhow::Result<bool> {
    let mut entries = std::fs::read_dir(dir)?;
    Ok(entries.any(|e| {
        e.map(|e| e.path().extension().is_some_and(|x| x == "rhai"))
            .unwrap_or(false)
    }))
}
