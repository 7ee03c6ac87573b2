// src/main.rs — Switchboard entry point

use clap::Parser;

use switchboard::cli::{Cli, Commands};
use switchboard::core::runtime::Runtime;
use switchboard::infra::config::Config;
use switchboard::infra::logger;

#[tokio::main]
async fn main() {
    // Initialize logging (respects SWITCHBOARD_LOG / RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };
    if let Some(dir) = cli.plugins.clone() {
        config.plugins.dir = Some(dir);
    }

    // Init runs before plugins are loaded
    if let Some(Commands::Init) = &cli.command {
        return switchboard::cli::init::run_init(&config.plugins.resolved_dir()).await;
    }

    let mut runtime = Runtime::from_config(&config)?;

    match &cli.command {
        Some(Commands::List) => switchboard::cli::run::run_list(&runtime, cli.json),
        Some(Commands::Reload { name }) => {
            switchboard::cli::run::run_reload(&runtime, name.as_deref(), cli.json).await
        }
        Some(Commands::Status) => switchboard::cli::status::show_status(&runtime, &config, cli.json),
        Some(Commands::Serve) => {
            switchboard::cli::serve::run_serve(&mut runtime, config.watcher.enabled, cli.json).await
        }
        // Handled above
        Some(Commands::Init) => Ok(()),
        None => {
            let query = cli.query.join(" ");
            if query.trim().is_empty() {
                // No request: drop into the interactive loop
                return switchboard::cli::serve::run_serve(
                    &mut runtime,
                    config.watcher.enabled,
                    cli.json,
                )
                .await;
            }
            switchboard::cli::run::run_query(&runtime, &query, cli.context.as_deref(), cli.json)
                .await
        }
    }
}
