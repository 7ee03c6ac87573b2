// src/cli/serve.rs — Interactive loop with hot reload

use crate::core::runtime::Runtime;

use super::run::{format_plugin_line, print_decision};

/// Read requests from stdin until EOF or `:quit`, watching the plugin
/// directory the whole time.
pub async fn run_serve(runtime: &mut Runtime, watch: bool, json: bool) -> anyhow::Result<()> {
    if watch {
        if let Err(e) = runtime.start_watching() {
            tracing::warn!("Hot reload disabled: {e}");
        }
    }

    eprintln!(
        "switchboard v{} | {} plugins | hot reload: {}\n",
        env!("CARGO_PKG_VERSION"),
        runtime.list_plugins().len(),
        if runtime.is_watching() { "on" } else { "off" },
    );

    loop {
        let Some(input) = tokio::task::spawn_blocking(read_input).await? else {
            break;
        };
        let trimmed = input.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with(':') {
            if !handle_command(trimmed, runtime).await {
                break;
            }
            continue;
        }

        let decision = runtime.route(trimmed, None).await;
        if json {
            println!("{}", serde_json::to_string(&decision)?);
        } else {
            print_decision(&decision);
        }
    }

    runtime.shutdown().await;
    Ok(())
}

/// Returns `false` when the loop should end.
async fn handle_command(input: &str, runtime: &Runtime) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        ":quit" | ":exit" | ":q" => return false,
        ":list" => {
            for p in runtime.list_plugins() {
                eprintln!("{}", format_plugin_line(&p));
            }
        }
        ":reload" if arg.is_empty() => match runtime.reload_all().await {
            Ok(summary) => {
                eprintln!("Reloaded {}/{} plugins", summary.loaded.len(), summary.total());
                for (name, error) in &summary.failed {
                    eprintln!("  {name}: {error}");
                }
            }
            Err(e) => eprintln!("Reload failed: {e}"),
        },
        ":reload" => match runtime.reload_one(arg).await {
            Ok(d) => eprintln!("Reloaded {} v{}", d.name, d.version),
            Err(e) => eprintln!("Reload failed: {e}"),
        },
        ":stats" => {
            let s = runtime.statistics();
            eprintln!(
                "requests: {} (classifier {}, fallback {}), empty: {}, uptime: {}s",
                s.total_requests,
                s.classifier_routing_requests,
                s.fallback_routing_requests,
                s.empty_requests,
                s.uptime_secs
            );
            for (name, c) in &s.plugins {
                eprintln!("  {name:<16} {} calls, {} errors", c.invocations, c.errors);
            }
        }
        ":help" => {
            eprintln!("  :list             Show loaded plugins");
            eprintln!("  :reload [name]    Reload one plugin, or all");
            eprintln!("  :stats            Usage statistics");
            eprintln!("  :quit             Exit");
        }
        _ => eprintln!("Unknown command: {cmd} (try :help)"),
    }
    true
}

fn read_input() -> Option<String> {
    use std::io::{self, BufRead, Write};

    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) => None, // EOF
        Ok(_) => Some(line),
        Err(_) => None,
    }
}
