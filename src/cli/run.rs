// src/cli/run.rs — One-shot commands: route, list, reload

use crate::core::runtime::Runtime;
use crate::core::types::{RouteOutcome, RoutingDecision};
use crate::plugins::PluginDescriptor;

/// Route a single request and print the outcome.
pub async fn run_query(
    runtime: &Runtime,
    query: &str,
    context: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let context = parse_context(context)?;
    let decision = runtime.route(query, context).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        print_decision(&decision);
    }

    if decision.outcome == RouteOutcome::NoPluginAvailable {
        anyhow::bail!(
            "no plugins loaded from {} (run `switchboard init`)",
            runtime.manager().dir().display()
        );
    }
    Ok(())
}

pub fn parse_context(raw: Option<&str>) -> anyhow::Result<Option<serde_json::Value>> {
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(s).map_err(|e| anyhow::anyhow!("invalid --context JSON: {e}"))?,
        )),
        None => Ok(None),
    }
}

pub fn print_decision(decision: &RoutingDecision) {
    match decision.outcome {
        RouteOutcome::EmptyRequest => {
            eprintln!("(empty request)");
            return;
        }
        RouteOutcome::NoPluginAvailable => {
            eprintln!("No plugin available.");
            return;
        }
        RouteOutcome::Handled => {}
    }

    let plugin = decision.plugin.as_deref().unwrap_or("-");
    let method = decision.method.map(|m| m.as_str()).unwrap_or("-");
    match decision.confidence {
        Some(c) => eprintln!("[{plugin} via {method}, confidence {c:.2}]"),
        None => eprintln!("[{plugin} via {method}]"),
    }

    if decision.result.success {
        println!("{}", decision.result.message);
    } else {
        println!("error: {}", decision.result.message);
    }
    if !decision.result.data.is_null() {
        if let Ok(pretty) = serde_json::to_string_pretty(&decision.result.data) {
            println!("{pretty}");
        }
    }
}

pub fn run_list(runtime: &Runtime, json: bool) -> anyhow::Result<()> {
    let plugins = runtime.list_plugins();
    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }
    if plugins.is_empty() {
        println!("No plugins loaded from {}", runtime.manager().dir().display());
        return Ok(());
    }
    for p in &plugins {
        println!("{}", format_plugin_line(p));
    }
    Ok(())
}

pub fn format_plugin_line(p: &PluginDescriptor) -> String {
    let mut line = format!("  {:<16} v{:<8} {}", p.name, p.version, p.description);
    if !p.capabilities.is_empty() {
        line.push_str(&format!(" [{}]", p.capabilities.join(", ")));
    }
    line.trim_end().to_string()
}

pub async fn run_reload(runtime: &Runtime, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    match name {
        Some(name) => {
            let descriptor = runtime.reload_one(name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            } else {
                println!("Reloaded {} v{}", descriptor.name, descriptor.version);
            }
        }
        None => {
            let summary = runtime.reload_all().await?;
            if json {
                let failed: Vec<_> = summary
                    .failed
                    .iter()
                    .map(|(name, error)| serde_json::json!({"plugin": name, "error": error}))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "loaded": summary.loaded,
                        "failed": failed,
                    }))?
                );
            } else {
                println!("Reloaded {}/{} plugins", summary.loaded.len(), summary.total());
                for (name, error) in &summary.failed {
                    println!("  {name}: {error}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context() {
        assert_eq!(parse_context(None).unwrap(), None);
        let ctx = parse_context(Some(r#"{"user":"ana"}"#)).unwrap().unwrap();
        assert_eq!(ctx["user"], "ana");
        assert!(parse_context(Some("{not json")).is_err());
    }

    #[test]
    fn test_format_plugin_line() {
        let p = PluginDescriptor::named("task")
            .with_description("Tracks tasks")
            .with_capabilities(&["create", "list"]);
        let line = format_plugin_line(&p);
        assert!(line.starts_with("  task"));
        assert!(line.contains("v0.1.0"));
        assert!(line.ends_with("Tracks tasks [create, list]"));
    }
}
