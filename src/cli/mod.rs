// src/cli/mod.rs — CLI definition (clap derive)

pub mod init;
pub mod run;
pub mod serve;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Route requests to hot-reloadable script plugins",
    version
)]
pub struct Cli {
    /// Request to route (default command when no subcommand given)
    #[arg(trailing_var_arg = true)]
    pub query: Vec<String>,

    /// JSON context passed to plugins that accept one
    #[arg(long)]
    pub context: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    /// Plugin directory (overrides config)
    #[arg(long)]
    pub plugins: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List loaded plugins
    List,
    /// Reload one plugin, or all of them
    Reload {
        /// Plugin to reload; all plugins when omitted
        name: Option<String>,
    },
    /// Show configuration, plugin health and load errors
    Status,
    /// Interactive loop with hot reload enabled
    Serve,
    /// Create directories and a sample plugin
    Init,
}
