// src/lib.rs — Library root for Switchboard

pub mod cli;
pub mod core;
pub mod infra;
pub mod plugins;
pub mod provider;
