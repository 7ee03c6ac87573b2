// src/core/mod.rs — Routing and runtime context

pub mod classifier;
pub mod router;
pub mod runtime;
pub mod stats;
pub mod types;
