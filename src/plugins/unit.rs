// src/plugins/unit.rs — Code units: compiled plugin sources keyed by path + generation
//
// A unit is the isolation boundary for hot reload. Reloading never mutates a
// unit; the old one is dropped from the cache and a new one is compiled from
// source with a fresh generation number.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rhai::{Engine, AST};
use sha2::{Digest, Sha256};

use crate::infra::errors::PluginError;

/// Fixed entry-point name every plugin script must define exactly once.
pub const ENTRY_POINT: &str = "handle";

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub path: PathBuf,
    pub generation: u64,
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.path.display(), self.generation)
    }
}

/// A compiled plugin source that passed the structural contract check.
pub struct CodeUnit {
    pub key: UnitKey,
    pub ast: AST,
    /// Hex SHA-256 of the source text.
    pub digest: String,
    /// Number of parameters of the `handle` entry point (1 or 2).
    pub handle_arity: usize,
}

impl CodeUnit {
    /// Read and compile the file at `path`, then check the contract.
    pub fn compile_file(engine: &Engine, path: &Path, name: &str) -> Result<Self, PluginError> {
        if !path.is_file() {
            return Err(PluginError::NotFound { name: name.into() });
        }
        let source = std::fs::read_to_string(path)?;
        Self::compile_source(engine, path, name, &source)
    }

    pub fn compile_source(
        engine: &Engine,
        path: &Path,
        name: &str,
        source: &str,
    ) -> Result<Self, PluginError> {
        let ast = engine
            .compile(source)
            .map_err(|e| PluginError::ContractViolation {
                name: name.into(),
                reason: format!("failed to compile {}: {e}", path.display()),
            })?;

        let handle_arity = locate_entry_point(&ast).map_err(|reason| {
            PluginError::ContractViolation {
                name: name.into(),
                reason,
            }
        })?;

        Ok(Self {
            key: UnitKey {
                path: path.to_path_buf(),
                generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            },
            ast,
            digest: hex::encode(Sha256::digest(source.as_bytes())),
            handle_arity,
        })
    }

    /// Whether the unit defines a script function `name` with `arity` params.
    pub fn defines(&self, name: &str, arity: usize) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }
}

/// Find the single `handle` definition and return its arity.
fn locate_entry_point(ast: &AST) -> Result<usize, String> {
    let arities: Vec<usize> = ast
        .iter_functions()
        .filter(|f| f.name == ENTRY_POINT)
        .map(|f| f.params.len())
        .collect();

    match arities.as_slice() {
        [] => Err(format!("no `{ENTRY_POINT}` function defined")),
        [arity @ (1 | 2)] => Ok(*arity),
        [arity] => Err(format!(
            "`{ENTRY_POINT}` must take (query) or (query, context), found {arity} parameters"
        )),
        many => Err(format!(
            "ambiguous entry point: {} `{ENTRY_POINT}` definitions",
            many.len()
        )),
    }
}

/// Path-keyed cache of compiled units.
///
/// `get_or_compile` returns the cached unit when one exists, so a reload must
/// `purge` first or it will hand back the stale definition.
#[derive(Default)]
pub struct UnitCache {
    units: Mutex<HashMap<PathBuf, Arc<CodeUnit>>>,
}

impl UnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        engine: &Engine,
        path: &Path,
        name: &str,
    ) -> Result<Arc<CodeUnit>, PluginError> {
        if let Some(unit) = self.get(path) {
            tracing::debug!(unit = %unit.key, "Reusing cached code unit");
            return Ok(unit);
        }

        // Compile outside the lock; loads of different files don't serialize.
        let unit = Arc::new(CodeUnit::compile_file(engine, path, name)?);
        let mut units = self.lock();
        let entry = units
            .entry(path.to_path_buf())
            .or_insert_with(|| unit.clone());
        Ok(entry.clone())
    }

    pub fn get(&self, path: &Path) -> Option<Arc<CodeUnit>> {
        self.lock().get(path).cloned()
    }

    /// Drop the unit for `path`. Returns whether one was cached.
    pub fn purge(&self, path: &Path) -> bool {
        let removed = self.lock().remove(path);
        if let Some(unit) = &removed {
            tracing::debug!(unit = %unit.key, "Purged code unit");
        }
        removed.is_some()
    }

    /// Drop every unit. Returns how many were cached.
    pub fn purge_all(&self) -> usize {
        let mut units = self.lock();
        let count = units.len();
        units.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<CodeUnit>>> {
        match self.units.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}
