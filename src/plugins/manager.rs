// src/plugins/manager.rs — Plugin registry: discovery, load, unload, reload
//
// The registry is the single source of truth for which plugins exist. Readers
// (the router) take a short read lock to clone an `Arc` out; writers build the
// new instance first and only then take the write lock to swap it in, so a
// concurrent lookup sees either the old instance or the new one, never a gap.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rhai::Engine;

use crate::infra::config::PluginsConfig;
use crate::infra::errors::PluginError;
use crate::plugins::rhai_host::{create_rhai_engine, ScriptPlugin};
use crate::plugins::unit::UnitCache;
use crate::plugins::{HealthStatus, Plugin, PluginDescriptor};

/// Extension of plugin source files.
pub const SCRIPT_EXTENSION: &str = "rhai";

/// A plugin source file found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub path: PathBuf,
}

/// Outcome of a batch load.
#[derive(Debug, Default, Clone)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    /// (plugin name, error message)
    pub failed: Vec<(String, String)>,
}

impl LoadSummary {
    pub fn total(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Script(PathBuf),
    Native,
}

struct RegistryEntry {
    plugin: Arc<dyn Plugin>,
    /// Registration order; kept across replacement, forgotten on unload.
    seq: u64,
    origin: Origin,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, RegistryEntry>,
    next_seq: u64,
}

impl Registry {
    /// Insert or replace. Returns true when an older instance was replaced.
    fn install(&mut self, name: String, plugin: Arc<dyn Plugin>, origin: Origin) -> bool {
        if let Some(entry) = self.entries.get_mut(&name) {
            entry.plugin = plugin;
            entry.origin = origin;
            return true;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            name,
            RegistryEntry {
                plugin,
                seq,
                origin,
            },
        );
        false
    }

    fn ordered(&self) -> Vec<(&String, &RegistryEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
    }
}

/// Filename rules deciding which files are plugin sources.
struct DiscoveryRules {
    suffix: String,
    exclude: Vec<glob::Pattern>,
}

impl DiscoveryRules {
    /// Derive the short plugin name for a file, or `None` if it isn't a plugin source.
    /// Returns the name and whether the file follows the suffix convention.
    fn classify(&self, path: &Path) -> Option<(String, bool)> {
        let file_name = path.file_name()?.to_str()?;
        if file_name.starts_with('_') || file_name.starts_with('.') {
            return None;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
            return None;
        }
        if self.exclude.iter().any(|p| p.matches(file_name)) {
            return None;
        }

        let (name, conventional) = match file_name.strip_suffix(self.suffix.as_str()) {
            Some(stem) => (stem.to_string(), true),
            None => (path.file_stem()?.to_str()?.to_string(), false),
        };
        if name.is_empty() {
            return None;
        }
        Some((name, conventional))
    }
}

/// Owns the plugin registry and the code-unit cache.
pub struct PluginManager {
    dir: PathBuf,
    rules: DiscoveryRules,
    /// Compile-only engine; each instance gets its own engine at instantiation.
    compiler: Engine,
    units: UnitCache,
    registry: RwLock<Registry>,
    /// Serializes reloads so two writers never race on the same name.
    reload_lock: Mutex<()>,
}

impl PluginManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        suffix: impl Into<String>,
        exclude: &[String],
    ) -> Result<Self, PluginError> {
        let exclude = exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| PluginError::Config(format!("invalid exclude pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dir: dir.into(),
            rules: DiscoveryRules {
                suffix: suffix.into(),
                exclude,
            },
            compiler: create_rhai_engine(),
            units: UnitCache::new(),
            registry: RwLock::new(Registry::default()),
            reload_lock: Mutex::new(()),
        })
    }

    pub fn from_config(config: &PluginsConfig) -> Result<Self, PluginError> {
        Self::new(config.resolved_dir(), config.suffix.clone(), &config.exclude)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Short plugin name for `path`, or `None` if the file isn't a plugin source.
    pub fn candidate_name(&self, path: &Path) -> Option<String> {
        self.rules.classify(path).map(|(name, _)| name)
    }

    // ─── Discovery ──────────────────────────────────────────────

    /// Scan the plugin directory (non-recursive), deduplicated by name.
    ///
    /// When both `x_plugin.rhai` and `x.rhai` exist, the suffixed file wins.
    /// The result is sorted by file name.
    pub fn discover(&self) -> Vec<Candidate> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot read plugin directory {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut by_name: HashMap<String, (PathBuf, bool)> = HashMap::new();
        for path in paths {
            let Some((name, conventional)) = self.rules.classify(&path) else {
                continue;
            };
            match by_name.get(&name) {
                Some((_, true)) => {}
                Some((_, false)) if !conventional => {}
                _ => {
                    by_name.insert(name, (path, conventional));
                }
            }
        }

        let mut candidates: Vec<Candidate> = by_name
            .into_iter()
            .map(|(name, (path, _))| Candidate { name, path })
            .collect();
        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        candidates
    }

    /// Find the source file for a plugin name.
    pub fn resolve(&self, name: &str) -> Option<Candidate> {
        self.discover().into_iter().find(|c| c.name == name)
    }

    // ─── Load / unload ──────────────────────────────────────────

    /// Compile (or reuse the cached unit) and instantiate, without touching the registry.
    fn build(&self, candidate: &Candidate) -> Result<Arc<dyn Plugin>, PluginError> {
        let unit = self
            .units
            .get_or_compile(&self.compiler, &candidate.path, &candidate.name)?;
        match ScriptPlugin::instantiate(&candidate.name, unit) {
            Ok(plugin) => Ok(Arc::new(plugin)),
            Err(e) => {
                // A unit that can't be instantiated must not be reused by the next attempt.
                self.units.purge(&candidate.path);
                Err(e)
            }
        }
    }

    /// Load one candidate into the registry, replacing any prior instance.
    ///
    /// On failure the registry is left unchanged.
    pub fn load(&self, candidate: &Candidate) -> Result<PluginDescriptor, PluginError> {
        let plugin = match self.build(candidate) {
            Ok(plugin) => plugin,
            Err(e) => {
                tracing::warn!("Failed to load plugin '{}': {}", candidate.name, e);
                return Err(e);
            }
        };

        let descriptor = plugin.get_info();
        let replaced = self.write().install(
            candidate.name.clone(),
            plugin,
            Origin::Script(candidate.path.clone()),
        );
        tracing::info!(
            plugin = %candidate.name,
            version = %descriptor.version,
            replaced,
            "Loaded plugin from {}",
            candidate.path.display()
        );
        Ok(descriptor)
    }

    /// Load a plugin by file path.
    pub fn load_path(&self, path: &Path) -> Result<PluginDescriptor, PluginError> {
        let name = self
            .candidate_name(path)
            .ok_or_else(|| PluginError::ContractViolation {
                name: path.display().to_string(),
                reason: "not a plugin source file".into(),
            })?;
        if !path.is_file() {
            return Err(PluginError::NotFound { name });
        }
        self.load(&Candidate {
            name,
            path: path.to_path_buf(),
        })
    }

    /// Discover and load every candidate. Never aborts early.
    pub fn load_all(&self) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for candidate in self.discover() {
            match self.load(&candidate) {
                Ok(_) => summary.loaded.push(candidate.name),
                Err(e) => summary.failed.push((candidate.name, e.to_string())),
            }
        }
        tracing::info!(
            "Loaded {}/{} plugins from {}",
            summary.loaded.len(),
            summary.total(),
            self.dir.display()
        );
        summary
    }

    /// Register a native (Rust) plugin. It is not file-backed and survives bulk reloads.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> PluginDescriptor {
        let descriptor = plugin.get_info();
        self.write()
            .install(descriptor.name.clone(), plugin, Origin::Native);
        tracing::info!(plugin = %descriptor.name, "Registered native plugin");
        descriptor
    }

    /// Remove a plugin and purge its cached code unit.
    ///
    /// Calls already running on the removed instance finish normally.
    pub fn unload(&self, name: &str) -> bool {
        let removed = self.write().entries.remove(name);
        if let Some(RegistryEntry {
            origin: Origin::Script(path),
            ..
        }) = &removed
        {
            self.units.purge(path);
        }
        self.purge_units_for(name);

        if removed.is_some() {
            tracing::info!(plugin = %name, "Unloaded plugin");
        }
        removed.is_some()
    }

    fn purge_units_for(&self, name: &str) {
        self.units.purge(&self.dir.join(format!("{name}{}", self.rules.suffix)));
        self.units
            .purge(&self.dir.join(format!("{name}.{SCRIPT_EXTENSION}")));
    }

    // ─── Reload ─────────────────────────────────────────────────

    /// Rebuild one plugin from source and swap it in once it is ready.
    ///
    /// If the rebuild fails the previous instance stays registered. If the
    /// source file is gone the plugin is unloaded and `NotFound` returned.
    pub fn reload_one(&self, name: &str) -> Result<PluginDescriptor, PluginError> {
        let _guard = self.reload_guard();

        let registered_path = match self.read().entries.get(name).map(|e| e.origin.clone()) {
            Some(Origin::Native) => {
                return Err(PluginError::ContractViolation {
                    name: name.into(),
                    reason: "native plugins cannot be reloaded from source".into(),
                })
            }
            Some(Origin::Script(path)) => Some(path),
            None => None,
        };

        let candidate = match registered_path {
            Some(path) if path.is_file() => Candidate {
                name: name.into(),
                path,
            },
            _ => match self.resolve(name) {
                Some(candidate) => candidate,
                None => {
                    self.unload(name);
                    return Err(PluginError::NotFound { name: name.into() });
                }
            },
        };

        self.swap_in(&candidate)
    }

    /// Reload whatever plugin lives at `path` (used by the watcher).
    ///
    /// Only the file discovery would pick for the name is ever installed: an
    /// edit to a shadowed legacy file just drops its cached unit, and removing
    /// the winning file promotes the next candidate. Returns `Ok(None)` when
    /// nothing was (re)installed from the event.
    pub fn reload_path(&self, path: &Path) -> Result<Option<PluginDescriptor>, PluginError> {
        let name = self
            .candidate_name(path)
            .ok_or_else(|| PluginError::ContractViolation {
                name: path.display().to_string(),
                reason: "not a plugin source file".into(),
            })?;

        let _guard = self.reload_guard();
        self.units.purge(path);

        let registered = self.read().entries.get(&name).map(|e| e.origin.clone());
        if registered == Some(Origin::Native) {
            tracing::debug!(plugin = %name, "Ignoring file event for native plugin");
            return Ok(None);
        }

        let winner = self.resolve(&name);
        if path.is_file() {
            return match winner {
                Some(candidate) if candidate.path == path => self.swap_in(&candidate).map(Some),
                _ => {
                    tracing::debug!(
                        plugin = %name,
                        "Ignoring change to shadowed source {}",
                        path.display()
                    );
                    Ok(None)
                }
            };
        }

        let owned_by_path = matches!(&registered, Some(Origin::Script(p)) if p == path);
        if !owned_by_path {
            return Ok(None);
        }
        match winner {
            Some(candidate) => {
                tracing::info!(
                    plugin = %name,
                    "Source {} removed, switching to {}",
                    path.display(),
                    candidate.path.display()
                );
                self.swap_in(&candidate).map(Some)
            }
            None => {
                self.unload(&name);
                Ok(None)
            }
        }
    }

    fn swap_in(&self, candidate: &Candidate) -> Result<PluginDescriptor, PluginError> {
        self.units.purge(&candidate.path);
        let plugin = self.build(candidate).map_err(|e| {
            tracing::warn!(
                "Reload of plugin '{}' failed, keeping previous instance: {}",
                candidate.name,
                e
            );
            e
        })?;

        let descriptor = plugin.get_info();
        self.write().install(
            candidate.name.clone(),
            plugin,
            Origin::Script(candidate.path.clone()),
        );
        tracing::info!(plugin = %candidate.name, "Reloaded plugin");
        Ok(descriptor)
    }

    /// Purge every code unit, rebuild all script plugins from source, and
    /// replace the script portion of the registry in one step.
    pub fn reload_all(&self) -> LoadSummary {
        let _guard = self.reload_guard();

        let purged = self.units.purge_all();
        tracing::debug!("Purged {} code units", purged);

        let mut summary = LoadSummary::default();
        let mut built = Vec::new();
        for candidate in self.discover() {
            match self.build(&candidate) {
                Ok(plugin) => {
                    summary.loaded.push(candidate.name.clone());
                    built.push((candidate, plugin));
                }
                Err(e) => {
                    tracing::warn!("Failed to load plugin '{}': {}", candidate.name, e);
                    summary.failed.push((candidate.name, e.to_string()));
                }
            }
        }

        {
            let mut registry = self.write();
            registry
                .entries
                .retain(|_, e| e.origin == Origin::Native);
            for (candidate, plugin) in built {
                registry.install(candidate.name, plugin, Origin::Script(candidate.path));
            }
        }

        tracing::info!(
            "Reloaded {}/{} plugins from {}",
            summary.loaded.len(),
            summary.total(),
            self.dir.display()
        );
        summary
    }

    // ─── Read access ────────────────────────────────────────────

    /// The instance registered under `name` right now.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.read().entries.get(name).map(|e| e.plugin.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<PluginDescriptor> {
        self.read()
            .ordered()
            .into_iter()
            .map(|(_, e)| e.plugin.get_info())
            .collect()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.read()
            .ordered()
            .into_iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn first_registered(&self) -> Option<String> {
        self.read()
            .entries
            .iter()
            .min_by_key(|(_, e)| e.seq)
            .map(|(name, _)| name.clone())
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cached_units(&self) -> usize {
        self.units.len()
    }

    /// Run every plugin's health check. Instances are cloned out first so
    /// slow checks never hold the registry lock.
    pub fn health_report(&self) -> Vec<(String, HealthStatus)> {
        let plugins: Vec<(String, Arc<dyn Plugin>)> = self
            .read()
            .ordered()
            .into_iter()
            .map(|(name, e)| (name.clone(), e.plugin.clone()))
            .collect();
        plugins
            .into_iter()
            .map(|(name, plugin)| (name, plugin.health_check()))
            .collect()
    }

    // ─── Locking ────────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        match self.registry.read() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        match self.registry.write() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    fn reload_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.reload_lock.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}
