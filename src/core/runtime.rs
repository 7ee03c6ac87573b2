// src/core/runtime.rs — Process-wide runtime context

use std::sync::Arc;
use std::time::Duration;

use super::classifier::{Classifier, ProviderClassifier};
use super::router::Router;
use super::stats::{StatisticsSnapshot, UsageStatistics};
use super::types::RoutingDecision;
use crate::infra::config::{Config, RouterConfig};
use crate::infra::errors::PluginError;
use crate::plugins::manager::{LoadSummary, PluginManager};
use crate::plugins::watcher::HotReloadWatcher;
use crate::plugins::PluginDescriptor;

/// Owns the manager, router, statistics and (optionally) the directory watcher.
///
/// Built once at startup and passed to whichever front end drives it.
pub struct Runtime {
    manager: Arc<PluginManager>,
    router: Router,
    stats: Arc<UsageStatistics>,
    watcher: Option<HotReloadWatcher>,
    debounce: Duration,
}

impl Runtime {
    pub fn new(
        manager: Arc<PluginManager>,
        router_config: &RouterConfig,
        classifier: Option<Arc<dyn Classifier>>,
        debounce: Duration,
    ) -> Self {
        let stats = Arc::new(UsageStatistics::new());
        let mut router = Router::new(manager.clone(), stats.clone(), router_config);
        if let Some(classifier) = classifier {
            router = router.with_classifier(classifier);
        }
        Self {
            manager,
            router,
            stats,
            watcher: None,
            debounce,
        }
    }

    /// Build from config and load every plugin in the directory.
    pub fn from_config(config: &Config) -> Result<Self, PluginError> {
        let manager = Arc::new(PluginManager::from_config(&config.plugins)?);

        let classifier: Option<Arc<dyn Classifier>> = match &config.classifier {
            Some(c) => {
                tracing::info!(base_url = %c.base_url, model = %c.model, "Classifier enabled");
                Some(Arc::new(ProviderClassifier::from_config(c)?))
            }
            None => {
                tracing::info!("No classifier configured, keyword routing only");
                None
            }
        };

        let runtime = Self::new(manager, &config.router, classifier, config.watcher.debounce());
        runtime.load_plugins();
        Ok(runtime)
    }

    pub fn load_plugins(&self) -> LoadSummary {
        self.manager.load_all()
    }

    pub async fn route(&self, query: &str, context: Option<serde_json::Value>) -> RoutingDecision {
        self.router.route(query, context).await
    }

    pub fn list_plugins(&self) -> Vec<PluginDescriptor> {
        self.manager.list()
    }

    /// Operator-triggered bulk refresh. Runs on the blocking pool.
    pub async fn reload_all(&self) -> Result<LoadSummary, PluginError> {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || manager.reload_all())
            .await
            .map_err(|e| PluginError::Other(anyhow::anyhow!("reload task failed: {e}")))
    }

    pub async fn reload_one(&self, name: &str) -> Result<PluginDescriptor, PluginError> {
        let manager = self.manager.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || manager.reload_one(&name))
            .await
            .map_err(|e| PluginError::Other(anyhow::anyhow!("reload task failed: {e}")))?
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| w.is_watching())
    }

    /// Start hot-reloading the plugin directory.
    pub fn start_watching(&mut self) -> Result<(), PluginError> {
        let watcher = self
            .watcher
            .get_or_insert_with(|| HotReloadWatcher::new(self.manager.clone(), self.debounce));
        watcher.start()
    }

    /// Stop the watcher (if any) and wait for its loop to exit.
    pub async fn shutdown(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        tracing::debug!("Runtime shut down");
    }
}
