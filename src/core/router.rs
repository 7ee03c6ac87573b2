// src/core/router.rs — Two-tier request routing (classifier, then keywords)

use std::sync::Arc;

use super::classifier::Classifier;
use super::stats::UsageStatistics;
use super::types::{PluginResponse, RouteOutcome, RoutingDecision, RoutingMethod};
use crate::infra::config::{KeywordRule, RouterConfig};
use crate::plugins::manager::PluginManager;
use crate::plugins::Plugin;

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub plugin: String,
    pub method: RoutingMethod,
    pub confidence: Option<f32>,
}

pub struct Router {
    manager: Arc<PluginManager>,
    classifier: Option<Arc<dyn Classifier>>,
    keywords: Vec<KeywordRule>,
    threshold: f32,
    stats: Arc<UsageStatistics>,
}

impl Router {
    pub fn new(manager: Arc<PluginManager>, stats: Arc<UsageStatistics>, config: &RouterConfig) -> Self {
        Self {
            manager,
            classifier: None,
            keywords: config.keywords.clone(),
            threshold: config.confidence_threshold,
            stats,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn statistics(&self) -> &Arc<UsageStatistics> {
        &self.stats
    }

    /// Route one request and invoke the chosen plugin.
    ///
    /// Never fails: every error becomes part of the returned decision.
    pub async fn route(&self, query: &str, context: Option<serde_json::Value>) -> RoutingDecision {
        if query.trim().is_empty() {
            self.stats.record_empty();
            return RoutingDecision::empty_request();
        }

        // The plugin may have been unloaded since selection; pick again once.
        let resolved = match self.select(query).await {
            Some(selection) => match self.manager.get(&selection.plugin) {
                Some(plugin) => Some((selection, plugin)),
                None => self
                    .fallback(query)
                    .and_then(|s| self.manager.get(&s.plugin).map(|p| (s, p))),
            },
            None => None,
        };
        let Some((selection, plugin)) = resolved else {
            self.stats.record_request(RoutingMethod::Fallback);
            tracing::warn!("No plugin available to handle request");
            return RoutingDecision::no_plugin();
        };
        self.stats.record_request(selection.method);

        tracing::debug!(
            plugin = %selection.plugin,
            method = %selection.method,
            confidence = ?selection.confidence,
            "Routing request"
        );

        let (result, raised) = invoke(plugin, query, context).await;
        self.stats.record_invocation(&selection.plugin, raised);

        RoutingDecision {
            outcome: RouteOutcome::Handled,
            plugin: Some(selection.plugin),
            method: Some(selection.method),
            confidence: selection.confidence,
            result,
        }
    }

    /// Choose a plugin without invoking it. `None` only when nothing is registered.
    pub async fn select(&self, query: &str) -> Option<Selection> {
        if let Some(selection) = self.classify(query).await {
            return Some(selection);
        }
        self.fallback(query)
    }

    async fn classify(&self, query: &str) -> Option<Selection> {
        let classifier = self.classifier.as_ref()?;
        let plugins = self.manager.list();
        if plugins.is_empty() {
            return None;
        }

        let verdict = match classifier.classify(query, &plugins).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Classifier unavailable, using keywords: {e}");
                return None;
            }
        };

        if verdict.confidence <= self.threshold {
            tracing::debug!(
                plugin = %verdict.plugin,
                confidence = verdict.confidence,
                threshold = self.threshold,
                "Classifier verdict below threshold"
            );
            return None;
        }
        // Registry may have changed while the classifier was thinking.
        if !self.manager.contains(&verdict.plugin) {
            tracing::debug!(plugin = %verdict.plugin, "Classifier named an unregistered plugin");
            return None;
        }

        Some(Selection {
            plugin: verdict.plugin,
            method: RoutingMethod::Classifier,
            confidence: Some(verdict.confidence),
        })
    }

    /// Keyword rules in declaration order, then the first-registered plugin.
    pub fn fallback(&self, query: &str) -> Option<Selection> {
        let lowered = query.to_lowercase();
        let matched = self.keywords.iter().find(|rule| {
            self.manager.contains(&rule.plugin)
                && rule
                    .keywords
                    .iter()
                    .any(|k| lowered.contains(&k.to_lowercase()))
        });

        let plugin = match matched {
            Some(rule) => rule.plugin.clone(),
            None => self.manager.first_registered()?,
        };
        Some(Selection {
            plugin,
            method: RoutingMethod::Fallback,
            confidence: None,
        })
    }
}

/// Run `handle` on the blocking pool. Returns the normalized result and
/// whether the plugin raised (or panicked).
async fn invoke(
    plugin: Arc<dyn Plugin>,
    query: &str,
    context: Option<serde_json::Value>,
) -> (PluginResponse, bool) {
    let name = plugin.name().to_string();
    let query = query.to_string();
    let joined =
        tokio::task::spawn_blocking(move || plugin.handle(&query, context.as_ref())).await;

    match joined {
        Ok(Ok(value)) => (PluginResponse::normalize(value), false),
        Ok(Err(e)) => {
            tracing::warn!(plugin = %name, "Plugin failed: {e}");
            (PluginResponse::failed(e.to_string()), true)
        }
        Err(e) => {
            tracing::error!(plugin = %name, "Plugin task aborted: {e}");
            (
                PluginResponse::failed(format!("Plugin '{name}' crashed while handling request")),
                true,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::ClassifierVerdict;
    use crate::infra::errors::PluginError;
    use crate::plugins::PluginDescriptor;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Echo {
        descriptor: PluginDescriptor,
    }

    impl Echo {
        fn arc(name: &str) -> Arc<dyn Plugin> {
            Arc::new(Self {
                descriptor: PluginDescriptor::named(name),
            })
        }
    }

    impl Plugin for Echo {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn handle(
            &self,
            query: &str,
            _context: Option<&serde_json::Value>,
        ) -> Result<serde_json::Value, PluginError> {
            match query {
                "boom" => Err(PluginError::HandleError {
                    name: self.descriptor.name.clone(),
                    message: "exploded".into(),
                }),
                "panic" => panic!("plugin bug"),
                _ => Ok(serde_json::json!(format!("{}: {}", self.descriptor.name, query))),
            }
        }
    }

    struct Fixed(&'static str, f32);

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(
            &self,
            _query: &str,
            _plugins: &[PluginDescriptor],
        ) -> Result<ClassifierVerdict, PluginError> {
            Ok(ClassifierVerdict {
                plugin: self.0.into(),
                confidence: self.1,
            })
        }
    }

    fn router(names: &[&str]) -> Router {
        let manager = Arc::new(PluginManager::new("/nonexistent", "_plugin.rhai", &[]).unwrap());
        for name in names {
            manager.register(Echo::arc(name));
        }
        Router::new(
            manager,
            Arc::new(UsageStatistics::new()),
            &RouterConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_keyword_match() {
        let r = router(&["calendar", "task"]);
        let d = r.route("add a new task", None).await;
        assert_eq!(d.plugin.as_deref(), Some("task"));
        assert_eq!(d.method, Some(RoutingMethod::Fallback));
        assert_eq!(d.confidence, None);
        assert_eq!(d.result.message, "task: add a new task");
    }

    #[tokio::test]
    async fn test_unmatched_goes_to_first_registered() {
        let r = router(&["calendar", "task"]);
        let d = r.route("what is the meaning of life", None).await;
        assert_eq!(d.plugin.as_deref(), Some("calendar"));
        assert_eq!(d.outcome, RouteOutcome::Handled);
    }

    #[tokio::test]
    async fn test_keyword_for_unregistered_plugin_is_skipped() {
        let r = router(&["notes"]);
        let d = r.route("add a task to my journal", None).await;
        assert_eq!(d.plugin.as_deref(), Some("notes"));
    }

    #[tokio::test]
    async fn test_empty_request() {
        let r = router(&["task"]);
        let d = r.route("   \n", None).await;
        assert_eq!(d.outcome, RouteOutcome::EmptyRequest);
        let s = r.statistics().snapshot();
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.empty_requests, 1);
    }

    #[tokio::test]
    async fn test_no_plugins() {
        let r = router(&[]);
        let d = r.route("add a task", None).await;
        assert_eq!(d.outcome, RouteOutcome::NoPluginAvailable);
        assert_eq!(d.plugin, None);
        assert_eq!(r.statistics().snapshot().fallback_routing_requests, 1);
    }

    #[tokio::test]
    async fn test_handle_error_becomes_failed_result() {
        let r = router(&["task"]);
        let d = r.route("boom", None).await;
        assert!(!d.result.success);
        assert!(d.result.message.contains("exploded"));

        let after = r.route("add a task", None).await;
        assert!(after.result.success);

        let s = r.statistics().snapshot();
        assert_eq!(s.invocations("task"), 2);
        assert_eq!(s.errors("task"), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let r = router(&["task"]);
        let d = r.route("panic", None).await;
        assert!(!d.result.success);
        assert!(d.result.message.contains("crashed"));
        assert_eq!(r.statistics().snapshot().errors("task"), 1);
    }

    #[tokio::test]
    async fn test_classifier_above_threshold() {
        let r = router(&["task", "calendar"]).with_classifier(Arc::new(Fixed("calendar", 0.9)));
        let d = r.route("schedule a meeting", None).await;
        assert_eq!(d.plugin.as_deref(), Some("calendar"));
        assert_eq!(d.method, Some(RoutingMethod::Classifier));
        assert_eq!(d.confidence, Some(0.9));
        assert_eq!(r.statistics().snapshot().classifier_routing_requests, 1);
    }

    #[tokio::test]
    async fn test_classifier_below_threshold_falls_back() {
        let r = router(&["task", "calendar"]).with_classifier(Arc::new(Fixed("calendar", 0.2)));
        let d = r.route("add a task", None).await;
        assert_eq!(d.plugin.as_deref(), Some("task"));
        assert_eq!(d.method, Some(RoutingMethod::Fallback));
    }

    #[tokio::test]
    async fn test_classifier_unknown_name_falls_back() {
        let r = router(&["task"]).with_classifier(Arc::new(Fixed("weather", 0.9)));
        let d = r.route("add a task", None).await;
        assert_eq!(d.plugin.as_deref(), Some("task"));
        assert_eq!(d.method, Some(RoutingMethod::Fallback));
        assert_eq!(r.statistics().snapshot().fallback_routing_requests, 1);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let r = router(&["task", "calendar", "notes"]);
        let first = r.fallback("put the meeting on my calendar");
        for _ in 0..10 {
            assert_eq!(r.fallback("put the meeting on my calendar"), first);
        }
        assert_eq!(first.unwrap().plugin, "calendar");
    }
}
