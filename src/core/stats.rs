// src/core/stats.rs — Process-wide usage counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::types::RoutingMethod;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCounters {
    pub invocations: u64,
    pub errors: u64,
}

/// Counters shared by every router caller. Created at startup, never persisted.
#[derive(Debug)]
pub struct UsageStatistics {
    total_requests: AtomicU64,
    classifier_requests: AtomicU64,
    fallback_requests: AtomicU64,
    empty_requests: AtomicU64,
    per_plugin: Mutex<HashMap<String, PluginCounters>>,
    started_at: DateTime<Utc>,
}

impl Default for UsageStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageStatistics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            classifier_requests: AtomicU64::new(0),
            fallback_requests: AtomicU64::new(0),
            empty_requests: AtomicU64::new(0),
            per_plugin: Mutex::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    /// Count one routed request by method.
    pub fn record_request(&self, method: RoutingMethod) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match method {
            RoutingMethod::Classifier => &self.classifier_requests,
            RoutingMethod::Fallback => &self.fallback_requests,
        }
        .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.empty_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one invocation of `plugin`, and an error if it failed.
    pub fn record_invocation(&self, plugin: &str, failed: bool) {
        let mut map = match self.per_plugin.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        let counters = map.entry(plugin.to_string()).or_default();
        counters.invocations += 1;
        if failed {
            counters.errors += 1;
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let per_plugin = match self.per_plugin.lock() {
            Ok(g) => g.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Err(e) => e
                .into_inner()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        };
        StatisticsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            classifier_routing_requests: self.classifier_requests.load(Ordering::Relaxed),
            fallback_routing_requests: self.fallback_requests.load(Ordering::Relaxed),
            empty_requests: self.empty_requests.load(Ordering::Relaxed),
            plugins: per_plugin,
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }
}

/// Point-in-time copy of the counters, safe to serialize or hand to a front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_requests: u64,
    pub classifier_routing_requests: u64,
    pub fallback_routing_requests: u64,
    pub empty_requests: u64,
    pub plugins: BTreeMap<String, PluginCounters>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl StatisticsSnapshot {
    pub fn invocations(&self, plugin: &str) -> u64 {
        self.plugins.get(plugin).map_or(0, |c| c.invocations)
    }

    pub fn errors(&self, plugin: &str) -> u64 {
        self.plugins.get(plugin).map_or(0, |c| c.errors)
    }
}
