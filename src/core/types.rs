// src/core/types.rs — Routing decision and normalized plugin results

use serde::{Deserialize, Serialize};

/// How the winning plugin was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMethod {
    Classifier,
    Fallback,
}

impl RoutingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOutcome {
    /// A plugin was invoked (its result may still be a failure).
    Handled,
    /// Blank query, rejected before routing.
    EmptyRequest,
    /// No plugins are registered.
    NoPluginAvailable,
}

/// Uniform shape every plugin return value is coerced into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl PluginResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Coerce an arbitrary plugin return value.
    ///
    /// Maps carrying `success`/`message`/`error` are read field-wise and the
    /// remaining keys kept as `data`. Strings become the message. Anything
    /// else counts as success with its JSON text as the message.
    pub fn normalize(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::ok(""),
            serde_json::Value::Bool(b) => Self {
                success: b,
                message: String::new(),
                data: serde_json::Value::Null,
            },
            serde_json::Value::String(s) => Self::ok(s),
            serde_json::Value::Object(mut map)
                if map.contains_key("success")
                    || map.contains_key("message")
                    || map.contains_key("error") =>
            {
                let error = map.remove("error").and_then(|e| match e {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                });
                let success = match map.remove("success") {
                    Some(serde_json::Value::Bool(b)) => b,
                    Some(_) | None => error.is_none(),
                };
                let message = match map.remove("message") {
                    Some(serde_json::Value::String(s)) => s,
                    Some(serde_json::Value::Null) | None => error.unwrap_or_default(),
                    Some(other) => other.to_string(),
                };
                let data = if map.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::Object(map)
                };
                Self {
                    success,
                    message,
                    data,
                }
            }
            other => Self {
                success: true,
                message: other.to_string(),
                data: other,
            },
        }
    }
}

/// Everything the router decided and observed for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub outcome: RouteOutcome,
    pub plugin: Option<String>,
    pub method: Option<RoutingMethod>,
    /// Only set when `method` is `Classifier`.
    pub confidence: Option<f32>,
    pub result: PluginResponse,
}

impl RoutingDecision {
    pub fn empty_request() -> Self {
        Self {
            outcome: RouteOutcome::EmptyRequest,
            plugin: None,
            method: None,
            confidence: None,
            result: PluginResponse::failed("Empty request"),
        }
    }

    pub fn no_plugin() -> Self {
        Self {
            outcome: RouteOutcome::NoPluginAvailable,
            plugin: None,
            method: Some(RoutingMethod::Fallback),
            confidence: None,
            result: PluginResponse::failed("No plugin available"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RouteOutcome::Handled && self.result.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_normalize_string() {
        assert_eq!(PluginResponse::normalize(json!("done")), PluginResponse::ok("done"));
    }

    #[test]
    fn test_normalize_unit_and_bool() {
        assert_eq!(PluginResponse::normalize(json!(null)), PluginResponse::ok(""));
        assert!(!PluginResponse::normalize(json!(false)).success);
    }

    #[test]
    fn test_normalize_result_map_keeps_extra_data() {
        let r = PluginResponse::normalize(json!({
            "success": true,
            "message": "Task added",
            "task_id": 7
        }));
        assert_eq!(
            r,
            PluginResponse {
                success: true,
                message: "Task added".into(),
                data: json!({"task_id": 7}),
            }
        );
    }

    #[test]
    fn test_normalize_error_map() {
        let r = PluginResponse::normalize(json!({"error": "quota exceeded"}));
        assert!(!r.success);
        assert_eq!(r.message, "quota exceeded");
    }

    #[test]
    fn test_normalize_plain_map_is_data() {
        let r = PluginResponse::normalize(json!({"total": 3}));
        assert!(r.success);
        assert_eq!(r.data, json!({"total": 3}));
        assert_eq!(r.message, r#"{"total":3}"#);
    }

    #[test]
    fn test_normalize_number() {
        let r = PluginResponse::normalize(json!(42));
        assert!(r.success);
        assert_eq!(r.message, "42");
    }

    #[test]
    fn test_decision_serialization() {
        let d = RoutingDecision::no_plugin();
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["outcome"], "no_plugin_available");
        assert_eq!(v["method"], "fallback");
        assert!(v["result"].get("data").is_none());
        assert!(!d.is_success());
    }

    #[test]
    fn test_routing_method_display() {
        assert_eq!(RoutingMethod::Classifier.to_string(), "classifier");
    }
}
