// src/plugins/rhai_host.rs — Rhai scripting host
//
// Plugin scripts run in a sandboxed interpreter with no I/O. The host exposes
// logging and a few string helpers; everything else is the script's own logic.
// Each instantiated plugin gets its own engine and scope.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rhai::{CallFnOptions, Dynamic, Engine, FuncArgs, Scope};
use uuid::Uuid;

use crate::infra::errors::PluginError;
use crate::plugins::unit::{CodeUnit, ENTRY_POINT};
use crate::plugins::{HealthStatus, Plugin, PluginDescriptor};

// ---------------------------------------------------------------------------
// Engine factory
// ---------------------------------------------------------------------------

/// Create a Rhai engine with safety limits and the host functions plugins may call.
pub fn create_rhai_engine() -> Engine {
    let mut engine = Engine::new();

    // Set safety limits
    engine.set_max_expr_depths(64, 32);
    engine.set_max_operations(100_000);
    engine.set_max_string_size(1_048_576); // 1MB
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);

    engine.register_fn("to_upper", |s: &str| s.to_uppercase());
    engine.register_fn("to_lower", |s: &str| s.to_lowercase());
    engine.register_fn("trim", |s: &str| s.trim().to_string());
    engine.register_fn("contains", |s: &str, sub: &str| s.contains(sub));

    engine.register_fn("log", |msg: &str| {
        tracing::info!(target: "plugin_script", "{}", msg);
    });
    engine.register_fn("log_debug", |msg: &str| {
        tracing::debug!(target: "plugin_script", "{}", msg);
    });
    engine.register_fn("log_warn", |msg: &str| {
        tracing::warn!(target: "plugin_script", "{}", msg);
    });

    // No filesystem access, no shell exec, no env vars
    engine
}

// ---------------------------------------------------------------------------
// ScriptPlugin — a live instance of a compiled unit
// ---------------------------------------------------------------------------

/// A plugin backed by a Rhai code unit.
///
/// Top-level statements run once, at instantiation. Calls on one instance
/// are serialized by the scope lock.
pub struct ScriptPlugin {
    descriptor: PluginDescriptor,
    engine: Engine,
    unit: Arc<CodeUnit>,
    scope: Mutex<Scope<'static>>,
    instance_id: Uuid,
}

impl std::fmt::Debug for ScriptPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPlugin")
            .field("name", &self.descriptor.name)
            .field("unit", &self.unit.key)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl ScriptPlugin {
    /// Run the unit's top-level statements in a fresh engine and read its identity.
    pub fn instantiate(name: &str, unit: Arc<CodeUnit>) -> Result<Self, PluginError> {
        let engine = create_rhai_engine();
        let mut scope = Scope::new();

        engine
            .run_ast_with_scope(&mut scope, &unit.ast)
            .map_err(|e| PluginError::InstantiationError {
                name: name.into(),
                message: e.to_string(),
            })?;

        let descriptor = read_descriptor(&engine, &mut scope, &unit, name)?;

        Ok(Self {
            descriptor,
            engine,
            unit,
            scope: Mutex::new(scope),
            instance_id: Uuid::new_v4(),
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn generation(&self) -> u64 {
        self.unit.key.generation
    }

    fn call(&self, func: &str, args: impl FuncArgs) -> Result<Dynamic, Box<rhai::EvalAltResult>> {
        let mut scope = match self.scope.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        call_script_fn(&self.engine, &mut scope, &self.unit, func, args)
    }
}

impl Plugin for ScriptPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn handle(
        &self,
        query: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, PluginError> {
        let query = Dynamic::from(query.to_string());
        let result = if self.unit.handle_arity == 2 {
            let ctx = context.map(json_to_dynamic).unwrap_or(Dynamic::UNIT);
            self.call(ENTRY_POINT, (query, ctx))
        } else {
            self.call(ENTRY_POINT, (query,))
        };

        result
            .map(|value| dynamic_to_json(&value))
            .map_err(|e| PluginError::HandleError {
                name: self.descriptor.name.clone(),
                message: e.to_string(),
            })
    }

    fn health_check(&self) -> HealthStatus {
        if !self.unit.defines("health_check", 0) {
            return HealthStatus::Unknown;
        }
        match self.call("health_check", ()) {
            Ok(value) => health_from_json(dynamic_to_json(&value)),
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}

fn call_script_fn(
    engine: &Engine,
    scope: &mut Scope<'static>,
    unit: &CodeUnit,
    func: &str,
    args: impl FuncArgs,
) -> Result<Dynamic, Box<rhai::EvalAltResult>> {
    // Top-level statements already ran at instantiation; don't re-run them per call.
    let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
    engine.call_fn_with_options::<Dynamic>(options, scope, &unit.ast, func, args)
}

/// Build the descriptor from `get_info()` or the individual identity functions.
fn read_descriptor(
    engine: &Engine,
    scope: &mut Scope<'static>,
    unit: &CodeUnit,
    name: &str,
) -> Result<PluginDescriptor, PluginError> {
    let mut descriptor = PluginDescriptor::named(name);
    descriptor.source = Some(PathBuf::from(&unit.key.path));

    let mut identity = serde_json::Map::new();
    if unit.defines("get_info", 0) {
        let info = call_identity(engine, scope, unit, name, "get_info")?;
        if let serde_json::Value::Object(map) = info {
            identity = map;
        } else {
            return Err(PluginError::ContractViolation {
                name: name.into(),
                reason: "`get_info()` must return a map".into(),
            });
        }
    } else {
        for field in ["description", "version", "author", "capabilities"] {
            if unit.defines(field, 0) {
                let value = call_identity(engine, scope, unit, name, field)?;
                identity.insert(field.to_string(), value);
            }
        }
    }

    if let Some(s) = identity.get("description").and_then(|v| v.as_str()) {
        descriptor.description = s.to_string();
    }
    if let Some(s) = identity.get("version").and_then(|v| v.as_str()) {
        descriptor.version = s.to_string();
    }
    if let Some(s) = identity.get("author").and_then(|v| v.as_str()) {
        descriptor.author = s.to_string();
    }
    if let Some(caps) = identity.get("capabilities").and_then(|v| v.as_array()) {
        descriptor.capabilities = caps
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect();
    }

    Ok(descriptor)
}

fn call_identity(
    engine: &Engine,
    scope: &mut Scope<'static>,
    unit: &CodeUnit,
    name: &str,
    func: &str,
) -> Result<serde_json::Value, PluginError> {
    call_script_fn(engine, scope, unit, func, ())
        .map(|v| dynamic_to_json(&v))
        .map_err(|e| PluginError::InstantiationError {
            name: name.into(),
            message: format!("`{func}()` failed: {e}"),
        })
}

fn health_from_json(value: serde_json::Value) -> HealthStatus {
    match value {
        serde_json::Value::Bool(true) => HealthStatus::Healthy,
        serde_json::Value::Bool(false) => {
            HealthStatus::Unhealthy("health check returned false".into())
        }
        serde_json::Value::Null => HealthStatus::Healthy,
        serde_json::Value::String(s) => match s.to_lowercase().as_str() {
            "ok" | "healthy" => HealthStatus::Healthy,
            "unhealthy" | "down" => HealthStatus::Unhealthy(s),
            _ => HealthStatus::Degraded(s),
        },
        serde_json::Value::Object(map) => {
            let status = map.get("status").and_then(|v| v.as_str()).unwrap_or("");
            let detail = map
                .get("detail")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            match status {
                "ok" | "healthy" => HealthStatus::Healthy,
                "degraded" => HealthStatus::Degraded(detail),
                _ => HealthStatus::Unhealthy(detail),
            }
        }
        other => HealthStatus::Degraded(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

/// Convert a serde_json::Value to a Rhai Dynamic.
pub fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(b) => Dynamic::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        serde_json::Value::String(s) => Dynamic::from(s.clone()),
        serde_json::Value::Array(arr) => {
            let rhai_arr: Vec<Dynamic> = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from(rhai_arr)
        }
        serde_json::Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.clone().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Convert a Rhai Dynamic back to JSON. Unknown custom types become strings.
pub fn dynamic_to_json(value: &Dynamic) -> serde_json::Value {
    if value.is_unit() {
        return serde_json::Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return serde_json::Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return serde_json::json!(i);
    }
    if let Ok(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if value.is_string() || value.is_char() {
        return serde_json::Value::String(value.to_string());
    }
    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        return serde_json::Value::Array(arr.iter().map(dynamic_to_json).collect());
    }
    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let obj = map
            .iter()
            .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
            .collect();
        return serde_json::Value::Object(obj);
    }
    serde_json::Value::String(value.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
