// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub router: RouterConfig,

    /// Absent section means fallback-only routing.
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,

    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugin directory. Defaults to the data dir's `plugins/`.
    pub dir: Option<String>,
    /// Filename suffix marking a plugin source file.
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Glob patterns (matched against file names) that are never loaded.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            suffix: default_suffix(),
            exclude: Vec::new(),
        }
    }
}

impl PluginsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => paths::expand_tilde(dir),
            None => paths::plugins_dir(),
        }
    }
}

fn default_suffix() -> String {
    "_plugin.rhai".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
    /// Ordered keyword rules. Declaration order is match order.
    #[serde(default = "default_keyword_rules")]
    pub keywords: Vec<KeywordRule>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_threshold(),
            keywords: default_keyword_rules(),
        }
    }
}

fn default_threshold() -> f32 {
    0.3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub plugin: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(plugin: &str, keywords: &[&str]) -> Self {
        Self {
            plugin: plugin.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

pub fn default_keyword_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new("task", &["task", "todo", "to-do", "remind"]),
        KeywordRule::new(
            "calendar",
            &["calendar", "schedule", "meeting", "appointment", "event"],
        ),
        KeywordRule::new(
            "finance",
            &["budget", "expense", "invest", "loan", "interest", "finance"],
        ),
        KeywordRule::new("search", &["search", "look up", "lookup", "find"]),
        KeywordRule::new("notes", &["note", "memo", "journal"]),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_api_key_env() -> String {
    "SWITCHBOARD_CLASSIFIER_KEY".into()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    2000
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let t = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&t) {
            anyhow::bail!("router.confidence_threshold must be within 0.0..=1.0, got {t}");
        }
        if self.plugins.suffix.is_empty() {
            anyhow::bail!("plugins.suffix must not be empty");
        }
        for pattern in &self.plugins.exclude {
            glob::Pattern::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid plugins.exclude pattern '{pattern}': {e}"))?;
        }
        // A blank keyword is a substring of every query.
        for rule in &self.router.keywords {
            if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                anyhow::bail!("router.keywords for '{}' contains a blank keyword", rule.plugin);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert!((c.router.confidence_threshold - 0.3).abs() < 0.001);
        assert_eq!(c.plugins.suffix, "_plugin.rhai");
        assert!(c.classifier.is_none());
        assert!(c.watcher.enabled);
        assert_eq!(c.watcher.debounce(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_keywords_order() {
        let rules = default_keyword_rules();
        assert_eq!(rules[0].plugin, "task");
        assert_eq!(rules[1].plugin, "calendar");
        assert!(rules[0].keywords.contains(&"task".to_string()));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.classifier.is_none());
        assert_eq!(config.router.keywords.len(), 5);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[plugins]
dir = "/srv/plugins"
exclude = ["test_*"]

[router]
confidence_threshold = 0.5

[[router.keywords]]
plugin = "weather"
keywords = ["rain", "forecast"]

[classifier]
base_url = "http://localhost:11434/v1"
model = "llama3"
timeout_secs = 3

[watcher]
enabled = false
debounce_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.plugins.resolved_dir(), PathBuf::from("/srv/plugins"));
        assert_eq!(config.plugins.exclude, vec!["test_*".to_string()]);
        assert_eq!(config.router.keywords.len(), 1);
        assert_eq!(config.router.keywords[0].plugin, "weather");
        let classifier = config.classifier.unwrap();
        assert_eq!(classifier.model, "llama3");
        assert_eq!(classifier.timeout(), Duration::from_secs(3));
        assert_eq!(classifier.api_key_env, "SWITCHBOARD_CLASSIFIER_KEY");
        assert!(!config.watcher.enabled);
        assert_eq!(config.watcher.debounce_ms, 500);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut c = Config::default();
        c.router.confidence_threshold = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[router.keywords]]
plugin = "task"
keywords = ["todo", "  "]
"#,
        )
        .unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("blank keyword"));

        let mut c = Config::default();
        c.router.keywords = vec![KeywordRule::new("notes", &[""])];
        assert!(c.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let mut c = Config::default();
        c.plugins.exclude = vec!["[".into()];
        assert!(c.validate().is_err());
    }
}
