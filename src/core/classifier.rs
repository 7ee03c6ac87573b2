// src/core/classifier.rs — Model-backed plugin selection

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::infra::config::ClassifierConfig;
use crate::infra::errors::PluginError;
use crate::plugins::PluginDescriptor;
use crate::provider::openai_compat::OpenAICompatProvider;
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Confidence assigned to every answer the model gives.
pub const CLASSIFIER_CONFIDENCE: f32 = 0.9;

const MAX_ANSWER_TOKENS: u32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierVerdict {
    pub plugin: String,
    pub confidence: f32,
}

/// Picks a plugin name for a query. The router still validates the answer
/// against the registry, so implementations may return any name.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        query: &str,
        plugins: &[PluginDescriptor],
    ) -> Result<ClassifierVerdict, PluginError>;
}

pub struct ProviderClassifier {
    provider: Arc<dyn ModelProvider>,
    model: String,
    timeout: Duration,
}

impl ProviderClassifier {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
        }
    }

    /// Build from the `[classifier]` section, reading the key from the environment.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, PluginError> {
        let provider = OpenAICompatProvider::new(
            "classifier",
            "Classifier",
            config.api_key(),
            config.base_url.clone(),
            config.timeout(),
        )?;
        Ok(Self::new(Arc::new(provider), config.model.clone(), config.timeout()))
    }
}

#[async_trait]
impl Classifier for ProviderClassifier {
    async fn classify(
        &self,
        query: &str,
        plugins: &[PluginDescriptor],
    ) -> Result<ClassifierVerdict, PluginError> {
        if plugins.is_empty() {
            return Err(PluginError::ClassifierError("no plugins to choose from".into()));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(build_prompt(query, plugins))],
            max_tokens: Some(MAX_ANSWER_TOKENS),
            temperature: Some(0.0),
        };

        let response = tokio::time::timeout(self.timeout, self.provider.chat(request))
            .await
            .map_err(|_| {
                PluginError::ClassifierError(format!(
                    "{} timed out after {:?}",
                    self.provider.id(),
                    self.timeout
                ))
            })??;

        tracing::debug!(
            answer = %response.content.trim(),
            tokens = response.usage.total(),
            "Classifier answered"
        );

        let names: Vec<&str> = plugins.iter().map(|p| p.name.as_str()).collect();
        parse_answer(&response.content, &names)
            .map(|plugin| ClassifierVerdict {
                plugin,
                confidence: CLASSIFIER_CONFIDENCE,
            })
            .ok_or_else(|| {
                PluginError::ClassifierError(format!(
                    "answer '{}' names no known plugin",
                    response.content.trim()
                ))
            })
    }
}

/// One line per plugin, then the query, then the instruction.
pub fn build_prompt(query: &str, plugins: &[PluginDescriptor]) -> String {
    let mut prompt = String::from("Available plugins:\n");
    for p in plugins {
        if p.description.is_empty() {
            prompt.push_str(&format!("- {}\n", p.name));
        } else {
            prompt.push_str(&format!("- {}: {}\n", p.name, p.description));
        }
    }
    prompt.push_str(&format!("\nRequest: {query}\n\n"));
    prompt.push_str("Reply with only the name of the single plugin best suited to handle the request.");
    prompt
}

/// Match a model answer against known plugin names.
///
/// Strips quotes, backticks and trailing punctuation, lowercases, and also
/// accepts `<name>_plugin`.
pub fn parse_answer(answer: &str, names: &[&str]) -> Option<String> {
    let first_line = answer.trim().lines().next()?;
    let cleaned = first_line
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim_start_matches("- ")
        .trim()
        .to_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    let stem = cleaned.strip_suffix("_plugin").unwrap_or(&cleaned);
    names
        .iter()
        .find(|n| n.to_lowercase() == cleaned || n.to_lowercase() == stem)
        .map(|n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, TokenUsage};

    struct ScriptedProvider {
        answer: String,
        delay: Duration,
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }
        fn name(&self) -> &str {
            "Scripted"
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, PluginError> {
            tokio::time::sleep(self.delay).await;
            Ok(ChatResponse {
                content: self.answer.clone(),
                usage: TokenUsage::default(),
            })
        }
    }

    fn classifier(answer: &str, delay: Duration) -> ProviderClassifier {
        ProviderClassifier::new(
            Arc::new(ScriptedProvider {
                answer: answer.into(),
                delay,
            }),
            "test-model",
            Duration::from_millis(200),
        )
    }

    fn plugins() -> Vec<PluginDescriptor> {
        vec![
            PluginDescriptor::named("task").with_description("Manage tasks"),
            PluginDescriptor::named("calendar").with_description("Schedule events"),
        ]
    }

    #[test]
    fn test_parse_answer_variants() {
        let names = ["task", "calendar"];
        assert_eq!(parse_answer("calendar", &names).as_deref(), Some("calendar"));
        assert_eq!(parse_answer("  \"Calendar\".\n", &names).as_deref(), Some("calendar"));
        assert_eq!(parse_answer("`task_plugin`", &names).as_deref(), Some("task"));
        assert_eq!(parse_answer("weather", &names), None);
        assert_eq!(parse_answer("", &names), None);
    }

    #[test]
    fn test_prompt_lists_every_plugin() {
        let prompt = build_prompt("schedule a meeting", &plugins());
        assert!(prompt.contains("- task: Manage tasks"));
        assert!(prompt.contains("- calendar: Schedule events"));
        assert!(prompt.contains("Request: schedule a meeting"));
    }

    #[tokio::test]
    async fn test_classify_returns_fixed_confidence() {
        let verdict = classifier("calendar", Duration::ZERO)
            .classify("schedule a meeting", &plugins())
            .await
            .unwrap();
        assert_eq!(verdict.plugin, "calendar");
        assert_eq!(verdict.confidence, CLASSIFIER_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_unknown_answer_is_error() {
        let err = classifier("weather", Duration::ZERO)
            .classify("rain?", &plugins())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::ClassifierError(_)));
    }

    #[tokio::test]
    async fn test_hung_provider_times_out() {
        let err = classifier("task", Duration::from_secs(5))
            .classify("add a task", &plugins())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
