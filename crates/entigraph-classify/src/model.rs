//! External model classification tier
//!
//! Clients for OpenAI-compatible and Ollama APIs implementing
//! [`ClassificationModel`], plus the tier wrapper that turns every
//! failure mode (bad label, empty output, network error, timeout) into
//! a fall-through rather than a pipeline error.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use entigraph_core::{
    ClassificationModel, ClassificationTier, ClassifierConfig, EngineError, EntityType,
    ModelProvider, Result,
};

use crate::{ClassifyTier, TierOutcome};

fn build_prompt(name: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Classify the following name as exactly one of: person, organization, location.\n\
         Respond with a single word and nothing else.\n\nName: {name}"
    );
    if let Some(ctx) = context {
        prompt.push_str(&format!("\nContext: {ctx}"));
    }
    prompt
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI chat-completions classification client
pub struct OpenAiClassifier {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl OpenAiClassifier {
    /// Create a new OpenAI classification client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| EngineError::ConfigError("OpenAI API key required".to_string()))?;

        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key: api_key.clone(),
            base_url,
            model: config.model.clone(),
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl ClassificationModel for OpenAiClassifier {
    async fn classify_label(
        &self,
        name: &str,
        context: Option<&str>,
    ) -> Result<Option<EntityType>> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(name, context),
            }],
            max_tokens: 8,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::ClassificationUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::ClassificationUnavailable(format!(
                "OpenAI error: {error_text}"
            )));
        }

        let result: OpenAiResponse = response.json().await.map_err(|e| {
            EngineError::ClassificationUnavailable(format!("failed to parse response: {e}"))
        })?;

        Ok(result
            .choices
            .first()
            .and_then(|c| EntityType::from_model_label(&c.message.content)))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama classification client
pub struct OllamaClassifier {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClassifier {
    /// Create a new Ollama classification client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
    }
}

#[async_trait::async_trait]
impl ClassificationModel for OllamaClassifier {
    async fn classify_label(
        &self,
        name: &str,
        context: Option<&str>,
    ) -> Result<Option<EntityType>> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: build_prompt(name, context),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                EngineError::ClassificationUnavailable(format!("Ollama request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::ClassificationUnavailable(format!(
                "Ollama error: {error_text}"
            )));
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            EngineError::ClassificationUnavailable(format!("failed to parse response: {e}"))
        })?;

        Ok(EntityType::from_model_label(&result.response))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Create a classification model client from config
pub fn create_classification_model(
    config: &ClassifierConfig,
) -> Result<Arc<dyn ClassificationModel>> {
    match config.provider {
        ModelProvider::OpenAi => Ok(Arc::new(OpenAiClassifier::from_config(config)?)),
        ModelProvider::Ollama => Ok(Arc::new(OllamaClassifier::from_config(config))),
    }
}

// ============================================================================
// External Model Tier
// ============================================================================

/// Highest tier of the fallback chain.
///
/// Accepts only the three valid type labels from the model. Any other
/// output, empty output, network error, or timeout is reported as "no
/// result" so the chain falls through; an unreachable model never halts
/// the pipeline.
pub struct ExternalModelTier {
    model: Arc<dyn ClassificationModel>,
    timeout: Duration,
}

impl ExternalModelTier {
    pub fn new(model: Arc<dyn ClassificationModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self::new(
            create_classification_model(config)?,
            Duration::from_secs(config.timeout_secs),
        ))
    }
}

#[async_trait::async_trait]
impl ClassifyTier for ExternalModelTier {
    async fn classify(&self, name: &str, context: Option<&str>) -> Result<Option<TierOutcome>> {
        let call = self.model.classify_label(name, context);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Some(entity_type))) => Ok(Some(TierOutcome::new(
                entity_type,
                0.9,
                format!("{} model label", self.model.name()),
            ))),
            Ok(Ok(None)) => {
                tracing::debug!(model = self.model.name(), %name, "model returned no usable label");
                Ok(None)
            }
            Ok(Err(e)) => {
                tracing::warn!(model = self.model.name(), error = %e, "model call failed");
                Ok(None)
            }
            Err(_) => {
                tracing::warn!(model = self.model.name(), %name, "model call timed out");
                Ok(None)
            }
        }
    }

    fn tier(&self) -> ClassificationTier {
        ClassificationTier::ExternalModel
    }

    fn name(&self) -> &str {
        "external_model"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StubModel(Result<Option<EntityType>>);

    #[async_trait::async_trait]
    impl ClassificationModel for StubModel {
        async fn classify_label(&self, _: &str, _: Option<&str>) -> Result<Option<EntityType>> {
            match &self.0 {
                Ok(v) => Ok(*v),
                Err(_) => Err(EngineError::ClassificationUnavailable("stub".to_string())),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct HangingModel;

    #[async_trait::async_trait]
    impl ClassificationModel for HangingModel {
        async fn classify_label(&self, _: &str, _: Option<&str>) -> Result<Option<EntityType>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_valid_label_accepted() {
        let tier = ExternalModelTier::new(
            Arc::new(StubModel(Ok(Some(EntityType::Location)))),
            Duration::from_secs(1),
        );
        let outcome = tier.classify("Zorro Ranch", None).await.unwrap().unwrap();
        assert_eq!(outcome.entity_type, EntityType::Location);
    }

    #[tokio::test]
    async fn test_unusable_label_falls_through() {
        let tier = ExternalModelTier::new(
            Arc::new(StubModel(Ok(None))),
            Duration::from_secs(1),
        );
        assert!(tier.classify("anything", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_model_error_falls_through() {
        let tier = ExternalModelTier::new(
            Arc::new(StubModel(Err(EngineError::ClassificationUnavailable(
                "down".to_string(),
            )))),
            Duration::from_secs(1),
        );
        assert!(tier.classify("anything", None).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_through() {
        let tier = ExternalModelTier::new(Arc::new(HangingModel), Duration::from_millis(50));
        assert!(tier.classify("anything", None).await.unwrap().is_none());
    }

    #[test]
    fn test_prompt_includes_context() {
        let prompt = build_prompt("Bear Stearns", Some("an investment bank"));
        assert!(prompt.contains("Bear Stearns"));
        assert!(prompt.contains("an investment bank"));
        assert!(prompt.contains("person, organization, location"));
    }
}
