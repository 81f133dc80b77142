//! Model interaction: send the document (or a text request) and return the
//! raw reply.
//!
//! This module is intentionally thin. Prompt wording lives in
//! [`crate::prompts`] and turning the reply into data lives in
//! [`crate::pipeline::sanitize`]; here we only build messages, call the
//! provider and apply the caller's retry policy.
//!
//! ## Retry Strategy
//!
//! `max_retries` defaults to 0: extraction calls are quota-metered and a
//! silent retry loop is what trips a provider's 429 in the first place. When
//! a caller raises it, waits follow `retry_backoff_ms * 2^attempt`
//! (500 ms → 1 s → 2 s with the defaults).

use crate::config::PlannerConfig;
use crate::error::Tt2CalError;
use crate::pipeline::encode;
use crate::pipeline::input::PdfDocument;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Raw text returned by the model plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The seam between the session and a hosted model.
///
/// [`LlmDocumentModel`] is the production implementation; tests substitute
/// scripted replies.
#[async_trait]
pub trait DocumentModel: Send + Sync {
    /// Send one request. `attachment` carries the encoded PDF, if any.
    async fn generate(
        &self,
        instructions: &str,
        user_text: &str,
        attachment: Option<ImageData>,
    ) -> Result<ModelReply, String>;
}

/// [`DocumentModel`] backed by an `edgequake-llm` provider.
pub struct LlmDocumentModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmDocumentModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PlannerConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider named by `config` and wrap it.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, Tt2CalError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl DocumentModel for LlmDocumentModel {
    async fn generate(
        &self,
        instructions: &str,
        user_text: &str,
        attachment: Option<ImageData>,
    ) -> Result<ModelReply, String> {
        // The attachment rides on the user turn; text-only requests send an
        // empty attachment list.
        let messages = vec![
            ChatMessage::system(instructions),
            ChatMessage::user_with_images(user_text, attachment.into_iter().collect()),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| format!("{e}"))?;

        Ok(ModelReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the planner config.
fn build_options(config: &PlannerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) is used as-is.
/// 2. **Named provider + model** (`config.provider_name`, `config.model`),
///    each falling back to Gemini defaults. The factory reads the matching
///    API key (`GEMINI_API_KEY`, `OPENAI_API_KEY`, …) from the environment.
pub fn resolve_provider(config: &PlannerConfig) -> Result<Arc<dyn LLMProvider>, Tt2CalError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let name = config.provider_or_default();
    let model = config.model_or_default();
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Tt2CalError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!(
                "Set GEMINI_API_KEY (or the key for '{name}') in the environment or .env.\nError: {e}"
            ),
        }
    })
}

/// Send the timetable document to the model and return its raw text.
pub async fn extract_document(
    model: &dyn DocumentModel,
    doc: &PdfDocument,
    config: &PlannerConfig,
) -> Result<String, Tt2CalError> {
    let prompt = config
        .extraction_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
    info!("Extracting timetable from {}", doc.name());

    let attachment = encode::encode_document(doc);
    let reply = call_with_retries(model, prompt, "", Some(attachment), config).await?;
    Ok(reply.text)
}

/// Send a text-only request (no attachment) and return the raw reply.
pub async fn complete_text(
    model: &dyn DocumentModel,
    instructions: &str,
    user_text: &str,
    config: &PlannerConfig,
) -> Result<String, Tt2CalError> {
    let reply = call_with_retries(model, instructions, user_text, None, config).await?;
    Ok(reply.text)
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

async fn call_with_retries(
    model: &dyn DocumentModel,
    instructions: &str,
    user_text: &str,
    attachment: Option<ImageData>,
    config: &PlannerConfig,
) -> Result<ModelReply, Tt2CalError> {
    let start = Instant::now();
    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Model call: retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match model
            .generate(instructions, user_text, attachment.clone())
            .await
        {
            Ok(reply) => {
                debug!(
                    "Model reply: {} input tokens, {} output tokens, {:?}",
                    reply.input_tokens,
                    reply.output_tokens,
                    start.elapsed()
                );
                return Ok(reply);
            }
            Err(e) => {
                warn!("Model call: attempt {} failed: {}", attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(Tt2CalError::Extraction {
        attempts: config.max_retries + 1,
        message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentModel for Flaky {
        async fn generate(
            &self,
            _instructions: &str,
            _user_text: &str,
            attachment: Option<ImageData>,
        ) -> Result<ModelReply, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err("503 overloaded".into());
            }
            Ok(ModelReply {
                text: format!("attached={}", attachment.is_some()),
                ..Default::default()
            })
        }
    }

    fn doc() -> PdfDocument {
        PdfDocument::from_bytes("t.pdf", b"%PDF-1.4".to_vec(), 1024).unwrap()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&PlannerConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let model = Flaky {
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let err = extract_document(&model, &doc(), &PlannerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Tt2CalError::Extraction { attempts: 1, .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caller_supplied_retries() {
        let model = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let config = PlannerConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let text = extract_document(&model, &doc(), &config).await.unwrap();
        assert_eq!(text, "attached=true");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 100), u64::MAX);
    }

    #[tokio::test]
    async fn text_requests_have_no_attachment() {
        let model = Flaky {
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let text = complete_text(&model, "sys", "hi", &PlannerConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "attached=false");
    }
}
