use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::languages::{detect_language, is_auto};
use crate::providers::{Provider, ProviderKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub provider: ProviderKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum TranslationOutcome {
    Translated(String),
    /// Carries the source text so callers always have something to render.
    Failed(String),
}

impl TranslationOutcome {
    pub fn text(&self) -> &str {
        match self {
            TranslationOutcome::Translated(text) | TranslationOutcome::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TranslationOutcome::Translated(text) | TranslationOutcome::Failed(text) => text,
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, TranslationOutcome::Translated(_))
    }
}

/// Fans one request per text out to a provider and waits for all of them.
#[derive(Debug, Clone)]
pub struct TranslationOrchestrator {
    timeout: Duration,
}

impl TranslationOrchestrator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn batch_translate<P: Provider>(
        &self,
        provider: &P,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Vec<String> {
        self.batch_translate_outcomes(provider, texts, source_lang, target_lang)
            .await
            .into_iter()
            .map(TranslationOutcome::into_text)
            .collect()
    }

    /// Output has the same length and order as `texts`. Never fails: every
    /// error degrades to `Failed(original)` for that index only.
    pub async fn batch_translate_outcomes<P: Provider>(
        &self,
        provider: &P,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Vec<TranslationOutcome> {
        let requests = texts
            .iter()
            .map(|text| TranslationRequest {
                source_text: text.clone(),
                source_lang: resolve_source(text, source_lang),
                target_lang: target_lang.trim().to_string(),
                provider: provider.kind(),
            })
            .collect::<Vec<_>>();

        let tasks = requests
            .iter()
            .enumerate()
            .map(|(index, request)| self.translate_one(provider, index, request));
        join_all(tasks).await
    }

    async fn translate_one<P: Provider>(
        &self,
        provider: &P,
        index: usize,
        request: &TranslationRequest,
    ) -> TranslationOutcome {
        if request.source_text.trim().is_empty() {
            return TranslationOutcome::Translated(request.source_text.clone());
        }
        match timeout(self.timeout, provider.translate(request)).await {
            Ok(Ok(text)) => {
                debug!(
                    "translated item {} via {} ({} -> {})",
                    index, request.provider, request.source_lang, request.target_lang
                );
                TranslationOutcome::Translated(text)
            }
            Ok(Err(err)) => {
                warn!(
                    "translation of item {} via {} failed: {:#}",
                    index, request.provider, err
                );
                TranslationOutcome::Failed(request.source_text.clone())
            }
            Err(_) => {
                warn!(
                    "translation of item {} via {} timed out after {:.1}s",
                    index,
                    request.provider,
                    self.timeout.as_secs_f32()
                );
                TranslationOutcome::Failed(request.source_text.clone())
            }
        }
    }
}

fn resolve_source(text: &str, source_lang: &str) -> String {
    if is_auto(source_lang) {
        detect_language(text).to_string()
    } else {
        source_lang.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderFuture;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct StubProvider {
        seen: Mutex<Vec<TranslationRequest>>,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Provider for StubProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Google
        }

        fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a> {
            self.seen.lock().expect("lock").push(request.clone());
            Box::pin(async move {
                match request.source_text.as_str() {
                    "slow" => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok("never".to_string())
                    }
                    "broken" => Err(anyhow!("malformed response")),
                    text => Ok(format!("[{}] {}", request.target_lang, text)),
                }
            })
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[tokio::test]
    async fn timed_out_item_falls_back_without_delaying_siblings() {
        let orchestrator = TranslationOrchestrator::new(Duration::from_millis(50));
        let provider = StubProvider::new();
        let output = orchestrator
            .batch_translate(&provider, &texts(&["one", "slow", "three"]), "en", "fr")
            .await;
        assert_eq!(output, vec!["[fr] one", "slow", "[fr] three"]);
    }

    #[tokio::test]
    async fn failures_are_tagged_and_order_is_kept() {
        let orchestrator = TranslationOrchestrator::new(Duration::from_secs(1));
        let provider = StubProvider::new();
        let outcomes = orchestrator
            .batch_translate_outcomes(&provider, &texts(&["broken", "ok", "  "]), "en", "de")
            .await;
        assert_eq!(
            outcomes,
            vec![
                TranslationOutcome::Failed("broken".to_string()),
                TranslationOutcome::Translated("[de] ok".to_string()),
                TranslationOutcome::Translated("  ".to_string()),
            ]
        );
        // Blank input never reaches the provider.
        assert_eq!(provider.seen.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn auto_source_is_resolved_per_item() {
        let orchestrator = TranslationOrchestrator::new(Duration::from_secs(1));
        let provider = StubProvider::new();
        orchestrator
            .batch_translate(&provider, &texts(&["你好", "Привет", "hello"]), "auto", "en")
            .await;
        let seen = provider.seen.lock().expect("lock");
        let sources = seen
            .iter()
            .map(|request| request.source_lang.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sources, vec!["zh", "ru", "en"]);
        assert!(seen.iter().all(|request| request.provider == ProviderKind::Google));
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let orchestrator = TranslationOrchestrator::new(Duration::from_secs(1));
        let output = orchestrator
            .batch_translate(&StubProvider::new(), &[], "auto", "en")
            .await;
        assert!(output.is_empty());
    }
}
