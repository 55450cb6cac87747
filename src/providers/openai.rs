use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::send_with_retry;
use super::{Provider, ProviderFuture, ProviderKind, setting_or_env};
use crate::languages::{display_name, is_auto};
use crate::settings::OpenAISettings;
use crate::translation::TranslationRequest;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are a professional translator. Translate text faithfully and output only the translation.";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAI {
    pub fn from_settings(settings: &OpenAISettings) -> Self {
        let base_url = setting_or_env(settings.base_url.as_deref(), &["OPENAI_BASE_URL"])
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            key: setting_or_env(settings.key.as_deref(), &["OPENAI_API_KEY"]),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, request: &TranslationRequest) -> Result<String> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| anyhow!("OpenAI API key is not configured (set OPENAI_API_KEY)"))?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(request) },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let text = send_with_retry("OpenAI", || {
            self.client.post(&url).bearer_auth(key).json(&body)
        })
        .await?;
        extract_chat_content(&text)
    }
}

impl Provider for OpenAI {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a> {
        Box::pin(self.call(request))
    }
}

fn user_prompt(request: &TranslationRequest) -> String {
    let target = display_name(&request.target_lang);
    if is_auto(&request.source_lang) {
        format!(
            "Translate the following text into {}. Reply with the translation only.\n\n{}",
            target, request.source_text
        )
    } else {
        format!(
            "Translate the following {} text into {}. Reply with the translation only.\n\n{}",
            display_name(&request.source_lang),
            target,
            request.source_text
        )
    }
}

pub(crate) fn extract_chat_content(text: &str) -> Result<String> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    if let Some(error) = payload.error {
        return Err(anyhow!(
            "OpenAI API error: {}",
            error.message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from OpenAI"))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("OpenAI returned an empty translation"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let body = include_str!("../../tests/fixtures/openai_chat.json");
        assert_eq!(extract_chat_content(body).expect("content"), "Hello world");
    }

    #[test]
    fn surfaces_error_bodies() {
        let err = extract_chat_content(r#"{"error":{"message":"invalid api key"}}"#).unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
        assert!(extract_chat_content(r#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn prompt_names_languages() {
        let request = TranslationRequest {
            source_text: "你好".to_string(),
            source_lang: "zh".to_string(),
            target_lang: "ja".to_string(),
            provider: ProviderKind::OpenAI,
        };
        let prompt = user_prompt(&request);
        assert!(prompt.contains("Chinese text into Japanese"));
        assert!(prompt.ends_with("你好"));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let provider = OpenAI {
            key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            client: reqwest::Client::new(),
        };
        let request = TranslationRequest {
            source_text: "hi".to_string(),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            provider: ProviderKind::OpenAI,
        };
        let err = provider.translate(&request).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
