use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use super::retry::send_with_retry;
use super::{Provider, ProviderFuture, ProviderKind, setting_or_env};
use crate::languages::is_auto;
use crate::settings::GoogleSettings;
use crate::translation::TranslationRequest;

const DEFAULT_BASE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Clone)]
pub struct Google {
    key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl Google {
    pub fn from_settings(settings: &GoogleSettings) -> Self {
        Self {
            key: setting_or_env(settings.key.as_deref(), &["GOOGLE_API_KEY"]),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, request: &TranslationRequest) -> Result<String> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| anyhow!("Google API key is not configured (set GOOGLE_API_KEY)"))?;
        let form = form_fields(key, request);
        let text = send_with_retry("Google", || self.client.post(&self.base_url).form(&form)).await?;
        extract_translation(&text)
    }
}

impl Provider for Google {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a> {
        Box::pin(self.call(request))
    }
}

/// `source` is omitted for `auto` so the service detects it.
fn form_fields<'a>(key: &'a str, request: &'a TranslationRequest) -> Vec<(&'static str, &'a str)> {
    let mut form = vec![
        ("key", key),
        ("q", request.source_text.as_str()),
        ("target", request.target_lang.trim()),
        ("format", "text"),
    ];
    if !is_auto(&request.source_lang) {
        form.push(("source", request.source_lang.trim()));
    }
    form
}

pub(crate) fn extract_translation(text: &str) -> Result<String> {
    let payload: GoogleResponse =
        serde_json::from_str(text).with_context(|| "failed to parse Google response JSON")?;
    if let Some(error) = payload.error {
        return Err(anyhow!(
            "Google API error: {}",
            error.message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    payload
        .data
        .and_then(|data| data.translations.into_iter().next())
        .map(|item| item.translated_text)
        .ok_or_else(|| anyhow!("no translation returned from Google"))
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    data: Option<GoogleData>,
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleData {
    #[serde(default)]
    translations: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleItem {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: &str) -> TranslationRequest {
        TranslationRequest {
            source_text: "Hello world".to_string(),
            source_lang: source.to_string(),
            target_lang: "fr".to_string(),
            provider: ProviderKind::Google,
        }
    }

    #[test]
    fn extracts_first_translation() {
        let body = include_str!("../../tests/fixtures/google_translate.json");
        assert_eq!(
            extract_translation(body).expect("translation"),
            "Bonjour le monde"
        );
    }

    #[test]
    fn error_message_is_surfaced() {
        let err = extract_translation(r#"{"error":{"code":400,"message":"API key not valid"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn source_is_sent_only_when_known() {
        let auto = request("auto");
        assert!(!form_fields("k", &auto).iter().any(|(name, _)| *name == "source"));
        let english = request("en");
        assert!(
            form_fields("k", &english)
                .iter()
                .any(|(name, value)| *name == "source" && *value == "en")
        );
    }
}
