use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

use super::retry::send_with_retry;
use super::{Provider, ProviderFuture, ProviderKind, setting_or_env};
use crate::languages::baidu_code;
use crate::settings::BaiduSettings;
use crate::translation::TranslationRequest;

const DEFAULT_BASE_URL: &str = "https://fanyi-api.baidu.com/api/trans/vip/translate";

#[derive(Debug, Clone)]
pub struct Baidu {
    app_id: Option<String>,
    secret: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl Baidu {
    pub fn from_settings(settings: &BaiduSettings) -> Self {
        Self {
            app_id: setting_or_env(settings.app_id.as_deref(), &["BAIDU_API_KEY", "BAIDU_APP_ID"]),
            secret: setting_or_env(settings.secret.as_deref(), &["BAIDU_SECRET_KEY"]),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, request: &TranslationRequest) -> Result<String> {
        let (app_id, secret) = match (self.app_id.as_deref(), self.secret.as_deref()) {
            (Some(app_id), Some(secret)) => (app_id, secret),
            _ => {
                return Err(anyhow!(
                    "Baidu credentials are not configured (set BAIDU_API_KEY and BAIDU_SECRET_KEY)"
                ));
            }
        };
        let from = baidu_code(&request.source_lang).unwrap_or("auto");
        let to = match baidu_code(&request.target_lang) {
            Some("auto") | None => "en",
            Some(code) => code,
        };
        let salt = salt().to_string();
        let sign = sign(app_id, &request.source_text, &salt, secret);
        let form = [
            ("q", request.source_text.as_str()),
            ("from", from),
            ("to", to),
            ("appid", app_id),
            ("salt", salt.as_str()),
            ("sign", sign.as_str()),
        ];

        let text = send_with_retry("Baidu", || self.client.post(&self.base_url).form(&form)).await?;
        extract_translation(&text)
    }
}

impl Provider for Baidu {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Baidu
    }

    fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a> {
        Box::pin(self.call(request))
    }
}

/// MD5 over `appid + q + salt + secret`, lowercase hex.
pub(crate) fn sign(app_id: &str, query: &str, salt: &str, secret: &str) -> String {
    let mut input = String::with_capacity(app_id.len() + query.len() + salt.len() + secret.len());
    input.push_str(app_id);
    input.push_str(query);
    input.push_str(salt);
    input.push_str(secret);
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn salt() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    32768 + nanos % 32768
}

pub(crate) fn extract_translation(text: &str) -> Result<String> {
    let payload: BaiduResponse =
        serde_json::from_str(text).with_context(|| "failed to parse Baidu response JSON")?;
    if let Some(code) = payload.error_code {
        return Err(anyhow!(
            "Baidu API error {}: {}",
            code,
            payload.error_msg.unwrap_or_default()
        ));
    }
    if payload.trans_result.is_empty() {
        return Err(anyhow!("no translation returned from Baidu"));
    }
    Ok(payload
        .trans_result
        .into_iter()
        .map(|item| item.dst)
        .collect::<Vec<_>>()
        .join("\n"))
}

#[derive(Debug, Deserialize)]
struct BaiduResponse {
    #[serde(default)]
    trans_result: Vec<BaiduItem>,
    error_code: Option<serde_json::Value>,
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaiduItem {
    dst: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_with_md5_of_concatenated_fields() {
        // md5("2015063000000001apple143566028812345678")
        assert_eq!(
            sign("2015063000000001", "apple", "1435660288", "12345678"),
            "f89f9594663708c1605f3d736d01d2d4"
        );
    }

    #[test]
    fn joins_multi_segment_results() {
        let body = include_str!("../../tests/fixtures/baidu_translate.json");
        assert_eq!(
            extract_translation(body).expect("translation"),
            "Hello\nWorld"
        );
    }

    #[test]
    fn error_code_is_an_error() {
        let err = extract_translation(r#"{"error_code":"54001","error_msg":"Invalid Sign"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("54001"));
    }

    #[test]
    fn salt_stays_in_range() {
        let value = salt();
        assert!((32768..65536).contains(&value));
    }
}
