use anyhow::{Result, anyhow};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use crate::settings::Settings;
use crate::translation::TranslationRequest;

mod baidu;
mod google;
mod openai;
mod retry;

pub use baidu::Baidu;
pub use google::Google;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Baidu,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAI,
        ProviderKind::Baidu,
        ProviderKind::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Baidu => "baidu",
            ProviderKind::Google => "google",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAI),
            "baidu" => Some(ProviderKind::Baidu),
            "google" => Some(ProviderKind::Google),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        ProviderKind::from_name(value).ok_or_else(|| {
            anyhow!(
                "unknown translation provider '{}' (expected openai, baidu or google)",
                value.trim()
            )
        })
    }
}

pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A remote service that turns one source string into one translated string.
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a>;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAI(OpenAI),
    Baidu(Baidu),
    Google(Google),
}

impl Provider for ProviderImpl {
    fn kind(&self) -> ProviderKind {
        match self {
            ProviderImpl::OpenAI(_) => ProviderKind::OpenAI,
            ProviderImpl::Baidu(_) => ProviderKind::Baidu,
            ProviderImpl::Google(_) => ProviderKind::Google,
        }
    }

    fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a> {
        match self {
            ProviderImpl::OpenAI(provider) => provider.translate(request),
            ProviderImpl::Baidu(provider) => provider.translate(request),
            ProviderImpl::Google(provider) => provider.translate(request),
        }
    }
}

pub fn build_provider(kind: ProviderKind, settings: &Settings) -> ProviderImpl {
    match kind {
        ProviderKind::OpenAI => ProviderImpl::OpenAI(OpenAI::from_settings(&settings.openai)),
        ProviderKind::Baidu => ProviderImpl::Baidu(Baidu::from_settings(&settings.baidu)),
        ProviderKind::Google => ProviderImpl::Google(Google::from_settings(&settings.google)),
    }
}

/// The configured adapters, keyed by kind. Built once and shared read-only.
pub struct Providers<P: Provider> {
    entries: HashMap<ProviderKind, P>,
}

impl<P: Provider> Providers<P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, provider: P) -> Self {
        self.entries.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&P> {
        self.entries.get(&kind)
    }
}

impl<P: Provider> Default for Providers<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl Providers<ProviderImpl> {
    /// Every adapter is registered even without credentials; a missing key
    /// surfaces as a per-call failure.
    pub fn from_settings(settings: &Settings) -> Self {
        ProviderKind::ALL
            .into_iter()
            .fold(Self::new(), |providers, kind| {
                providers.with(build_provider(kind, settings))
            })
    }
}

pub(crate) fn setting_or_env(value: Option<&str>, keys: &[&str]) -> Option<String> {
    if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
        return Some(value.trim().to_string());
    }
    keys.iter().find_map(|key| get_env(key))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_provider_names() {
        assert_eq!(
            "OpenAI".parse::<ProviderKind>().expect("openai"),
            ProviderKind::OpenAI
        );
        assert_eq!(
            " baidu ".parse::<ProviderKind>().expect("baidu"),
            ProviderKind::Baidu
        );
        assert_eq!(
            "google".parse::<ProviderKind>().expect("google"),
            ProviderKind::Google
        );
        let err = "deepl".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("deepl"));
    }

    #[test]
    fn pool_from_settings_registers_every_kind() {
        let providers = Providers::from_settings(&Settings::default());
        for kind in ProviderKind::ALL {
            let provider = providers.get(kind).expect("registered");
            assert_eq!(provider.kind(), kind);
        }
    }

    #[test]
    fn explicit_setting_wins_over_environment() {
        assert_eq!(
            setting_or_env(Some(" sk-test "), &["IMAGE_TEXT_TRANSLATOR_UNSET_KEY"]),
            Some("sk-test".to_string())
        );
        assert_eq!(
            setting_or_env(Some("  "), &["IMAGE_TEXT_TRANSLATOR_UNSET_KEY"]),
            None
        );
    }
}
