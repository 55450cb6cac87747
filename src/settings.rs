use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub translation_timeout: Duration,
    pub openai: OpenAISettings,
    pub baidu: BaiduSettings,
    pub google: GoogleSettings,
    pub image: ImageSettings,
    pub fonts: FontSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_confidence: f32,
    pub source_lang: String,
    pub target_lang: String,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct OpenAISettings {
    pub key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default)]
pub struct BaiduSettings {
    pub app_id: Option<String>,
    pub secret: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GoogleSettings {
    pub key: Option<String>,
    pub base_url: Option<String>,
}

/// Tunables for removal, layout and styling. The thresholds are empirical.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub inpaint_radius: u32,
    pub max_font_size: u32,
    pub min_font_size: u32,
    pub font_size_step: u32,
    pub luminance_threshold: f32,
    pub busyness_threshold: f32,
    pub panel_padding: f32,
    pub panel_color: String,
    pub panel_opacity: f32,
    pub light_text_color: String,
    pub dark_text_color: String,
}

#[derive(Debug, Clone, Default)]
pub struct FontSettings {
    pub default_path: Option<String>,
    pub default_family: Option<String>,
    pub fallback_families: Vec<String>,
    pub load_system_fonts: bool,
    pub paths: HashMap<String, String>,
    pub families: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings {
                min_confidence: 0.5,
                source_lang: "auto".to_string(),
                target_lang: "en".to_string(),
                provider: "openai".to_string(),
            },
            translation_timeout: Duration::from_secs(30),
            openai: OpenAISettings {
                key: None,
                base_url: None,
                model: "gpt-3.5-turbo".to_string(),
                max_tokens: 500,
                temperature: 0.3,
            },
            baidu: BaiduSettings::default(),
            google: GoogleSettings::default(),
            image: ImageSettings::default(),
            fonts: FontSettings {
                load_system_fonts: true,
                ..FontSettings::default()
            },
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            inpaint_radius: 3,
            max_font_size: 50,
            min_font_size: 10,
            font_size_step: 2,
            luminance_threshold: 128.0,
            busyness_threshold: 30.0,
            panel_padding: 2.0,
            panel_color: "#ffffff".to_string(),
            panel_opacity: 0.5,
            light_text_color: "#ffffff".to_string(),
            dark_text_color: "#000000".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    pipeline: Option<PipelineFile>,
    translation: Option<TranslationFile>,
    providers: Option<ProvidersFile>,
    image: Option<ImageFile>,
    fonts: Option<FontsFile>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    min_confidence: Option<f32>,
    source_lang: Option<String>,
    target_lang: Option<String>,
    provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationFile {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersFile {
    openai: Option<OpenAIFile>,
    baidu: Option<BaiduFile>,
    google: Option<GoogleFile>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIFile {
    key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct BaiduFile {
    app_id: Option<String>,
    secret: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleFile {
    key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageFile {
    inpaint_radius: Option<u32>,
    max_font_size: Option<u32>,
    min_font_size: Option<u32>,
    font_size_step: Option<u32>,
    luminance_threshold: Option<f32>,
    busyness_threshold: Option<f32>,
    panel_padding: Option<f32>,
    panel_color: Option<String>,
    panel_opacity: Option<f32>,
    light_text_color: Option<String>,
    dark_text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FontsFile {
    default_path: Option<String>,
    default_family: Option<String>,
    fallback_families: Option<Vec<String>>,
    load_system_fonts: Option<bool>,
    paths: Option<HashMap<String, String>>,
    families: Option<HashMap<String, String>>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let embedded: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse embedded settings")?;
    settings.merge(embedded);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            settings.merge_file(&path)?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(pipeline) = incoming.pipeline {
            if let Some(value) = pipeline.min_confidence {
                if (0.0..=1.0).contains(&value) {
                    self.pipeline.min_confidence = value;
                }
            }
            merge_string(&mut self.pipeline.source_lang, pipeline.source_lang);
            merge_string(&mut self.pipeline.target_lang, pipeline.target_lang);
            merge_string(&mut self.pipeline.provider, pipeline.provider);
        }
        if let Some(translation) = incoming.translation {
            if let Some(secs) = translation.timeout_secs {
                if secs > 0 {
                    self.translation_timeout = Duration::from_secs(secs);
                }
            }
        }
        if let Some(providers) = incoming.providers {
            if let Some(openai) = providers.openai {
                merge_optional(&mut self.openai.key, openai.key);
                merge_optional(&mut self.openai.base_url, openai.base_url);
                merge_string(&mut self.openai.model, openai.model);
                merge_positive_u32(&mut self.openai.max_tokens, openai.max_tokens);
                if let Some(value) = openai.temperature {
                    if value >= 0.0 {
                        self.openai.temperature = value;
                    }
                }
            }
            if let Some(baidu) = providers.baidu {
                merge_optional(&mut self.baidu.app_id, baidu.app_id);
                merge_optional(&mut self.baidu.secret, baidu.secret);
                merge_optional(&mut self.baidu.base_url, baidu.base_url);
            }
            if let Some(google) = providers.google {
                merge_optional(&mut self.google.key, google.key);
                merge_optional(&mut self.google.base_url, google.base_url);
            }
        }
        if let Some(image) = incoming.image {
            merge_positive_u32(&mut self.image.inpaint_radius, image.inpaint_radius);
            merge_positive_u32(&mut self.image.max_font_size, image.max_font_size);
            merge_positive_u32(&mut self.image.min_font_size, image.min_font_size);
            merge_positive_u32(&mut self.image.font_size_step, image.font_size_step);
            merge_positive_f32(
                &mut self.image.luminance_threshold,
                image.luminance_threshold,
            );
            merge_positive_f32(&mut self.image.busyness_threshold, image.busyness_threshold);
            if let Some(value) = image.panel_padding {
                if value >= 0.0 {
                    self.image.panel_padding = value;
                }
            }
            merge_string(&mut self.image.panel_color, image.panel_color);
            if let Some(value) = image.panel_opacity {
                self.image.panel_opacity = value.clamp(0.0, 1.0);
            }
            merge_string(&mut self.image.light_text_color, image.light_text_color);
            merge_string(&mut self.image.dark_text_color, image.dark_text_color);
        }
        if let Some(fonts) = incoming.fonts {
            merge_optional(&mut self.fonts.default_path, fonts.default_path);
            merge_optional(&mut self.fonts.default_family, fonts.default_family);
            if let Some(families) = fonts.fallback_families {
                self.fonts.fallback_families = families
                    .into_iter()
                    .filter(|family| !family.trim().is_empty())
                    .collect();
            }
            if let Some(load) = fonts.load_system_fonts {
                self.fonts.load_system_fonts = load;
            }
            for (lang, path) in fonts.paths.unwrap_or_default() {
                if !path.trim().is_empty() {
                    self.fonts.paths.insert(lang.to_ascii_lowercase(), path);
                }
            }
            for (lang, family) in fonts.families.unwrap_or_default() {
                if !family.trim().is_empty() {
                    self.fonts.families.insert(lang.to_ascii_lowercase(), family);
                }
            }
        }
    }
}

fn merge_string(target: &mut String, incoming: Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *target = value.trim().to_string();
        }
    }
}

fn merge_optional(target: &mut Option<String>, incoming: Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *target = Some(value.trim().to_string());
        }
    }
}

fn merge_positive_u32(target: &mut u32, incoming: Option<u32>) {
    if let Some(value) = incoming {
        if value > 0 {
            *target = value;
        }
    }
}

fn merge_positive_f32(target: &mut f32, incoming: Option<f32>) {
    if let Some(value) = incoming {
        if value > 0.0 {
            *target = value;
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".image-text-translator"))
        }
    })
}
