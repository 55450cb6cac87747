use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

pub mod compose;
pub mod detect;
pub mod languages;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod raster;
pub mod region;
pub mod server;
pub mod settings;
pub mod style;
pub mod translation;

pub use detect::{Detector, StaticDetector, TesseractDetector};
pub use layout::font::{FontCatalog, FontFace, FontResolver};
pub use layout::{LayoutPlan, TextLayoutEngine};
pub use pipeline::{
    Pipeline, PipelineError, PipelineOutput, PipelineRequest, PipelineStatus, ProcessingInfo,
    RegionResult,
};
pub use providers::{Provider, ProviderFuture, ProviderImpl, ProviderKind, Providers};
pub use region::{BBox, Point, Region, filter_regions};
pub use style::{StylePlan, StyleSelector};
pub use translation::{TranslationOrchestrator, TranslationOutcome, TranslationRequest};

#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub target_lang: Option<String>,
    pub source_lang: Option<String>,
    pub provider: Option<String>,
    pub min_confidence: Option<f32>,
    pub regions_path: Option<PathBuf>,
    pub ocr_langs: String,
    pub settings_path: Option<PathBuf>,
}

pub async fn run(config: Config) -> Result<PipelineOutput> {
    let settings = settings::load_settings(config.settings_path.as_deref())?;
    let bytes = std::fs::read(&config.input)
        .with_context(|| format!("failed to read image: {}", config.input.display()))?;

    let mut request = PipelineRequest::new(bytes, &settings.pipeline);
    if let Some(lang) = config.target_lang {
        request.target_lang = lang;
    }
    if let Some(lang) = config.source_lang {
        request.source_lang = lang;
    }
    if let Some(provider) = config.provider {
        request.provider = provider;
    }
    if let Some(min_confidence) = config.min_confidence {
        request.min_confidence = min_confidence;
    }

    let fonts = Arc::new(FontCatalog::load(&settings.fonts));
    let providers = Providers::from_settings(&settings);
    match config.regions_path {
        Some(path) => {
            let detector = StaticDetector::from_json_file(&path)?;
            let pipeline = Pipeline::new(detector, providers, fonts, &settings)?;
            Ok(pipeline.run(request).await?)
        }
        None => {
            let detector = TesseractDetector::new(config.ocr_langs);
            let pipeline = Pipeline::new(detector, providers, fonts, &settings)?;
            Ok(pipeline.run(request).await?)
        }
    }
}

/// File extension for an output mime type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "png",
    }
}
