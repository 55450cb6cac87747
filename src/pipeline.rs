//! Detection → filter → translate → remove → layout/style → composite.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compose::{Compositor, encode_image};
use crate::detect::Detector;
use crate::layout::font::{FontCatalog, FontResolver};
use crate::layout::{LayoutPlan, TextLayoutEngine};
use crate::providers::{Provider, ProviderKind, Providers};
use crate::raster::{build_mask, inpaint};
use crate::region::{Region, filter_regions};
use crate::settings::{PipelineSettings, Settings};
use crate::style::{StylePlan, StyleSelector};
use crate::translation::TranslationOrchestrator;

/// The only failures that reach the caller; everything else degrades into
/// the output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown translation provider '{0}' (expected openai, baidu or google)")]
    UnknownProvider(String),
    #[error("translation provider '{0}' is not configured")]
    ProviderNotConfigured(ProviderKind),
    #[error("text detection failed: {0:#}")]
    Detection(anyhow::Error),
    #[error("failed to encode output image: {0:#}")]
    Encode(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub image_bytes: Vec<u8>,
    pub min_confidence: f32,
    pub source_lang: String,
    pub target_lang: String,
    pub provider: String,
    /// Pre-detected regions; when present the detector is not consulted.
    pub regions: Option<Vec<Region>>,
}

impl PipelineRequest {
    pub fn new(image_bytes: Vec<u8>, defaults: &PipelineSettings) -> Self {
        Self {
            image_bytes,
            min_confidence: defaults.min_confidence,
            source_lang: defaults.source_lang.clone(),
            target_lang: defaults.target_lang.clone(),
            provider: defaults.provider.clone(),
            regions: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    NoTextDetected,
    NoTextAfterFilter,
    UnreadableImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionResult {
    pub index: usize,
    pub region: Region,
    pub translated_text: String,
    /// False when the provider call failed and the source text was kept.
    pub translated: bool,
    pub layout: LayoutPlan,
    pub style: StylePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingInfo {
    pub total_regions: usize,
    pub translated_regions: usize,
    pub source_language: String,
    pub target_language: String,
    pub provider: ProviderKind,
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub status: PipelineStatus,
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    pub mime: String,
    pub results: Vec<RegionResult>,
    pub processing_info: ProcessingInfo,
}

pub struct Pipeline<D: Detector, P: Provider> {
    detector: D,
    providers: Providers<P>,
    orchestrator: TranslationOrchestrator,
    layout: TextLayoutEngine,
    style: StyleSelector,
    compositor: Compositor,
    fonts: Arc<FontCatalog>,
    inpaint_radius: u32,
    max_font_size: u32,
}

impl<D: Detector, P: Provider> Pipeline<D, P> {
    pub fn new(
        detector: D,
        providers: Providers<P>,
        fonts: Arc<FontCatalog>,
        settings: &Settings,
    ) -> Result<Self> {
        let image = &settings.image;
        Ok(Self {
            detector,
            providers,
            orchestrator: TranslationOrchestrator::new(settings.translation_timeout),
            layout: TextLayoutEngine::from_settings(image),
            style: StyleSelector::from_settings(image)?,
            compositor: Compositor::new(Arc::new(fonts.font_database()), image)?,
            fonts,
            inpaint_radius: image.inpaint_radius,
            max_font_size: image.max_font_size,
        })
    }

    pub async fn run(&self, mut request: PipelineRequest) -> Result<PipelineOutput, PipelineError> {
        let kind = ProviderKind::from_name(&request.provider)
            .ok_or_else(|| PipelineError::UnknownProvider(request.provider.clone()))?;
        let provider = self
            .providers
            .get(kind)
            .ok_or(PipelineError::ProviderNotConfigured(kind))?;

        let image = match image::load_from_memory(&request.image_bytes) {
            Ok(image) => image,
            Err(err) => {
                warn!("input image could not be decoded: {}", err);
                return Ok(passthrough(request, PipelineStatus::UnreadableImage, kind, 0));
            }
        };

        let detected = match request.regions.take() {
            Some(regions) => regions,
            None => self
                .detector
                .detect(&image)
                .map_err(PipelineError::Detection)?,
        };
        let total_regions = detected.len();
        if detected.is_empty() {
            info!("no text detected");
            return Ok(passthrough(
                request,
                PipelineStatus::NoTextDetected,
                kind,
                total_regions,
            ));
        }

        let regions = filter_regions(detected, request.min_confidence);
        if regions.is_empty() {
            info!(
                "all {} regions fell below confidence {:.2}",
                total_regions, request.min_confidence
            );
            return Ok(passthrough(
                request,
                PipelineStatus::NoTextAfterFilter,
                kind,
                total_regions,
            ));
        }
        debug!("{} of {} regions kept", regions.len(), total_regions);

        let texts = regions
            .iter()
            .map(|region| region.text().to_string())
            .collect::<Vec<_>>();
        let outcomes = self
            .orchestrator
            .batch_translate_outcomes(provider, &texts, &request.source_lang, &request.target_lang)
            .await;

        let original = image.to_rgb8();
        let (width, height) = original.dimensions();
        let mask = build_mask(width, height, &regions);
        let cleaned = inpaint(&original, &mask, self.inpaint_radius);

        let font = self.fonts.resolve(&request.target_lang);
        let results = regions
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (region, outcome))| {
                let bbox = region.bbox();
                let translated = outcome.is_translated();
                let translated_text = outcome.into_text();
                let layout = self.layout.fit(
                    &translated_text,
                    bbox.width(),
                    bbox.height(),
                    font,
                    self.max_font_size,
                );
                let style = self.style.select(&cleaned, bbox);
                RegionResult {
                    index,
                    region,
                    translated_text,
                    translated,
                    layout,
                    style,
                }
            })
            .collect::<Vec<_>>();

        let composed = match self.compositor.draw(&cleaned, &results, font) {
            Ok(composed) => composed,
            Err(err) => {
                warn!("text rendering failed; returning cleaned image: {:#}", err);
                cleaned
            }
        };
        let (image_bytes, mime) =
            encode_image(&composed, &request.image_bytes).map_err(PipelineError::Encode)?;

        let translated_regions = results.iter().filter(|result| result.translated).count();
        info!(
            "translated {}/{} regions via {}",
            translated_regions,
            results.len(),
            kind
        );
        Ok(PipelineOutput {
            status: PipelineStatus::Completed,
            image_bytes,
            mime: mime.to_string(),
            processing_info: ProcessingInfo {
                total_regions,
                translated_regions,
                source_language: request.source_lang,
                target_language: request.target_lang,
                provider: kind,
                min_confidence: request.min_confidence,
            },
            results,
        })
    }
}

fn passthrough(
    request: PipelineRequest,
    status: PipelineStatus,
    provider: ProviderKind,
    total_regions: usize,
) -> PipelineOutput {
    let mime = infer::get(&request.image_bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream")
        .to_string();
    PipelineOutput {
        status,
        image_bytes: request.image_bytes,
        mime,
        results: Vec::new(),
        processing_info: ProcessingInfo {
            total_regions,
            translated_regions: 0,
            source_language: request.source_lang,
            target_language: request.target_lang,
            provider,
            min_confidence: request.min_confidence,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StaticDetector;
    use crate::providers::ProviderFuture;
    use crate::translation::TranslationRequest;
    use anyhow::anyhow;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct EchoProvider;

    impl Provider for EchoProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Baidu
        }

        fn translate<'a>(&'a self, request: &'a TranslationRequest) -> ProviderFuture<'a> {
            Box::pin(async move { Ok(request.source_text.to_uppercase()) })
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<Region>> {
            Err(anyhow!("tesseract exploded"))
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([240, 240, 240]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode");
        bytes
    }

    fn pipeline<D: Detector>(detector: D) -> Pipeline<D, EchoProvider> {
        Pipeline::new(
            detector,
            Providers::new().with(EchoProvider),
            Arc::new(FontCatalog::empty()),
            &Settings::default(),
        )
        .expect("pipeline")
    }

    fn request(bytes: Vec<u8>, provider: &str) -> PipelineRequest {
        PipelineRequest {
            image_bytes: bytes,
            min_confidence: 0.5,
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            provider: provider.to_string(),
            regions: None,
        }
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected_before_any_work() {
        let err = pipeline(FailingDetector)
            .run(request(png(4, 4), "deepl"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownProvider(name) if name == "deepl"));
    }

    #[tokio::test]
    async fn provider_missing_from_pool_is_a_configuration_error() {
        let err = pipeline(StaticDetector::default())
            .run(request(png(4, 4), "google"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ProviderNotConfigured(ProviderKind::Google)
        ));
    }

    #[tokio::test]
    async fn detector_failure_propagates() {
        let err = pipeline(FailingDetector)
            .run(request(png(4, 4), "baidu"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tesseract exploded"));
    }

    #[tokio::test]
    async fn undecodable_bytes_pass_through() {
        let output = pipeline(FailingDetector)
            .run(request(b"not an image".to_vec(), "baidu"))
            .await
            .expect("run");
        assert_eq!(output.status, PipelineStatus::UnreadableImage);
        assert_eq!(output.image_bytes, b"not an image");
    }

    #[tokio::test]
    async fn low_confidence_regions_end_in_empty_outcome() {
        let region = Region::rect(1.0, 1.0, 10.0, 5.0, "faint", 0.2).expect("region");
        let bytes = png(20, 10);
        let output = pipeline(StaticDetector::new(vec![region]))
            .run(request(bytes.clone(), "baidu"))
            .await
            .expect("run");
        assert_eq!(output.status, PipelineStatus::NoTextAfterFilter);
        assert_eq!(output.image_bytes, bytes);
        assert_eq!(output.processing_info.total_regions, 1);
        assert!(output.results.is_empty());
    }

    #[tokio::test]
    async fn supplied_regions_bypass_the_detector() {
        let mut supplied = request(png(40, 20), "baidu");
        supplied.regions = Some(vec![
            Region::rect(2.0, 2.0, 30.0, 12.0, "sale", 0.95).expect("region"),
        ]);
        let output = pipeline(FailingDetector).run(supplied).await.expect("run");
        assert_eq!(output.status, PipelineStatus::Completed);
        assert_eq!(output.results[0].translated_text, "SALE");
    }

    #[tokio::test]
    async fn completed_run_keeps_region_order() {
        let regions = vec![
            Region::rect(2.0, 2.0, 60.0, 16.0, "first", 0.9).expect("a"),
            Region::rect(2.0, 30.0, 60.0, 16.0, "dropped", 0.1).expect("b"),
            Region::rect(2.0, 50.0, 60.0, 16.0, "second", 0.8).expect("c"),
        ];
        let output = pipeline(StaticDetector::new(regions))
            .run(request(png(80, 70), "baidu"))
            .await
            .expect("run");
        assert_eq!(output.status, PipelineStatus::Completed);
        assert_eq!(output.mime, "image/png");
        let texts = output
            .results
            .iter()
            .map(|result| (result.index, result.translated_text.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(texts, vec![(0, "FIRST"), (1, "SECOND")]);
        assert!(output.results.iter().all(|result| result.translated));
        assert!(output.results.iter().all(|result| result.style.text_color == [0, 0, 0]));
        let decoded = image::load_from_memory(&output.image_bytes).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (80, 70));
    }
}
