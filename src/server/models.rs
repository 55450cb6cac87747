use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineStatus, ProcessingInfo, RegionResult};
use crate::region::Region;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TranslateImageRequest {
    /// Raw base64 or a `data:` URI.
    pub image_base64: String,
    pub target_language: Option<String>,
    pub source_language: Option<String>,
    pub provider: Option<String>,
    pub min_confidence: Option<f32>,
    pub regions: Option<Vec<Region>>,
}

#[derive(Debug, Serialize)]
pub struct TranslateImageResponse {
    pub success: bool,
    pub status: PipelineStatus,
    pub image_base64: String,
    pub mime: String,
    pub translation_results: Vec<RegionResult>,
    pub processing_info: ProcessingInfo,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
