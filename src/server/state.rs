use crate::detect::Detector;
use crate::pipeline::Pipeline;
use crate::providers::Provider;
use crate::settings::PipelineSettings;

/// Shared by every request; built once at startup.
pub struct ServerState<D: Detector, P: Provider> {
    pub pipeline: Pipeline<D, P>,
    pub defaults: PipelineSettings,
}
