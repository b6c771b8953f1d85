use super::Renderer;
use crate::error::RenderError;
use crate::model::Architecture;

/// Indented JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralRenderer;

impl Renderer for StructuralRenderer {
    fn render(&self, arch: &Architecture) -> Result<String, RenderError> {
        serde_json::to_string_pretty(arch).map_err(|e| RenderError::encode("architecture", e))
    }
}
