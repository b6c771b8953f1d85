use crate::builder::Builder;
use crate::error::RenderError;
use crate::model::Architecture;
use crate::render::{render, Format};
use crate::rules::{validate, ValidationError, ValidationRule};

/// Why a generation run produced no output.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("architecture failed validation with {} error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Build, validate, render: the pipeline behind every generated artifact.
///
/// Output is only produced for a model with no validation errors.
pub struct Generator<'r> {
    rules: Vec<&'r dyn ValidationRule>,
}

impl Default for Generator<'static> {
    fn default() -> Self {
        Self {
            rules: crate::rules::default_rules(),
        }
    }
}

impl<'r> Generator<'r> {
    pub fn with_rules(rules: Vec<&'r dyn ValidationRule>) -> Self {
        Self { rules }
    }

    pub fn check(&self, arch: &Architecture) -> Result<(), GenerateError> {
        let errors = validate(arch, &self.rules);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GenerateError::Invalid(errors))
        }
    }

    pub fn generate(
        &self,
        builder: &dyn Builder,
        format: Format,
    ) -> Result<(Architecture, String), GenerateError> {
        let arch = builder.build();
        self.check(&arch)?;
        let text = render(&arch, format)?;
        tracing::info!(id = %arch.id, %format, bytes = text.len(), "generated");
        Ok((arch, text))
    }
}
