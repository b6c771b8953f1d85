//! Error types shared across the crate.
//!
//! Validation findings are not errors in this sense: see [`crate::rules::ValidationError`].

use std::path::PathBuf;

/// Structural (JSON) encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid architecture JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode architecture: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failures while rendering a model to text.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl RenderError {
    pub(crate) fn encode(what: &'static str, source: serde_json::Error) -> Self {
        Self::Encode { what, source }
    }
}

/// Failures of the source-patch engine.
///
/// Whenever one of these is returned the caller still holds the original
/// source text; the engine never hands back a partially patched document.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// No declaration statement carries this node id
    #[error("node declaration not found: '{0}'")]
    DeclarationNotFound(String),

    /// More than one declaration matches, so the target is ambiguous
    #[error("node '{id}' is declared {count} times; refusing to guess which to edit")]
    AmbiguousDeclaration { id: String, count: usize },

    /// An add targets an id the source already declares
    #[error("node '{0}' is already declared")]
    DuplicateDeclaration(String),

    /// No function looks like the model construction entry point
    #[error("no construction entry point found (expected a function whose name contains one of: {markers})")]
    EntryPointNotFound { markers: String },

    /// The declaration call has fewer arguments than the schema slot needs
    #[error("declaration of '{id}' has no {slot} argument at position {index}")]
    MissingArgument {
        id: String,
        slot: &'static str,
        index: usize,
    },

    /// The source text does not parse cleanly
    #[error("source has syntax errors near byte {offset}")]
    Syntax { offset: usize },

    /// The syntax backend could not be initialised
    #[error("failed to initialise source parser: {0}")]
    ParserInit(String),

    /// An edit range does not fall on valid boundaries of the text
    #[error("edit range {start}..{end} is out of bounds for source of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// The text under an edit no longer matches what the edit was planned against
    #[error("edit range {start}..{end} no longer holds the expected text")]
    StaleEdit { start: usize, end: usize },
}

/// Storage failures (models, baselines, layouts, settings).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }
}

/// A string that does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct InvalidValue {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl InvalidValue {
    pub(crate) fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_error_display() {
        let err = PatchError::DeclarationNotFound("ghost".into());
        assert_eq!(err.to_string(), "node declaration not found: 'ghost'");

        let err = PatchError::AmbiguousDeclaration {
            id: "gw".into(),
            count: 2,
        };
        assert!(err.to_string().contains("declared 2 times"));
    }

    #[test]
    fn invalid_value_display() {
        let err = InvalidValue::new("node type", "lambda", "actor, service");
        assert_eq!(
            err.to_string(),
            "invalid node type 'lambda' (expected one of: actor, service)"
        );
    }
}
