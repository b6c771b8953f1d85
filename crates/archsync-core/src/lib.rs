//! Keeps one CALM architecture description in sync across three forms: the
//! structural JSON model, D2 diagram text, and the program source that
//! builds the model.
//!
//! - [`render()`] turns a model into any of the text forms.
//! - [`parse()`] recovers a model from annotated D2, losslessly.
//! - [`apply_source_edit`] patches program source in place without
//!   regenerating it.
//! - [`validate()`] runs the default governance rules.

pub mod annotation;
pub mod builder;
pub mod containment;
pub mod diff;
pub mod error;
pub mod generate;
pub mod layout;
pub mod model;
pub mod parse;
pub mod patch;
pub mod render;
pub mod rules;
pub mod settings;
pub mod storage;

pub use builder::Builder;
pub use diff::compute_diff;
pub use error::{InvalidValue, ModelError, PatchError, RenderError, StorageError};
pub use generate::{GenerateError, Generator};
pub use model::{
    Architecture, Control, Flow, Interface, Node, NodeType, Relationship, RelationshipType,
    Requirement, Transition, TransitionDirection,
};
pub use patch::{apply_source_edit, NodeProperty, SourceEdit, SourcePatcher, SyncChange, SyncOutcome};
pub use render::{render, Format};
pub use rules::{validate, ValidationError, ValidationRule};

/// Recover a model from annotated D2 text.
///
/// Lenient by design of the format: malformed annotation values are skipped.
pub fn parse(text: &str) -> Architecture {
    parse::parse_annotated(text)
}

/// Everything model-building code needs in scope.
pub mod prelude {
    pub use crate::builder::Builder;
    pub use crate::model::{
        Architecture, Interface, NodeType, Requirement, TransitionDirection,
    };
    pub use serde_json::json;
}
