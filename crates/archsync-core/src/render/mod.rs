//! Text renderers. Each one is a pure function of the model.

mod annotated;
mod diagram;
mod source;
mod structural;

pub use annotated::AnnotatedRenderer;
pub use diagram::DiagramRenderer;
pub use source::SourceRenderer;
pub use structural::StructuralRenderer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{InvalidValue, RenderError};
use crate::model::Architecture;

pub trait Renderer {
    fn render(&self, arch: &Architecture) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// Indented JSON, the lossless reference form.
    Structural,
    /// Plain D2, one-directional.
    Diagram,
    /// D2 with `@calm` annotations; parses back into the same model.
    AnnotatedDiagram,
    /// Rust construction code using the builder DSL.
    Source,
}

impl Format {
    pub const ALL: [Format; 4] = [
        Format::Structural,
        Format::Diagram,
        Format::AnnotatedDiagram,
        Format::Source,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Structural => "json",
            Format::Diagram => "d2",
            Format::AnnotatedDiagram => "rich-d2",
            Format::Source => "source",
        }
    }

    pub fn renderer(&self) -> Box<dyn Renderer> {
        self.renderer_with_direction(diagram::DEFAULT_DIRECTION)
    }

    /// Like [`Format::renderer`], with the D2 layout direction chosen by the caller.
    pub fn renderer_with_direction(&self, direction: &str) -> Box<dyn Renderer> {
        let direction = direction.to_string();
        match self {
            Format::Structural => Box::new(StructuralRenderer),
            Format::Diagram => Box::new(DiagramRenderer { direction }),
            Format::AnnotatedDiagram => Box::new(AnnotatedRenderer { direction }),
            Format::Source => Box::<SourceRenderer>::default(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structural" => Ok(Format::Structural),
            "d2" | "diagram" => Ok(Format::Diagram),
            "rich-d2" | "annotated" | "annotated-diagram" => Ok(Format::AnnotatedDiagram),
            "source" | "rust" => Ok(Format::Source),
            _ => Err(InvalidValue::new("format", s, "json, d2, rich-d2, source")),
        }
    }
}

/// Render `arch` with the default renderer for `format`.
pub fn render(arch: &Architecture, format: Format) -> Result<String, RenderError> {
    format.renderer().render(arch)
}
