use std::ops::Range;

use super::schema::DeclarationSchema;
use crate::error::PatchError;
use crate::model::NodeType;

/// A verified byte-span replacement.
///
/// Every patch operation reduces to one of these. `expected` is the text the
/// edit was planned against; [`TextEdit::apply`] refuses to touch a document
/// where that span has changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub expected: String,
    pub replacement: String,
}

impl TextEdit {
    pub fn replace(source: &str, range: Range<usize>, replacement: impl Into<String>) -> Self {
        let expected = source.get(range.clone()).unwrap_or_default().to_string();
        Self {
            range,
            expected,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            range: at..at,
            expected: String::new(),
            replacement: text.into(),
        }
    }

    pub fn apply(&self, source: &str) -> Result<String, PatchError> {
        let Range { start, end } = self.range.clone();
        let current = source.get(start..end).ok_or(PatchError::InvalidRange {
            start,
            end,
            len: source.len(),
        })?;
        if current != self.expected {
            return Err(PatchError::StaleEdit { start, end });
        }

        let mut out = String::with_capacity(source.len() + self.replacement.len());
        out.push_str(&source[..start]);
        out.push_str(&self.replacement);
        out.push_str(&source[end..]);
        Ok(out)
    }
}

/// One positional argument of a declaration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub range: Range<usize>,
    /// Decoded value when the argument is a plain string literal.
    pub value: Option<String>,
}

/// A node declaration statement found in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: String,
    /// Enclosing function, empty at module level.
    pub function: String,
    /// Expression the declaration call is made on, e.g. `arch`.
    pub receiver: String,
    /// The declaration call itself, without chained options.
    pub call: Range<usize>,
    /// The whole statement including chained options and the semicolon.
    pub statement: Range<usize>,
    pub arguments: Vec<Argument>,
    /// First argument of the owner option, if the statement chains one.
    pub owner: Option<Argument>,
}

impl Declaration {
    pub fn argument(
        &self,
        slot: &'static str,
        index: usize,
    ) -> Result<&Argument, PatchError> {
        self.arguments
            .get(index)
            .ok_or_else(|| PatchError::MissingArgument {
                id: self.id.clone(),
                slot,
                index,
            })
    }
}

/// Values for a declaration the patcher is about to write.
#[derive(Debug, Clone, Copy)]
pub struct NewDeclaration<'a> {
    pub id: &'a str,
    pub node_type: NodeType,
    pub name: &'a str,
    pub description: &'a str,
}

/// Language backend for the source patcher.
///
/// Implementations find declarations and plan edits; they never mutate text
/// themselves. The provided methods cover everything that is plain span
/// arithmetic once the syntax tree has been consulted.
pub trait SourceSyntax {
    fn schema(&self) -> &DeclarationSchema;

    /// Every declaration in the source, in document order.
    fn declarations(&self, source: &str) -> Result<Vec<Declaration>, PatchError>;

    /// Where a new declaration for `node` goes, as a ready-to-apply insertion.
    fn insert_declaration(
        &self,
        source: &str,
        node: &NewDeclaration<'_>,
    ) -> Result<TextEdit, PatchError>;

    /// A string literal in the target language.
    fn literal(&self, value: &str) -> String;

    fn locate_declaration(&self, source: &str, id: &str) -> Result<Declaration, PatchError> {
        let mut matches: Vec<Declaration> = self
            .declarations(source)?
            .into_iter()
            .filter(|d| d.id == id)
            .collect();
        match matches.len() {
            0 => Err(PatchError::DeclarationNotFound(id.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(PatchError::AmbiguousDeclaration {
                id: id.to_string(),
                count,
            }),
        }
    }

    fn rewrite_argument(
        &self,
        source: &str,
        declaration: &Declaration,
        slot: &'static str,
        index: usize,
        value: &str,
    ) -> Result<TextEdit, PatchError> {
        let argument = declaration.argument(slot, index)?;
        Ok(TextEdit::replace(
            source,
            argument.range.clone(),
            self.literal(value),
        ))
    }

    /// Rewrite the owner option, or chain a new one onto the declaration call.
    fn set_owner(
        &self,
        source: &str,
        declaration: &Declaration,
        value: &str,
    ) -> Result<TextEdit, PatchError> {
        match &declaration.owner {
            Some(owner) => Ok(TextEdit::replace(
                source,
                owner.range.clone(),
                self.literal(value),
            )),
            None => Ok(TextEdit::insert(
                declaration.call.end,
                format!(".{}({})", self.schema().owner_option, self.literal(value)),
            )),
        }
    }

    fn remove_statement(
        &self,
        source: &str,
        declaration: &Declaration,
    ) -> Result<TextEdit, PatchError> {
        Ok(TextEdit::replace(
            source,
            statement_lines(source, declaration.statement.clone()),
            "",
        ))
    }
}

/// Widen a statement span to whole lines when it sits alone on them.
///
/// Leading indentation, a trailing `//` comment and the line break are taken
/// along; a statement sharing its line with other code keeps its exact span.
pub fn statement_lines(source: &str, span: Range<usize>) -> Range<usize> {
    let bytes = source.as_bytes();

    let line_start = source[..span.start].rfind('\n').map_or(0, |i| i + 1);
    let alone_before = source[line_start..span.start]
        .bytes()
        .all(|b| b == b' ' || b == b'\t');

    let mut end = span.end;
    while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
        end += 1;
    }
    if source[end..].starts_with("//") {
        end = source[end..].find('\n').map_or(bytes.len(), |i| end + i);
    }
    let alone_after = end == bytes.len() || bytes[end] == b'\n' || source[end..].starts_with("\r\n");

    if !(alone_before && alone_after) {
        return span;
    }
    if source[end..].starts_with("\r\n") {
        end += 2;
    } else if end < bytes.len() {
        end += 1;
    }
    line_start..end
}
