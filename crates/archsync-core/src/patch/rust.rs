//! Rust backend for the source patcher, built on tree-sitter.

use tree_sitter::{Node, Parser, Tree};

use super::schema::DeclarationSchema;
use super::syntax::{Argument, Declaration, NewDeclaration, SourceSyntax, TextEdit};
use crate::error::PatchError;

const FALLBACK_RECEIVER: &str = "arch";
const INDENT_STEP: &str = "    ";

/// Finds builder-DSL declarations such as
/// `arch.define_node("api", NodeType::Service, "API", "...")` in Rust source.
#[derive(Debug, Clone, Default)]
pub struct RustSyntax {
    schema: DeclarationSchema,
}

impl RustSyntax {
    pub fn new(schema: DeclarationSchema) -> Self {
        Self { schema }
    }

    fn parse(&self, source: &str) -> Result<Tree, PatchError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .map_err(|e| PatchError::ParserInit(e.to_string()))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| PatchError::ParserInit("parser produced no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(PatchError::Syntax {
                offset: first_error(root).unwrap_or(0),
            });
        }
        Ok(tree)
    }

    fn collect(&self, node: Node<'_>, source: &str, out: &mut Vec<Declaration>) {
        if node.kind() == "call_expression" {
            if let Some(declaration) = self.declaration(node, source) {
                out.push(declaration);
            }
        }
        for i in 0..node.named_child_count() {
            if let Some(child) = node.named_child(i) {
                self.collect(child, source, out);
            }
        }
    }

    /// Interpret a call expression as a declaration, if it is one.
    fn declaration(&self, call: Node<'_>, source: &str) -> Option<Declaration> {
        let function = call.child_by_field_name("function")?;
        let receiver = match function.kind() {
            "field_expression" => {
                let field = function.child_by_field_name("field")?;
                if text(field, source) != self.schema.call {
                    return None;
                }
                text(function.child_by_field_name("value")?, source).to_string()
            }
            "identifier" | "scoped_identifier" => {
                let path = text(function, source);
                if path.rsplit("::").next() != Some(self.schema.call.as_str()) {
                    return None;
                }
                String::new()
            }
            _ => return None,
        };

        let arguments = arguments(call, source);
        let id = arguments.get(self.schema.id_argument)?.value.clone()?;

        Some(Declaration {
            id,
            function: enclosing_function(call, source).unwrap_or_default(),
            receiver,
            call: call.byte_range(),
            statement: statement_of(call).byte_range(),
            arguments,
            owner: self.owner_option(call, source),
        })
    }

    /// Walk up the option chain hanging off a declaration call. The last owner
    /// option applied is the one that sticks.
    fn owner_option(&self, call: Node<'_>, source: &str) -> Option<Argument> {
        let mut owner = None;
        let mut current = call;
        while let Some(field) = current.parent().filter(|p| p.kind() == "field_expression") {
            let Some(outer) = field.parent().filter(|p| p.kind() == "call_expression") else {
                break;
            };
            let is_option = field
                .child_by_field_name("field")
                .is_some_and(|f| text(f, source) == self.schema.owner_option);
            if is_option {
                if let Some(first) = arguments(outer, source).into_iter().next() {
                    owner = Some(first);
                }
            }
            current = outer;
        }
        owner
    }

    fn entry_point<'t>(&self, node: Node<'t>, source: &str) -> Option<Node<'t>> {
        if node.kind() == "function_item" {
            let name = node.child_by_field_name("name").map(|n| text(n, source));
            if name.is_some_and(|n| self.schema.is_entry_point(n)) {
                return Some(node);
            }
        }
        for i in 0..node.named_child_count() {
            if let Some(found) = node
                .named_child(i)
                .and_then(|child| self.entry_point(child, source))
            {
                return Some(found);
            }
        }
        None
    }

    fn statement_text(&self, receiver: &str, node: &NewDeclaration<'_>) -> String {
        let mut args = vec![String::from("\"\""); self.schema.arity()];
        args[self.schema.id_argument] = self.literal(node.id);
        args[self.schema.type_argument] =
            format!("{}{}", self.schema.type_path, node.node_type.variant_name());
        args[self.schema.name_argument] = self.literal(node.name);
        args[self.schema.description_argument] = self.literal(node.description);

        let call = format!("{}({})", self.schema.call, args.join(", "));
        if receiver.is_empty() {
            format!("{};", call)
        } else {
            format!("{}.{};", receiver, call)
        }
    }
}

impl SourceSyntax for RustSyntax {
    fn schema(&self) -> &DeclarationSchema {
        &self.schema
    }

    fn declarations(&self, source: &str) -> Result<Vec<Declaration>, PatchError> {
        let tree = self.parse(source)?;
        let mut out = Vec::new();
        self.collect(tree.root_node(), source, &mut out);
        Ok(out)
    }

    fn insert_declaration(
        &self,
        source: &str,
        node: &NewDeclaration<'_>,
    ) -> Result<TextEdit, PatchError> {
        let tree = self.parse(source)?;
        let entry = self
            .entry_point(tree.root_node(), source)
            .ok_or_else(|| PatchError::EntryPointNotFound {
                markers: self.schema.entry_markers.join(", "),
            })?;
        let function_name = entry
            .child_by_field_name("name")
            .map(|n| text(n, source).to_string())
            .unwrap_or_default();
        let body = entry
            .child_by_field_name("body")
            .ok_or_else(|| PatchError::EntryPointNotFound {
                markers: self.schema.entry_markers.join(", "),
            })?;

        let mut existing = Vec::new();
        self.collect(entry, source, &mut existing);
        let receiver = existing
            .iter()
            .find(|d| d.function == function_name)
            .map(|d| d.receiver.clone())
            .or_else(|| parameter_receiver(entry, source))
            .or_else(|| let_receiver(body, source))
            .unwrap_or_else(|| FALLBACK_RECEIVER.to_string());

        let statement = self.statement_text(&receiver, node);
        Ok(insertion(source, body, &statement))
    }

    fn literal(&self, value: &str) -> String {
        format!("{:?}", value)
    }
}

/// Place a statement at the end of a function body, ahead of any tail
/// expression or trailing `return`.
fn insertion(source: &str, body: Node<'_>, statement: &str) -> TextEdit {
    let items = statements(body);

    let Some(last) = items.last().copied() else {
        let open = body.start_byte();
        let brace_indent = line_indent(source, open);
        let inner = format!("{}{}", brace_indent, INDENT_STEP);
        let between = &source[open + 1..body.end_byte().saturating_sub(1).max(open + 1)];
        let mut text = format!("\n{}{}", inner, statement);
        if !between.contains('\n') {
            text.push('\n');
            text.push_str(&brace_indent);
        }
        return TextEdit::insert(open + 1, text);
    };

    if is_tail(last, source) {
        let at = last.start_byte();
        let line_start = source[..at].rfind('\n').map_or(0, |i| i + 1);
        let prefix = &source[line_start..at];
        if prefix.bytes().all(|b| b == b' ' || b == b'\t') {
            return TextEdit::insert(line_start, format!("{}{}\n", prefix, statement));
        }
        return TextEdit::insert(at, format!("{} ", statement));
    }

    let indent = line_indent(source, last.start_byte());
    TextEdit::insert(last.end_byte(), format!("\n{}{}", indent, statement))
}

/// A trailing expression or `return` that new statements must precede.
fn is_tail(node: Node<'_>, source: &str) -> bool {
    match node.kind() {
        "return_expression" => true,
        "expression_statement" => node
            .named_child(0)
            .is_some_and(|e| e.kind() == "return_expression"),
        "let_declaration" | "empty_statement" => false,
        kind if kind.ends_with("_item") => false,
        _ => !text(node, source).trim_end().ends_with(';'),
    }
}

fn statements(block: Node<'_>) -> Vec<Node<'_>> {
    (0..block.named_child_count())
        .filter_map(|i| block.named_child(i))
        .filter(|n| !is_comment(*n))
        .collect()
}

fn parameter_receiver(function: Node<'_>, source: &str) -> Option<String> {
    let params = function.child_by_field_name("parameters")?;
    (0..params.named_child_count())
        .filter_map(|i| params.named_child(i))
        .filter(|p| p.kind() == "parameter")
        .filter_map(|p| p.child_by_field_name("pattern"))
        .find(|p| p.kind() == "identifier")
        .map(|p| text(p, source).to_string())
}

fn let_receiver(body: Node<'_>, source: &str) -> Option<String> {
    statements(body)
        .into_iter()
        .filter(|s| s.kind() == "let_declaration")
        .filter_map(|s| s.child_by_field_name("pattern"))
        .find(|p| p.kind() == "identifier")
        .map(|p| text(p, source).to_string())
}

fn arguments(call: Node<'_>, source: &str) -> Vec<Argument> {
    let Some(list) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    (0..list.named_child_count())
        .filter_map(|i| list.named_child(i))
        .filter(|n| !is_comment(*n))
        .map(|n| Argument {
            range: n.byte_range(),
            value: string_value(n, source),
        })
        .collect()
}

/// The statement a call belongs to: its outermost ancestor inside a block.
fn statement_of(call: Node<'_>) -> Node<'_> {
    let mut current = call;
    while let Some(parent) = current.parent() {
        if parent.kind() == "block" {
            return current;
        }
        current = parent;
    }
    call
}

fn enclosing_function(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "function_item" {
            return n
                .child_by_field_name("name")
                .map(|name| text(name, source).to_string());
        }
        current = n.parent();
    }
    None
}

fn first_error(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_byte());
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .filter(|c| c.has_error())
        .find_map(first_error)
}

fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment")
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

fn line_indent(source: &str, at: usize) -> String {
    let line_start = source[..at].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    let raw = text(node, source);
    match node.kind() {
        "string_literal" => unescape(raw.strip_prefix('"')?.strip_suffix('"')?),
        "raw_string_literal" => {
            let body = raw.strip_prefix('r')?;
            let hashes = body.len() - body.trim_start_matches('#').len();
            let fence = "#".repeat(hashes);
            let inner = body
                .strip_prefix(fence.as_str())?
                .strip_prefix('"')?
                .strip_suffix(fence.as_str())?
                .strip_suffix('"')?;
            Some(inner.to_string())
        }
        _ => None,
    }
}

/// Decode the body of a Rust string literal.
fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(char::from(u8::from_str_radix(&hex, 16).ok()?));
            }
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let code = u32::from_str_radix(&hex.replace('_', ""), 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            '\n' | '\r' => {
                // Line continuation.
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"use archsync_core::prelude::*;

pub fn build_architecture() -> Architecture {
    let mut arch = Architecture::new("shop", "Shop", "");

    arch.define_node("api", NodeType::Service, "API", "Public API")
        .with_owner("platform");
    arch.define_node("db", NodeType::Database, r"Orders DB", "line\none"); // primary

    arch
}
"#;

    fn syntax() -> RustSyntax {
        RustSyntax::default()
    }

    #[test]
    fn finds_declarations_with_decoded_arguments() {
        let found = syntax().declarations(SOURCE).unwrap();
        assert_eq!(found.len(), 2);

        let api = &found[0];
        assert_eq!(api.id, "api");
        assert_eq!(api.receiver, "arch");
        assert_eq!(api.function, "build_architecture");
        assert_eq!(api.arguments[2].value.as_deref(), Some("API"));
        let owner = api.owner.as_ref().unwrap();
        assert_eq!(&SOURCE[owner.range.clone()], "\"platform\"");
        assert!(SOURCE[api.statement.clone()].ends_with(".with_owner(\"platform\");"));

        let db = &found[1];
        assert_eq!(db.arguments[2].value.as_deref(), Some("Orders DB"));
        assert_eq!(db.arguments[3].value.as_deref(), Some("line\none"));
        assert!(db.owner.is_none());
    }

    #[test]
    fn rejects_broken_source() {
        let err = syntax().declarations("fn build( {").unwrap_err();
        assert!(matches!(err, PatchError::Syntax { .. }));
    }

    #[test]
    fn inserts_before_tail_expression() {
        let node = NewDeclaration {
            id: "cache",
            node_type: NodeType::Database,
            name: "Cache",
            description: "",
        };
        let edit = syntax().insert_declaration(SOURCE, &node).unwrap();
        let patched = edit.apply(SOURCE).unwrap();
        assert!(patched.contains(
            "// primary\n\n    arch.define_node(\"cache\", NodeType::Database, \"Cache\", \"\");\n    arch\n}"
        ));
    }

    #[test]
    fn inserts_before_trailing_return_using_parameter_receiver() {
        let source = "fn define_nodes(model: &mut Architecture) -> usize {\n    let n = 1;\n    return n;\n}\n";
        let node = NewDeclaration {
            id: "q",
            node_type: NodeType::Queue,
            name: "Q",
            description: "d",
        };
        let patched = syntax()
            .insert_declaration(source, &node)
            .unwrap()
            .apply(source)
            .unwrap();
        assert_eq!(
            patched,
            "fn define_nodes(model: &mut Architecture) -> usize {\n    let n = 1;\n    model.define_node(\"q\", NodeType::Queue, \"Q\", \"d\");\n    return n;\n}\n"
        );
    }

    #[test]
    fn inserts_into_empty_body() {
        let source = "fn build(arch: &mut Architecture) {}\n";
        let node = NewDeclaration {
            id: "a",
            node_type: NodeType::Actor,
            name: "A",
            description: "",
        };
        let patched = syntax()
            .insert_declaration(source, &node)
            .unwrap()
            .apply(source)
            .unwrap();
        assert_eq!(
            patched,
            "fn build(arch: &mut Architecture) {\n    arch.define_node(\"a\", NodeType::Actor, \"A\", \"\");\n}\n"
        );
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let node = NewDeclaration {
            id: "a",
            node_type: NodeType::Actor,
            name: "A",
            description: "",
        };
        let err = syntax()
            .insert_declaration("fn render() {}\n", &node)
            .unwrap_err();
        assert!(matches!(err, PatchError::EntryPointNotFound { .. }));
    }

    #[test]
    fn unescapes_rust_literals() {
        assert_eq!(unescape(r"a\u{1F600}\x41\t").as_deref(), Some("a😀A\t"));
        assert_eq!(unescape("one \\\n     two").as_deref(), Some("one two"));
        assert_eq!(unescape(r"\q"), None);
    }
}
