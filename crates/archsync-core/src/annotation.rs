//! The annotation grammar embedded in annotated diagram text.
//!
//! Annotations are D2 comments. Two line shapes exist:
//!
//! * `# @calm:key=value` carries one field of the surrounding block (or of
//!   the architecture when no block is open). Free text is escaped so the
//!   value always fits on one line; structured values are compact JSON.
//! * `# @calm:marker {json}` declares something with no diagram shape of
//!   its own: flows, flow steps, composition, controls and relationships
//!   that cannot be drawn as an edge.

use once_cell::sync::Lazy;
use regex::Regex;

pub const PREFIX: &str = "# @calm:";

pub mod key {
    pub const ID: &str = "id";
    pub const SEQ: &str = "seq";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const OWNER: &str = "owner";
    pub const COST_CENTER: &str = "cost_center";
    pub const DESCRIPTION: &str = "description";
    pub const METADATA: &str = "metadata";
    pub const INTERFACES: &str = "interfaces";
    pub const CONTROLS: &str = "controls";
    pub const SCHEMA: &str = "schema";
    pub const ADRS: &str = "adrs";

    pub const SOURCE: &str = "source";
    pub const DESTINATION: &str = "destination";
    pub const SRC_INTERFACES: &str = "src_interfaces";
    pub const DST_INTERFACES: &str = "dst_interfaces";
    pub const PROTOCOL: &str = "protocol";
    pub const CLASSIFICATION: &str = "classification";
    pub const ENCRYPTED: &str = "encrypted";
    pub const ACTOR: &str = "actor";
    pub const TARGET: &str = "target";

    /// Value of [`TYPE`] marking an edge block as an interaction.
    pub const INTERACTS: &str = "interacts";
}

pub mod marker {
    pub const FLOW: &str = "flow";
    pub const FLOW_STEP: &str = "flow-step";
    pub const COMPOSED_OF: &str = "composed-of";
    pub const CONTROL: &str = "control";
    pub const RELATIONSHIP: &str = "relationship";
}

static FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#\s*@calm:(\w+)=(.*)$").expect("field pattern compiles"));

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*#\s*@calm:([a-z][a-z-]*)\s+(.*?)\s*$").expect("marker pattern compiles")
});

/// `key=value` annotation; the value is returned still escaped.
pub fn field(line: &str) -> Option<(&str, &str)> {
    let caps = FIELD.captures(line)?;
    let key = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str();
    Some((key, value))
}

/// `marker payload` annotation.
pub fn marker(line: &str) -> Option<(&str, &str)> {
    let caps = MARKER.captures(line)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

pub fn field_line(indent: &str, key: &str, value: &str) -> String {
    format!("{}{}{}={}\n", indent, PREFIX, key, value)
}

pub fn marker_line(marker: &str, payload: &str) -> String {
    format!("{}{} {}\n", PREFIX, marker, payload)
}

/// Make free text safe for a single-line `key=value` annotation.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' => out.push_str("\\="),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape`]. Unknown escapes are kept verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('=') => out.push('='),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// D2 identifier for a model id. Anything outside `[A-Za-z0-9_-]` becomes `-`.
pub fn d2_id(id: &str) -> String {
    if id.is_empty() {
        return "_".to_string();
    }
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Display text for labels and tooltips. Lossy; annotations hold the real value.
pub fn d2_label(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' | '#' => ' ',
            '{' => '(',
            '}' => ')',
            ';' => ',',
            '"' => '\'',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trips_awkward_text() {
        let text = "a=b\nc\\nd\r\\";
        let escaped = escape(text);
        assert!(!escaped.contains('\n'));
        assert_eq!(escaped, "a\\=b\\nc\\\\nd\\r\\\\");
        assert_eq!(unescape(&escaped), text);
    }

    #[test]
    fn field_keeps_value_verbatim() {
        assert_eq!(
            field("  # @calm:description=x \\= y "),
            Some(("description", "x \\= y "))
        );
        assert_eq!(field("# @calm:metadata={\"k\":\"a=b\"}").unwrap().1, "{\"k\":\"a=b\"}");
        assert!(field("api: # @calm:id=x {").is_none());
    }

    #[test]
    fn markers_are_not_fields() {
        let line = "# @calm:flow-step {\"x\":\"=\"}";
        assert!(field(line).is_none());
        assert_eq!(marker(line), Some(("flow-step", "{\"x\":\"=\"}")));
    }

    #[test]
    fn d2_ids_and_labels() {
        assert_eq!(d2_id("api gateway.v2"), "api-gateway-v2");
        assert_eq!(d2_id("a->b"), "a--b");
        assert_eq!(d2_label("Owner {core}\n#1"), "Owner (core)  1");
    }
}
