//! Rust identifiers and type paths for prost-generated code.
//!
//! Field names become `snake_case`, message and oneof types `UpperCamelCase`,
//! and every enclosing message contributes a `snake_case` module, so
//! `pkg.Outer.Inner` lives at `outer::Inner` relative to the package module.

use common::MessageDescriptor;

/// Keywords escaped as raw identifiers.
const RAW_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Keywords that cannot be raw identifiers; suffixed with `_` instead.
const SUFFIXED_KEYWORDS: &[&str] = &["self", "super", "crate", "Self"];

/// Splits an identifier into lowercase words on `_`, `-`, `.` and case changes.
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for segment in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let chars: Vec<char> = segment.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if c.is_ascii_uppercase() && !current.is_empty() {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
                if prev.is_ascii_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_ascii_uppercase() && next_lower)
                {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.push(c.to_ascii_lowercase());
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

pub fn to_snake(name: &str) -> String {
    words(name).join("_")
}

pub fn to_upper_camel(name: &str) -> String {
    words(name)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Escapes a generated identifier that collides with a keyword.
pub fn escape(ident: String) -> String {
    if SUFFIXED_KEYWORDS.contains(&ident.as_str()) {
        format!("{ident}_")
    } else if RAW_KEYWORDS.contains(&ident.as_str()) {
        format!("r#{ident}")
    } else {
        ident
    }
}

/// Struct field name for a schema field.
pub fn field_ident(name: &str) -> String {
    escape(to_snake(name))
}

/// Path of the message struct relative to its package module.
pub fn message_path(message: &MessageDescriptor) -> String {
    let segments = message.path_segments();
    let Some((last, parents)) = segments.split_last() else {
        return String::new();
    };
    let mut path: Vec<String> = parents.iter().map(|p| escape(to_snake(p))).collect();
    path.push(to_upper_camel(last));
    path.join("::")
}

/// Path of the enum generated for a real oneof of `message`.
pub fn oneof_path(message: &MessageDescriptor, oneof: &str) -> String {
    let mut path: Vec<String> = message
        .path_segments()
        .iter()
        .map(|p| escape(to_snake(p)))
        .collect();
    path.push(to_upper_camel(oneof));
    path.join("::")
}

/// Variant name of a oneof member.
pub fn oneof_variant(field: &str) -> String {
    to_upper_camel(field)
}
