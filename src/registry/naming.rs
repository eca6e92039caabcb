//! JavaScript identifiers for registry bindings.
//!
//! Exported component names are tag-like (`user-card`, `home`), so the
//! frontend registry binds each import to a lowerCamelCase identifier.
//! Collisions are resolved in id order with a numeric suffix.

use heck::ToLowerCamelCase;
use rustc_hash::FxHashSet;

/// Identifiers the generated code itself binds.
pub const RESERVED: &[&str] = &["exporting", "runtime"];

/// ECMAScript reserved words (strict mode) that cannot be bindings.
const KEYWORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// lowerCamelCase identifier for an exported name.
///
/// `user-card` -> `userCard`, `404` -> `_404`, `class` -> `class_`.
pub fn to_identifier(name: &str) -> String {
    let camel: String = name
        .to_lower_camel_case()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();

    if camel.is_empty() {
        return "component".to_string();
    }
    if camel.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("_{camel}");
    }
    if KEYWORDS.contains(&camel.as_str()) {
        return format!("{camel}_");
    }
    camel
}

/// Hands out unique identifiers.
#[derive(Debug, Default)]
pub struct Identifiers {
    taken: FxHashSet<String>,
}

impl Identifiers {
    /// Allocator with `reserved` names already taken.
    pub fn with_reserved<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: reserved.into_iter().map(str::to_string).collect(),
        }
    }

    /// Identifier for `name`, suffixed (`home2`, `home3`, ...) when taken.
    pub fn allocate(&mut self, name: &str) -> String {
        let base = to_identifier(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Single-quoted JavaScript string literal.
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
