use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::domain::Language;

const NAME: &str = r"([A-Za-z_$][A-Za-z0-9_$]*)";

static TOP_LEVEL_DECLARATIONS: Lazy<Vec<Regex>> = Lazy::new(|| declaration_patterns(""));
static NESTED_DECLARATIONS: Lazy<Vec<Regex>> = Lazy::new(|| declaration_patterns(r"[ \t]*"));
static ANONYMOUS_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|[A-Za-z_$][A-Za-z0-9_$]*\s*=>)")
        .expect("valid anonymous function regex")
});

fn declaration_patterns(indent: &str) -> Vec<Regex> {
    [
        format!(r"(?m)^{indent}(?:async\s+)?function\s*\*?\s*{NAME}\s*\("),
        format!(
            r"(?m)^{indent}(?:const|let|var)\s+{NAME}\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|[A-Za-z_$][A-Za-z0-9_$]*\s*=>)"
        ),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid declaration regex"))
    .collect()
}

/// Candidate source turned into an expression that evaluates to the
/// function under test. Building it never runs the code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedUnit {
    pub text: String,
    pub entry_point: Option<String>,
}

pub fn prepare_unit(source: &str, language: &Language) -> PreparedUnit {
    match language {
        Language::JavaScript => prepare_javascript(source),
    }
}

fn prepare_javascript(source: &str) -> PreparedUnit {
    // A `return` outside every brace only makes sense in a bare body, even
    // when the body declares helpers of its own.
    let bare_body = has_top_level_return(source);
    let entry_point = if bare_body { None } else { entry_point(source) };

    let text = match &entry_point {
        // The closure keeps helpers declared next to the entry point in scope.
        Some(name) => format!("(function () {{\n{source}\n;\nreturn {name};\n}})()"),
        None if !bare_body && ANONYMOUS_FUNCTION.is_match(source) => {
            format!("({source}\n)")
        }
        None => format!("(function (x) {{\n{source}\n}})"),
    };

    PreparedUnit { text, entry_point }
}

/// Looks for a `return` keyword at brace depth zero, skipping string
/// literals and comments.
fn has_top_level_return(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut idx = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            quote @ (b'"' | b'\'' | b'`') => {
                idx += 1;
                while idx < bytes.len() && bytes[idx] != quote {
                    if bytes[idx] == b'\\' {
                        idx += 1;
                    }
                    idx += 1;
                }
            }
            b'/' if bytes.get(idx + 1) == Some(&b'/') => {
                while idx < bytes.len() && bytes[idx] != b'\n' {
                    idx += 1;
                }
            }
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                idx += 2;
                while idx < bytes.len() && !bytes[idx..].starts_with(b"*/") {
                    idx += 1;
                }
                idx += 1;
            }
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'r' if depth == 0 && is_keyword_at(bytes, idx, b"return") => return true,
            _ => {}
        }
        idx += 1;
    }

    false
}

fn is_keyword_at(bytes: &[u8], idx: usize, keyword: &[u8]) -> bool {
    let is_ident = |byte: u8| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$';
    bytes[idx..].starts_with(keyword)
        && (idx == 0 || !is_ident(bytes[idx - 1]))
        && bytes
            .get(idx + keyword.len())
            .is_none_or(|&next| !is_ident(next))
}

fn entry_point(source: &str) -> Option<String> {
    first_declared(source, &TOP_LEVEL_DECLARATIONS)
        .or_else(|| first_declared(source, &NESTED_DECLARATIONS))
}

fn first_declared(source: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .filter_map(|pattern| pattern.captures(source))
        .filter_map(|captures| captures.get(1))
        .min_by_key(|name| name.start())
        .map(|name| name.as_str().to_string())
}
