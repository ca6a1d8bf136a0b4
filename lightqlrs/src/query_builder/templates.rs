//! `${...}` placeholder handling for SQL templates.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?\s*\}")
        .expect("placeholder pattern is valid")
});

static IDENTIFIER_CHAIN: Lazy<Regex> = Lazy::new(|| {
    let part = r#"(?:"(?:[^"]|"")*"|`[^`]*`|[A-Za-z_][A-Za-z0-9_]*)"#;
    Regex::new(&format!(r"^{part}(?:\.{part})*$")).expect("identifier pattern is valid")
});

static CALL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\(|^\(").expect("call pattern is valid"));

/// Keyword standing for the table that owns the template.
pub(crate) const TABLE_KEYWORD: &str = "TABLE";

/// One `${name}` or `${qualifier.name}` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placeholder<'t> {
    pub qualifier: Option<&'t str>,
    pub name: &'t str,
}

impl Placeholder<'_> {
    pub fn is_table_keyword(&self) -> bool {
        self.qualifier.is_none() && self.name == TABLE_KEYWORD
    }
}

impl fmt::Display for Placeholder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(q) => write!(f, "${{{q}.{}}}", self.name),
            None => write!(f, "${{{}}}", self.name),
        }
    }
}

/// Replace every placeholder with the string `resolve` returns for it.
/// Text outside placeholders is copied unchanged.
pub(crate) fn substitute<F>(template: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(Placeholder<'_>) -> Result<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(first)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        let placeholder = match caps.get(2) {
            Some(name) => Placeholder {
                qualifier: Some(first.as_str()),
                name: name.as_str(),
            },
            None => Placeholder {
                qualifier: None,
                name: first.as_str(),
            },
        };
        out.push_str(&resolve(placeholder)?);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

pub(crate) fn placeholders(template: &str) -> Vec<Placeholder<'_>> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| {
            let first = caps.get(1)?;
            Some(match caps.get(2) {
                Some(name) => Placeholder {
                    qualifier: Some(first.as_str()),
                    name: name.as_str(),
                },
                None => Placeholder {
                    qualifier: None,
                    name: first.as_str(),
                },
            })
        })
        .collect()
}

/// Wrap a substituted expression in parentheses unless it is atomic: a
/// (possibly quoted) identifier chain, a number, or a single call or
/// parenthesized group spanning the whole text.
pub(crate) fn parenthesize(sql: &str) -> String {
    let sql = sql.trim();
    if IDENTIFIER_CHAIN.is_match(sql) || sql.parse::<f64>().is_ok() || is_enclosed(sql) {
        sql.to_string()
    } else {
        format!("({sql})")
    }
}

/// True when the parenthesis opened by the leading call (or group) closes
/// on the last character. Quoted text is skipped.
fn is_enclosed(sql: &str) -> bool {
    let Some(prefix) = CALL_PREFIX.find(sql) else {
        return false;
    };
    let start = prefix.end() - 1;
    let mut depth = 0usize;
    let mut quote = None;
    for (offset, c) in sql[start..].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return start + offset + 1 == sql.len();
                    }
                }
                _ => {}
            },
        }
    }
    false
}
