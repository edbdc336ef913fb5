//! `{{ name }}` placeholder rendering
//!
//! Templates are rendered one argument at a time. A substituted value is
//! never re-split, so a value containing spaces or shell syntax stays a
//! single argument.

use regex::Regex;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("name regex is valid"))
}

/// Whether `name` is usable as a variable or environment key
pub fn is_valid_name(name: &str) -> bool {
    name_regex().is_match(name)
}

/// Names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Render a template, looking each placeholder up with `lookup`.
///
/// Returns the first unresolved name as the error.
pub fn render<'a, F>(template: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = lookup(name.as_str()).ok_or_else(|| name.as_str().to_string())?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}
