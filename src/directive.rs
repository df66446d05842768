//! Parses `Cache-Control` and `Pragma` header values into directive sets.
//!
//! Grammar follows RFC 7234 §5.2: a comma-separated list of tokens, each
//! either a bare directive name or `name=value`, where `value` may be a
//! quoted string containing commas. Unknown directives are kept, not
//! rejected -- callers that don't recognize a name simply ignore it.

use std::collections::HashMap;

/// An ordered, case-insensitive set of directives parsed from a single
/// header value. First occurrence of a duplicate name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    order: Vec<String>,
    values: HashMap<String, Option<String>>,
}

impl Directives {
    pub fn parse(value: &str) -> Self {
        let mut dirs = Directives::default();
        for (name, arg) in tokenize(value) {
            let key = name.to_ascii_lowercase();
            if !dirs.values.contains_key(&key) {
                dirs.order.push(key.clone());
                dirs.values.insert(key, arg);
            }
        }
        dirs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_deref())
    }

    /// Parses the argument of `name` as a non-negative integer. Returns
    /// `None` if the directive is absent, has no argument, or the argument
    /// doesn't parse -- callers treat all three the same way (directive not
    /// usable), per the conservative-on-malformed-input stance.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).flatten().and_then(|v| v.parse().ok())
    }
}

/// Splits a directive list on top-level commas, respecting quoted strings,
/// then splits each token on the first `=`.
fn tokenize(value: &str) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    for raw in split_top_level_commas(value) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.split_once('=') {
            Some((name, arg)) => {
                let arg = arg.trim();
                let arg = if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
                    &arg[1..arg.len() - 1]
                } else {
                    arg
                };
                out.push((name.trim().to_string(), Some(arg.to_string())));
            }
            None => out.push((raw.to_string(), None)),
        }
    }
    out
}

fn split_top_level_commas(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}
