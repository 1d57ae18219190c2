//! Cache key derivation
//!
//! Keys are built from positional and keyword arguments. Keyword arguments
//! are ordered by name and list-valued arguments are sorted before
//! rendering, so the same logical arguments always produce the same key.

use std::collections::BTreeMap;

use serde_json::Value;

/// Arguments that identify a cached computation
///
/// ```rust
/// use resilient_cache::KeyArgs;
///
/// let key = KeyArgs::new()
///     .arg("user")
///     .arg(123)
///     .kwarg("location", "Boston")
///     .to_key();
/// assert_eq!(key, "user:123:location=Boston");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyArgs {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl KeyArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument; a repeated name overwrites the earlier value
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn to_key(&self) -> String {
        generate_key(self)
    }
}

/// Derive the cache key for `args`
///
/// Positional arguments come first in order, then keyword arguments as
/// `name=value` sorted by name, all joined with `:`.
#[must_use]
pub fn generate_key(args: &KeyArgs) -> String {
    args.args
        .iter()
        .map(render)
        .chain(
            args.kwargs
                .iter()
                .map(|(name, value)| format!("{name}={}", render(value))),
        )
        .collect::<Vec<_>>()
        .join(":")
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(render).collect();
            parts.sort();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}
