// rust/weights-core/src/resolve/name_map.rs

//! Translation of checkpoint field names to runtime field names.

use std::collections::{BTreeMap, HashMap};

/// Built-in field translations. Fused attention, the attention mask and the
/// embedding tables are handled by dedicated rules and are not listed here.
const DEFAULT_FIELDS: &[(&str, &str)] = &[
    ("attn.c_proj.bias", "attention.proj.bias"),
    ("attn.c_proj.weight", "attention.proj.weights"),
    ("ln_1.bias", "ln1.bias"),
    ("ln_1.weight", "ln1.scale"),
    ("ln_2.bias", "ln2.bias"),
    ("ln_2.weight", "ln2.scale"),
    ("mlp.c_fc.bias", "ff.linear1.bias"),
    ("mlp.c_fc.weight", "ff.linear1.weights"),
    ("mlp.c_proj.bias", "ff.linear2.bias"),
    ("mlp.c_proj.weight", "ff.linear2.weights"),
    ("ln_f.bias", "ln_final.bias"),
    ("ln_f.weight", "ln_final.scale"),
];

/// Immutable source→output field mapping. Unknown fields pass through.
#[derive(Debug, Clone)]
pub struct NameMap {
    fields: HashMap<String, String>,
}

impl Default for NameMap {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl NameMap {
    /// The built-in table with `overrides` layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut map = Self::default();
        for (from, to) in overrides {
            map.fields.insert(from.clone(), to.clone());
        }
        map
    }

    /// Maps a field, returning it unchanged when there is no entry.
    pub fn map<'a>(&'a self, field: &'a str) -> &'a str {
        self.fields.get(field).map(String::as_str).unwrap_or(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
