// rust/weights-core/src/resolve/key.rs

//! Parsing raw checkpoint keys into block or global identities.

/// Where a raw tensor lives in the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerKey {
    /// Outside any transformer block, e.g. `wte.weight` or `ln_f.bias`.
    Global(String),
    /// Inside transformer block `index`, with the remaining field name.
    Block(usize, String),
}

impl LayerKey {
    /// Parses `<prefix>.<N>.<field>`; anything else is a global key.
    ///
    /// `N` must be a plain decimal integer and `field` must be non-empty.
    pub fn parse(name: &str, block_prefix: &str) -> Self {
        let block = name
            .strip_prefix(block_prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.split_once('.'))
            .filter(|(index, field)| {
                !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) && !field.is_empty()
            })
            .and_then(|(index, field)| Some((index.parse::<usize>().ok()?, field)));

        match block {
            Some((index, field)) => LayerKey::Block(index, field.to_string()),
            None => LayerKey::Global(name.to_string()),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            LayerKey::Global(field) | LayerKey::Block(_, field) => field,
        }
    }
}
