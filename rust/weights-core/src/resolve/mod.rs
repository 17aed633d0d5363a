// rust/weights-core/src/resolve/mod.rs

//! Name and shape resolution.
//!
//! Turns one [`RawTensor`] into zero or more [`OutputTensor`]s:
//!
//! 1. the shape is canonicalized to rank 3,
//! 2. the key is parsed into a [`LayerKey`],
//! 3. the field is mapped through the [`NameMap`] and dispatched to a rule:
//!
//! | field                                   | outputs                                              |
//! |-----------------------------------------|------------------------------------------------------|
//! | `attn.bias`                             | none (fixed causal mask)                             |
//! | `attn.c_attn.{bias,weight}` in block N  | `blockN.attention.{query,key,value}.{bias,weights}`  |
//! | `wte.weight` / `wpe.weight`             | `{embeddings,position_embeddings}.chunk{1,2}`        |
//! | anything else                           | `blockN.<mapped>` or `<mapped>`                      |

mod key;
mod name_map;
mod tensor;

pub use key::LayerKey;
pub use name_map::NameMap;
pub use tensor::{canonical_shape, CanonicalTensor};

use tracing::{debug, trace};

use crate::config::NamingConfig;
use crate::error::Result;
use crate::store::RawTensor;

/// Fixed causal-mask buffer; carries nothing the runtime needs.
const ATTENTION_MASK: &str = "attn.bias";
const FUSED_QKV_BIAS: &str = "attn.c_attn.bias";
const FUSED_QKV_WEIGHT: &str = "attn.c_attn.weight";
const TOKEN_EMBEDDING: &str = "wte.weight";
const POSITION_EMBEDDING: &str = "wpe.weight";

const QKV_PARTS: [&str; 3] = ["query", "key", "value"];

/// A fully resolved tensor, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub name: String,
    pub shape: [usize; 3],
    pub data: Vec<f32>,
}

impl OutputTensor {
    fn new(name: String, tensor: CanonicalTensor) -> Self {
        Self {
            name,
            shape: tensor.shape,
            data: tensor.data,
        }
    }
}

/// Resolution rule chosen for a tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Drop,
    SplitQkv { block: usize, suffix: &'static str },
    ChunkEmbedding { stem: &'static str },
    Single(String),
}

/// Stateless resolver configured with the naming rules of one run.
#[derive(Debug, Clone)]
pub struct Resolver {
    names: NameMap,
    block_prefix: String,
    strip_prefix: Option<String>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&NamingConfig::default())
    }
}

impl Resolver {
    pub fn new(config: &NamingConfig) -> Self {
        Self {
            names: NameMap::with_overrides(&config.map),
            block_prefix: config.block_prefix.clone(),
            strip_prefix: config.strip_prefix.clone(),
        }
    }

    /// Parses a raw key after removing the configured strip prefix.
    pub fn layer_key(&self, name: &str) -> LayerKey {
        let name = self
            .strip_prefix
            .as_deref()
            .and_then(|prefix| name.strip_prefix(prefix))
            .unwrap_or(name);
        LayerKey::parse(name, &self.block_prefix)
    }

    /// Resolves one raw tensor into its output tensors.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the tensor cannot be canonicalized or a fused
    /// attention tensor's last dimension is not divisible by 3.
    pub fn resolve(&self, raw: RawTensor) -> Result<Vec<OutputTensor>> {
        let name = raw.name.clone();
        let tensor = CanonicalTensor::from_raw(raw)?;
        let key = self.layer_key(&name);
        let rule = self.rule_for(&key);

        trace!(tensor = %name, shape = ?tensor.shape, rule = ?rule, "resolving");
        if matches!(rule, Rule::Single(_)) && !self.names.contains(key.field()) {
            debug!(tensor = %name, "no mapping for field, passing through");
        }

        let outputs = match rule {
            Rule::Drop => Vec::new(),
            Rule::SplitQkv { block, suffix } => tensor
                .split_last_axis(&name, QKV_PARTS.len())?
                .into_iter()
                .zip(QKV_PARTS)
                .map(|(part, role)| {
                    OutputTensor::new(format!("block{block}.attention.{role}.{suffix}"), part)
                })
                .collect(),
            Rule::ChunkEmbedding { stem } => {
                let (first, second) = tensor.split_middle_axis();
                vec![
                    OutputTensor::new(format!("{stem}.chunk1"), first),
                    OutputTensor::new(format!("{stem}.chunk2"), second),
                ]
            }
            Rule::Single(output_name) => vec![OutputTensor::new(output_name, tensor)],
        };

        Ok(outputs)
    }

    fn rule_for(&self, key: &LayerKey) -> Rule {
        let field = self.names.map(key.field());

        match (key, field) {
            (_, ATTENTION_MASK) => Rule::Drop,
            (LayerKey::Block(block, _), FUSED_QKV_BIAS) => Rule::SplitQkv {
                block: *block,
                suffix: "bias",
            },
            (LayerKey::Block(block, _), FUSED_QKV_WEIGHT) => Rule::SplitQkv {
                block: *block,
                suffix: "weights",
            },
            (LayerKey::Global(_), TOKEN_EMBEDDING) => Rule::ChunkEmbedding { stem: "embeddings" },
            (LayerKey::Global(_), POSITION_EMBEDDING) => Rule::ChunkEmbedding {
                stem: "position_embeddings",
            },
            (LayerKey::Block(block, _), mapped) => Rule::Single(format!("block{block}.{mapped}")),
            (LayerKey::Global(_), mapped) => Rule::Single(mapped.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::store::test_support::iota;
    use std::collections::BTreeMap;

    fn raw(name: &str, shape: Vec<usize>) -> RawTensor {
        let n = shape.iter().product();
        RawTensor::new(name, shape, iota(n)).unwrap()
    }

    fn names(outputs: &[OutputTensor]) -> Vec<&str> {
        outputs.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn test_fused_qkv_weight() {
        let resolver = Resolver::default();
        let input = raw("h.0.attn.c_attn.weight", vec![1, 768, 2304]);
        let original = input.data.clone();

        let outputs = resolver.resolve(input).unwrap();

        assert_eq!(
            names(&outputs),
            vec![
                "block0.attention.query.weights",
                "block0.attention.key.weights",
                "block0.attention.value.weights",
            ]
        );
        for (i, out) in outputs.iter().enumerate() {
            assert_eq!(out.shape, [1, 768, 768]);
            // Row 5 of each part is the matching slice of input row 5.
            let row = 5;
            let expected = &original[row * 2304 + i * 768..row * 2304 + (i + 1) * 768];
            assert_eq!(&out.data[row * 768..(row + 1) * 768], expected);
        }
    }

    #[test]
    fn test_fused_qkv_bias() {
        let outputs = Resolver::default()
            .resolve(raw("h.7.attn.c_attn.bias", vec![9]))
            .unwrap();

        assert_eq!(
            names(&outputs),
            vec![
                "block7.attention.query.bias",
                "block7.attention.key.bias",
                "block7.attention.value.bias",
            ]
        );
        assert_eq!(outputs[0].shape, [1, 1, 3]);
        assert_eq!(outputs[2].data, vec![6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_fused_qkv_not_divisible() {
        let result = Resolver::default().resolve(raw("h.1.attn.c_attn.weight", vec![4, 10]));
        assert!(matches!(result, Err(ConvertError::Shape { .. })));
    }

    #[test]
    fn test_token_embedding_chunks() {
        let outputs = Resolver::default()
            .resolve(raw("wte.weight", vec![50257, 8]))
            .unwrap();

        assert_eq!(names(&outputs), vec!["embeddings.chunk1", "embeddings.chunk2"]);
        assert_eq!(outputs[0].shape, [1, 25129, 8]);
        assert_eq!(outputs[1].shape, [1, 25128, 8]);

        let mut rebuilt = outputs[0].data.clone();
        rebuilt.extend_from_slice(&outputs[1].data);
        assert_eq!(rebuilt, iota(50257 * 8));
    }

    #[test]
    fn test_position_embedding_chunks() {
        let outputs = Resolver::default()
            .resolve(raw("wpe.weight", vec![1024, 4]))
            .unwrap();

        assert_eq!(
            names(&outputs),
            vec!["position_embeddings.chunk1", "position_embeddings.chunk2"]
        );
        assert_eq!(outputs[0].shape, [1, 512, 4]);
        assert_eq!(outputs[1].shape, [1, 512, 4]);
    }

    #[test]
    fn test_attention_mask_dropped() {
        let resolver = Resolver::default();
        assert!(resolver
            .resolve(raw("h.3.attn.bias", vec![1, 1, 8, 8]))
            .unwrap()
            .is_empty());
        assert!(resolver.resolve(raw("attn.bias", vec![4])).unwrap().is_empty());
    }

    #[test]
    fn test_mapped_block_field() {
        let outputs = Resolver::default()
            .resolve(raw("h.2.mlp.c_fc.weight", vec![4, 16]))
            .unwrap();

        assert_eq!(names(&outputs), vec!["block2.ff.linear1.weights"]);
        assert_eq!(outputs[0].shape, [1, 4, 16]);
    }

    #[test]
    fn test_global_field_has_no_block_prefix() {
        let outputs = Resolver::default()
            .resolve(raw("ln_f.weight", vec![768]))
            .unwrap();

        assert_eq!(names(&outputs), vec!["ln_final.scale"]);
        assert_eq!(outputs[0].shape, [1, 1, 768]);
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let resolver = Resolver::default();

        let outputs = resolver
            .resolve(raw("h.0.attn.masked_bias", vec![1]))
            .unwrap();
        assert_eq!(names(&outputs), vec!["block0.attn.masked_bias"]);

        let outputs = resolver.resolve(raw("lm_head.weight", vec![2, 2])).unwrap();
        assert_eq!(names(&outputs), vec!["lm_head.weight"]);
    }

    #[test]
    fn test_canonicalization_failure_propagates() {
        let result = Resolver::default().resolve(raw("h.0.ln_1.weight", vec![2, 1, 1, 4]));
        assert!(matches!(result, Err(ConvertError::Shape { .. })));
    }

    #[test]
    fn test_strip_prefix_and_overrides() {
        let mut map = BTreeMap::new();
        map.insert("ln_f.weight".to_string(), "final_norm.gamma".to_string());

        let resolver = Resolver::new(&NamingConfig {
            strip_prefix: Some("transformer.".to_string()),
            map,
            ..Default::default()
        });

        let outputs = resolver
            .resolve(raw("transformer.h.1.attn.c_attn.bias", vec![3]))
            .unwrap();
        assert_eq!(outputs[0].name, "block1.attention.query.bias");

        let outputs = resolver
            .resolve(raw("transformer.ln_f.weight", vec![3]))
            .unwrap();
        assert_eq!(names(&outputs), vec!["final_norm.gamma"]);

        let outputs = resolver.resolve(raw("wte.weight", vec![3, 1])).unwrap();
        assert_eq!(outputs[0].shape, [1, 2, 1]);
    }

    #[test]
    fn test_outputs_preserve_element_count() {
        let resolver = Resolver::default();
        for (name, shape) in [
            ("h.0.attn.c_attn.weight", vec![6, 9]),
            ("wte.weight", vec![7, 3]),
            ("h.0.ln_2.bias", vec![5]),
        ] {
            let n: usize = shape.iter().product();
            let total: usize = resolver
                .resolve(raw(name, shape))
                .unwrap()
                .iter()
                .map(|o| o.data.len())
                .sum();
            assert_eq!(total, n, "{name}");
        }
    }
}
