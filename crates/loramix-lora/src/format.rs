//! LoRA key layout detection
//!
//! Different trainers name their factor tensors differently. [`LoraFormat`]
//! classifies a file by its keys, and [`FactorPattern`] lists the down/up
//! naming schemes whose factors can be stacked by the concatenation merge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Key layout of a LoRA file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoraFormat {
    /// kohya-style `.lora_down.weight` / `.lora_up.weight`
    StandardLora,
    /// PEFT-style `.lora_A` / `.lora_B`
    PeftLora,
    /// Attention projections without factor naming
    TransformerLora,
    /// Plain `.weight` tensors
    GenericWeights,
    /// Nothing recognizable
    Unknown,
}

impl LoraFormat {
    /// Classify a set of keys. Earlier rules win.
    pub fn detect<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        let keys: Vec<&str> = keys.into_iter().collect();

        if keys.iter().any(|k| k.contains(".lora_down.weight")) {
            Self::StandardLora
        } else if keys
            .iter()
            .any(|k| k.contains(".lora_A") || k.contains(".lora_B"))
        {
            Self::PeftLora
        } else if keys
            .iter()
            .any(|k| k.contains("q_proj") || k.contains("k_proj") || k.contains("v_proj"))
        {
            Self::TransformerLora
        } else if keys.iter().any(|k| k.contains(".weight")) {
            Self::GenericWeights
        } else {
            Self::Unknown
        }
    }

    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardLora => "standard_lora",
            Self::PeftLora => "peft_lora",
            Self::TransformerLora => "transformer_lora",
            Self::GenericWeights => "generic_weights",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LoraFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Naming scheme of one rank-decomposed layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorPattern {
    /// Suffix of the down projection (rank x in_features)
    pub down: &'static str,
    /// Suffix of the up projection (out_features x rank)
    pub up: &'static str,
    /// Suffix of the alpha scalar
    pub alpha: &'static str,
}

impl FactorPattern {
    /// All recognized patterns, most specific first
    pub const ALL: [FactorPattern; 3] = [
        FactorPattern {
            down: ".lora_down.weight",
            up: ".lora_up.weight",
            alpha: ".alpha",
        },
        FactorPattern {
            down: ".lora_A.weight",
            up: ".lora_B.weight",
            alpha: ".alpha",
        },
        FactorPattern {
            down: ".lora_A",
            up: ".lora_B",
            alpha: ".alpha",
        },
    ];

    /// Strip the down suffix, yielding the layer prefix
    pub fn prefix_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_suffix(self.down)
    }

    /// Down key for a prefix
    pub fn down_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.down)
    }

    /// Up key for a prefix
    pub fn up_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.up)
    }

    /// Alpha key for a prefix
    pub fn alpha_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.alpha)
    }
}

/// A layer prefix together with the pattern that names its factors
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FactorFamily {
    /// Layer prefix shared by the factor keys
    pub prefix: String,
    pattern_index: usize,
}

impl FactorFamily {
    /// Naming pattern of this family
    pub fn pattern(&self) -> FactorPattern {
        FactorPattern::ALL[self.pattern_index]
    }

    /// The keys this family owns: down, up, alpha
    pub fn keys(&self) -> [String; 3] {
        let p = self.pattern();
        [
            p.down_key(&self.prefix),
            p.up_key(&self.prefix),
            p.alpha_key(&self.prefix),
        ]
    }

    /// Find every factor family across the given key sets, sorted by prefix.
    ///
    /// A key matches the first pattern whose down suffix it carries, so
    /// `x.lora_A.weight` is never also read as a `.lora_A` family.
    pub fn collect<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<FactorFamily> {
        let mut families = BTreeSet::new();
        for key in keys {
            for (pattern_index, pattern) in FactorPattern::ALL.iter().enumerate() {
                if let Some(prefix) = pattern.prefix_of(key) {
                    families.insert(FactorFamily {
                        prefix: prefix.to_string(),
                        pattern_index,
                    });
                    break;
                }
            }
        }
        families.into_iter().collect()
    }
}
