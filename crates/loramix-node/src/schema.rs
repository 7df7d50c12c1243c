//! Node schema declared to the host
//!
//! Serializes to the JSON the host reads when building its node palette.

use serde::Serialize;

/// Host type tag of a merged LoRA
pub const LORA_MODEL: &str = "LORA_MODEL";

/// Full declaration of a node class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchema {
    /// Class identifier
    pub class_type: &'static str,
    /// Name shown in the host UI
    pub display_name: &'static str,
    /// Menu category
    pub category: &'static str,
    /// Help text
    pub description: &'static str,
    /// Inputs that must be connected or set
    pub required: Vec<InputSpec>,
    /// Inputs that fall back to their default
    pub optional: Vec<InputSpec>,
    /// Output type tags
    pub return_types: Vec<&'static str>,
}

impl NodeSchema {
    /// Look up an input by name
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.required
            .iter()
            .chain(&self.optional)
            .find(|i| i.name == name)
    }
}

/// One declared input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    /// Input name
    pub name: &'static str,
    /// Widget kind and constraints
    #[serde(flatten)]
    pub kind: InputKind,
    /// Hover text
    pub tooltip: &'static str,
}

impl InputSpec {
    /// Dropdown over a fixed list of options
    pub fn choice(name: &'static str, options: Vec<String>, default: Option<String>) -> Self {
        Self {
            name,
            kind: InputKind::Choice { options, default },
            tooltip: "",
        }
    }

    /// Float slider
    pub fn float(name: &'static str, default: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            name,
            kind: InputKind::Float {
                default,
                min,
                max,
                step,
            },
            tooltip: "",
        }
    }

    /// Checkbox
    pub fn boolean(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: InputKind::Boolean { default },
            tooltip: "",
        }
    }

    /// Set the tooltip
    pub fn with_tooltip(mut self, tooltip: &'static str) -> Self {
        self.tooltip = tooltip;
        self
    }
}

/// Widget kind of an input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum InputKind {
    #[serde(rename = "COMBO")]
    Choice {
        options: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    #[serde(rename = "FLOAT")]
    Float {
        default: f64,
        min: f64,
        max: f64,
        step: f64,
    },
    #[serde(rename = "BOOLEAN")]
    Boolean { default: bool },
}
