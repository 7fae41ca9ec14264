// ─── Argument Templates ───
// Game/JVM argument arrays mix plain strings and rule-gated objects. They are
// decoded once into tagged elements and kept structured, so merging parent and
// child descriptors is plain concatenation and can be repeated safely.

use serde::{Deserialize, Serialize};

use crate::core::platform::PlatformInfo;
use crate::core::rules::{evaluate_with_features, FeatureSet, Rule, RuleAction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Many(Vec<String>),
}

impl ArgumentValue {
    pub fn values(&self) -> &[String] {
        match self {
            ArgumentValue::Single(value) => std::slice::from_ref(value),
            ArgumentValue::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentElement {
    Literal(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentTemplate(Vec<ArgumentElement>);

impl ArgumentTemplate {
    pub fn new(elements: Vec<ArgumentElement>) -> Self {
        Self(elements)
    }

    /// Pre-1.13 descriptors carry one space-separated string.
    pub fn from_legacy(raw: &str) -> Self {
        Self(
            raw.split_whitespace()
                .map(|token| ArgumentElement::Literal(token.to_string()))
                .collect(),
        )
    }

    pub fn literals<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            tokens
                .into_iter()
                .map(|t| ArgumentElement::Literal(t.into()))
                .collect(),
        )
    }

    pub fn elements(&self) -> &[ArgumentElement] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Positional concatenation; nothing is deduplicated or overridden.
    pub fn concat(&self, overlay: &ArgumentTemplate) -> ArgumentTemplate {
        let mut elements = Vec::with_capacity(self.0.len() + overlay.0.len());
        elements.extend(self.0.iter().cloned());
        elements.extend(overlay.0.iter().cloned());
        ArgumentTemplate(elements)
    }

    /// Ordered argument tokens that apply to `platform`.
    pub fn resolve(&self, platform: &PlatformInfo, features: &FeatureSet) -> Vec<String> {
        let mut out = Vec::new();
        for element in &self.0 {
            match element {
                ArgumentElement::Literal(text) => out.push(text.clone()),
                ArgumentElement::Conditional { rules, value } => {
                    if evaluate_with_features(rules, platform, features) == RuleAction::Allow {
                        out.extend(value.values().iter().cloned());
                    }
                }
            }
        }
        out
    }

    /// Single-string rendering: literals as-is, a single conditional value
    /// as-is, multi-valued conditionals with every value quoted.
    pub fn render(&self, platform: &PlatformInfo, features: &FeatureSet) -> String {
        let mut parts = Vec::new();
        for element in &self.0 {
            match element {
                ArgumentElement::Literal(text) => parts.push(text.clone()),
                ArgumentElement::Conditional { rules, value } => {
                    if evaluate_with_features(rules, platform, features) != RuleAction::Allow {
                        continue;
                    }
                    match value {
                        ArgumentValue::Single(v) => parts.push(v.clone()),
                        ArgumentValue::Many(values) => {
                            parts.extend(values.iter().map(|v| format!("\"{v}\"")))
                        }
                    }
                }
            }
        }
        parts.join(" ")
    }
}

/// Resolve `template` for `platform` with no launch features enabled.
pub fn resolve_arguments(template: &ArgumentTemplate, platform: &PlatformInfo) -> Vec<String> {
    template.resolve(platform, &FeatureSet::default())
}
