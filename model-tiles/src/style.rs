//! Style rule collaborator interface.
//!
//! Style rules are grouped into families that share a source layer and are
//! evaluated together. The first rule of a family is its lead rule; the
//! parse pipeline evaluates only the lead rule and records the rest in the
//! feature index.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

/// A concrete style value.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
    Number(f64),
    Color([f32; 4]),
    Bool(bool),
    Text(String),
}

/// Evaluated style properties, keyed by property name.
pub type StyleValues = BTreeMap<String, StyleValue>;

/// Rendering-time inputs to rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationParameters {
    /// Zoom the tile is rendered at.
    pub zoom: f32,
    /// Scene brightness in `0.0..=1.0`.
    pub brightness: f32,
    /// Worldview tag for disputed-border filtering.
    pub worldview: Option<String>,
}

/// Error raised by a rule that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rule '{rule}' failed: {message}")]
pub struct StyleError {
    /// Identifier of the failing rule.
    pub rule: String,
    /// Human-readable reason.
    pub message: String,
}

impl StyleError {
    /// Creates a new style error for `rule`.
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// A single style rule.
pub trait StyleRule: Send + Sync {
    /// Stable rule identifier.
    fn id(&self) -> &str;

    /// Evaluates the rule's layout and paint properties for the whole tile.
    fn evaluate(&self, params: &EvaluationParameters) -> Result<StyleValues, StyleError>;

    /// Evaluates the rule for one mesh feature.
    ///
    /// The default treats every feature like the whole tile.
    fn evaluate_feature(
        &self,
        _feature_id: u32,
        params: &EvaluationParameters,
    ) -> Result<StyleValues, StyleError> {
        self.evaluate(params)
    }
}

/// Rules sharing a source layer, led by the first.
#[derive(Clone)]
pub struct RuleFamily {
    rules: Vec<Arc<dyn StyleRule>>,
}

impl RuleFamily {
    /// Starts a family with its lead rule.
    pub fn new(lead: Arc<dyn StyleRule>) -> Self {
        Self { rules: vec![lead] }
    }

    /// Adds a member rule after the lead.
    pub fn with_member(mut self, rule: Arc<dyn StyleRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// The rule evaluated on behalf of the family.
    pub fn lead(&self) -> &Arc<dyn StyleRule> {
        &self.rules[0]
    }

    /// Identifiers of every rule in the family, lead first.
    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.id().to_string()).collect()
    }

    /// Number of rules in the family.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Always false; a family has at least its lead.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleFamily")
            .field("rules", &self.rule_ids())
            .finish()
    }
}

/// Lookup of rule families by source layer.
pub trait StyleRuleIndex: Send + Sync {
    /// Families registered against `source_layer`, in declaration order.
    fn families(&self, source_layer: &str) -> Vec<RuleFamily>;
}

/// In-memory rule index preserving declaration order.
#[derive(Debug, Default, Clone)]
pub struct StaticRuleIndex {
    entries: Vec<(String, RuleFamily)>,
}

impl StaticRuleIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a family for `source_layer`.
    pub fn with_family(mut self, source_layer: impl Into<String>, family: RuleFamily) -> Self {
        self.entries.push((source_layer.into(), family));
        self
    }
}

impl StyleRuleIndex for StaticRuleIndex {
    fn families(&self, source_layer: &str) -> Vec<RuleFamily> {
        self.entries
            .iter()
            .filter(|(layer, _)| layer == source_layer)
            .map(|(_, family)| family.clone())
            .collect()
    }
}

/// A rule whose properties do not depend on evaluation parameters.
#[derive(Debug, Clone)]
pub struct ConstantRule {
    id: String,
    values: StyleValues,
}

impl ConstantRule {
    /// Creates a rule with no properties.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: StyleValues::new(),
        }
    }

    /// Sets a property value.
    pub fn with_value(mut self, name: impl Into<String>, value: StyleValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

impl StyleRule for ConstantRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self, _params: &EvaluationParameters) -> Result<StyleValues, StyleError> {
        Ok(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str) -> Arc<dyn StyleRule> {
        Arc::new(ConstantRule::new(id))
    }

    fn params() -> EvaluationParameters {
        EvaluationParameters {
            zoom: 16.0,
            brightness: 0.5,
            worldview: None,
        }
    }

    #[test]
    fn test_family_lead_is_first() {
        let family = RuleFamily::new(rule("roofs")).with_member(rule("roofs-night"));

        assert_eq!(family.lead().id(), "roofs");
        assert_eq!(family.rule_ids(), vec!["roofs", "roofs-night"]);
        assert_eq!(family.len(), 2);
        assert!(!family.is_empty());
    }

    #[test]
    fn test_static_index_filters_and_keeps_order() {
        let index = StaticRuleIndex::new()
            .with_family("trees", RuleFamily::new(rule("b")))
            .with_family("buildings", RuleFamily::new(rule("x")))
            .with_family("trees", RuleFamily::new(rule("a")));

        let ids: Vec<_> = index
            .families("trees")
            .iter()
            .map(|f| f.lead().id().to_string())
            .collect();

        assert_eq!(ids, vec!["b", "a"]);
        assert!(index.families("water").is_empty());
    }

    #[test]
    fn test_constant_rule_feature_defaults_to_tile() {
        let rule = ConstantRule::new("landmarks").with_value("model-opacity", StyleValue::Number(0.8));

        let tile = rule.evaluate(&params()).unwrap();
        let feature = rule.evaluate_feature(17, &params()).unwrap();

        assert_eq!(tile, feature);
        assert_eq!(tile.get("model-opacity"), Some(&StyleValue::Number(0.8)));
    }

    #[test]
    fn test_style_error_display() {
        let err = StyleError::new("roofs", "unknown expression");
        assert_eq!(err.to_string(), "Rule 'roofs' failed: unknown expression");
    }
}
