//! Serializable `{name, patterns}` form of a matcher.

use super::{Matcher, MatcherKind, MatcherOptions};
use crate::error::MatchError;
use crate::score::{MatchBehaviour, MatchOperator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persistence model of a [`Matcher`].
///
/// Import accepts a single `pattern` or a `patterns` list (both may be
/// present; `pattern` comes first). Export always writes `patterns`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherModel {
    /// Kind tag, e.g. `WildcardMatcher`
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<Value>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_case: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub reject_on_match: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<MatchOperator>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub throw_exception: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl MatcherModel {
    /// Shorthand for a single-pattern model.
    pub fn new(name: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            patterns: vec![pattern.into()],
            ..Default::default()
        }
    }

    /// All patterns in declaration order.
    pub fn all_patterns(&self) -> Vec<Value> {
        self.pattern
            .iter()
            .chain(self.patterns.iter())
            .cloned()
            .collect()
    }
}

impl Matcher {
    pub fn to_model(&self) -> MatcherModel {
        let options = self.options;
        MatcherModel {
            name: self.name().to_string(),
            pattern: None,
            patterns: self.patterns.clone(),
            ignore_case: options.ignore_case,
            reject_on_match: options.behaviour.is_reject(),
            match_operator: (options.operator != MatchOperator::Or).then_some(options.operator),
            throw_exception: options.throw_on_invalid_input,
        }
    }

    pub fn from_model(model: &MatcherModel) -> Result<Self, MatchError> {
        let kind: MatcherKind = model.name.parse()?;
        let options = MatcherOptions {
            behaviour: MatchBehaviour::from_reject(model.reject_on_match),
            operator: model.match_operator.unwrap_or_default(),
            ignore_case: model.ignore_case,
            throw_on_invalid_input: model.throw_exception,
        };
        Matcher::new(kind, model.all_patterns(), options)
    }
}
