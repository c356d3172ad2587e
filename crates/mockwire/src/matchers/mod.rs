//! Value matchers.
//!
//! Every matcher scores one input against its configured pattern(s) and
//! shares one contract:
//!
//! 1. each pattern yields a score (usually [`from_bool`]),
//! 2. pattern scores fold with the matcher's [`MatchOperator`],
//! 3. the matcher's [`MatchBehaviour`] is applied with [`convert`].
//!
//! Input that cannot be interpreted (a JSON matcher fed non-JSON text, an
//! XPath matcher fed broken XML) scores [`MISMATCH`] and carries an
//! informational error. When `throw_on_invalid_input` is set the error is
//! returned to the caller instead.
//!
//! The set of kinds is closed ([`MatcherKind`]); the kind tag doubles as the
//! serialized matcher name.

mod json;
mod model;
mod text;
mod xml;

pub use model::MatcherModel;
pub use text::CachedValue;

use crate::error::MatchError;
use crate::score::{combine, convert, from_bool, MatchBehaviour, MatchOperator, MISMATCH};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Input handed to a matcher.
#[derive(Debug, Clone, Copy)]
pub enum MatchInput<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    Json(&'a Value),
    /// The attribute does not exist on the request.
    Missing,
}

impl<'a> From<Option<&'a str>> for MatchInput<'a> {
    fn from(value: Option<&'a str>) -> Self {
        match value {
            Some(v) => MatchInput::Text(v),
            None => MatchInput::Missing,
        }
    }
}

/// Score of one evaluation plus an optional informational error.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub score: f64,
    pub error: Option<MatchError>,
}

impl MatchResult {
    pub fn new(score: f64) -> Self {
        Self { score, error: None }
    }

    pub fn with_error(score: f64, error: MatchError) -> Self {
        Self {
            score,
            error: Some(error),
        }
    }
}

/// The closed set of matcher kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Exact,
    Wildcard,
    Regex,
    ExactObject,
    Json,
    JsonPartial,
    JsonPath,
    XPath,
    NotNullOrEmpty,
}

impl MatcherKind {
    pub const ALL: [MatcherKind; 9] = [
        MatcherKind::Exact,
        MatcherKind::Wildcard,
        MatcherKind::Regex,
        MatcherKind::ExactObject,
        MatcherKind::Json,
        MatcherKind::JsonPartial,
        MatcherKind::JsonPath,
        MatcherKind::XPath,
        MatcherKind::NotNullOrEmpty,
    ];

    /// Serialized kind tag.
    pub fn name(self) -> &'static str {
        match self {
            MatcherKind::Exact => "ExactMatcher",
            MatcherKind::Wildcard => "WildcardMatcher",
            MatcherKind::Regex => "RegexMatcher",
            MatcherKind::ExactObject => "ExactObjectMatcher",
            MatcherKind::Json => "JsonMatcher",
            MatcherKind::JsonPartial => "JsonPartialMatcher",
            MatcherKind::JsonPath => "JsonPathMatcher",
            MatcherKind::XPath => "XPathMatcher",
            MatcherKind::NotNullOrEmpty => "NotNullOrEmptyMatcher",
        }
    }

    /// Whether the kind consumes a JSON tree rather than text.
    pub fn wants_json(self) -> bool {
        matches!(
            self,
            MatcherKind::Json | MatcherKind::JsonPartial | MatcherKind::JsonPath
        )
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatcherKind {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatcherKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| MatchError::UnknownMatcher(s.to_string()))
    }
}

/// Options shared by every matcher kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatcherOptions {
    pub behaviour: MatchBehaviour,
    pub operator: MatchOperator,
    pub ignore_case: bool,
    pub throw_on_invalid_input: bool,
}

/// Patterns compiled into their runtime form.
#[derive(Debug, Clone)]
enum Compiled {
    Text(Vec<CachedValue>),
    Regex(Vec<Arc<Regex>>),
    Bytes(Vec<Vec<u8>>),
    Json(Vec<Value>),
    JsonPath(Vec<Arc<JsonPath>>),
    XPath(Vec<String>),
    None,
}

/// A configured matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    kind: MatcherKind,
    /// Source patterns, kept for the persistence model.
    patterns: Vec<Value>,
    compiled: Compiled,
    options: MatcherOptions,
}

impl Matcher {
    /// Build and compile a matcher. Invalid patterns are rejected here,
    /// never at scoring time.
    pub fn new(
        kind: MatcherKind,
        patterns: Vec<Value>,
        options: MatcherOptions,
    ) -> Result<Self, MatchError> {
        let name = kind.name();
        let compiled = match kind {
            MatcherKind::Exact | MatcherKind::Wildcard => Compiled::Text(
                patterns
                    .iter()
                    .map(|p| pattern_str(name, p).map(CachedValue::new))
                    .collect::<Result<_, _>>()?,
            ),
            MatcherKind::Regex => Compiled::Regex(
                patterns
                    .iter()
                    .map(|p| {
                        let source = pattern_str(name, p)?;
                        text::compile_regex(source, options.ignore_case)
                            .map_err(|e| MatchError::pattern(name, e))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            MatcherKind::ExactObject => Compiled::Bytes(
                patterns
                    .iter()
                    .map(|p| {
                        let source = pattern_str(name, p)?;
                        BASE64
                            .decode(source)
                            .map_err(|e| MatchError::pattern(name, e))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            MatcherKind::Json | MatcherKind::JsonPartial => Compiled::Json(
                patterns.iter().map(json_pattern).collect(),
            ),
            MatcherKind::JsonPath => Compiled::JsonPath(
                patterns
                    .iter()
                    .map(|p| {
                        let source = pattern_str(name, p)?;
                        JsonPath::parse(source)
                            .map(Arc::new)
                            .map_err(|e| MatchError::pattern(name, e))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            MatcherKind::XPath => Compiled::XPath(
                patterns
                    .iter()
                    .map(|p| {
                        let source = pattern_str(name, p)?;
                        xml::validate_xpath(source).map_err(|e| MatchError::pattern(name, e))?;
                        Ok(source.to_string())
                    })
                    .collect::<Result<_, MatchError>>()?,
            ),
            MatcherKind::NotNullOrEmpty => Compiled::None,
        };

        Ok(Self {
            kind,
            patterns,
            compiled,
            options,
        })
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::from_text(MatcherKind::Exact, pattern.into())
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self::from_text(MatcherKind::Wildcard, pattern.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, MatchError> {
        Self::new(
            MatcherKind::Regex,
            vec![Value::String(pattern.to_string())],
            MatcherOptions::default(),
        )
    }

    pub fn exact_object(bytes: &[u8]) -> Self {
        Self {
            kind: MatcherKind::ExactObject,
            patterns: vec![Value::String(BASE64.encode(bytes))],
            compiled: Compiled::Bytes(vec![bytes.to_vec()]),
            options: MatcherOptions::default(),
        }
    }

    pub fn json(pattern: Value) -> Self {
        Self::from_json(MatcherKind::Json, pattern)
    }

    pub fn json_partial(pattern: Value) -> Self {
        Self::from_json(MatcherKind::JsonPartial, pattern)
    }

    pub fn json_path(pattern: &str) -> Result<Self, MatchError> {
        Self::new(
            MatcherKind::JsonPath,
            vec![Value::String(pattern.to_string())],
            MatcherOptions::default(),
        )
    }

    pub fn xpath(pattern: &str) -> Result<Self, MatchError> {
        Self::new(
            MatcherKind::XPath,
            vec![Value::String(pattern.to_string())],
            MatcherOptions::default(),
        )
    }

    pub fn not_null_or_empty() -> Self {
        Self {
            kind: MatcherKind::NotNullOrEmpty,
            patterns: Vec::new(),
            compiled: Compiled::None,
            options: MatcherOptions::default(),
        }
    }

    fn from_text(kind: MatcherKind, pattern: String) -> Self {
        Self {
            kind,
            compiled: Compiled::Text(vec![CachedValue::new(pattern.as_str())]),
            patterns: vec![Value::String(pattern)],
            options: MatcherOptions::default(),
        }
    }

    fn from_json(kind: MatcherKind, pattern: Value) -> Self {
        Self {
            kind,
            compiled: Compiled::Json(vec![json_pattern(&pattern)]),
            patterns: vec![pattern],
            options: MatcherOptions::default(),
        }
    }

    /// Invert the matcher: a match scores zero, anything else scores one.
    pub fn reject_on_match(mut self) -> Self {
        self.options.behaviour = MatchBehaviour::RejectOnMatch;
        self
    }

    pub fn with_operator(mut self, operator: MatchOperator) -> Self {
        self.options.operator = operator;
        self
    }

    /// Surface invalid input as an error instead of a silent mismatch.
    pub fn throw_on_invalid_input(mut self) -> Self {
        self.options.throw_on_invalid_input = true;
        self
    }

    /// Compare text case-insensitively.
    pub fn ignore_case(mut self) -> Self {
        self.options.ignore_case = true;
        if let Compiled::Regex(regexes) = &self.compiled {
            let recompiled = regexes
                .iter()
                .map(|r| text::compile_regex(r.as_str(), true).unwrap_or_else(|_| Arc::clone(r)))
                .collect();
            self.compiled = Compiled::Regex(recompiled);
        }
        self
    }

    pub fn kind(&self) -> MatcherKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn behaviour(&self) -> MatchBehaviour {
        self.options.behaviour
    }

    pub fn options(&self) -> MatcherOptions {
        self.options
    }

    pub fn patterns(&self) -> &[Value] {
        &self.patterns
    }

    /// Score `input` according to the matcher contract.
    pub fn score(&self, input: MatchInput<'_>) -> Result<MatchResult, MatchError> {
        let raw = match self.raw_score(input) {
            Ok(score) => MatchResult::new(score),
            Err(e) if self.options.throw_on_invalid_input => return Err(e),
            Err(e) => MatchResult::with_error(MISMATCH, e),
        };

        Ok(MatchResult {
            score: convert(self.options.behaviour, raw.score),
            error: raw.error,
        })
    }

    /// Score before behaviour conversion.
    fn raw_score(&self, input: MatchInput<'_>) -> Result<f64, MatchError> {
        let name = self.name();
        let ignore_case = self.options.ignore_case;
        let op = self.options.operator;

        if let Compiled::None = self.compiled {
            let present = match input {
                MatchInput::Text(s) => !s.is_empty(),
                MatchInput::Bytes(b) => !b.is_empty(),
                MatchInput::Json(v) => !v.is_null() && v.as_str() != Some(""),
                MatchInput::Missing => false,
            };
            return Ok(from_bool(present));
        }

        if let MatchInput::Missing = input {
            return Ok(MISMATCH);
        }

        let score = match &self.compiled {
            Compiled::Text(values) => {
                let text = input_text(name, input)?;
                let wildcard = self.kind == MatcherKind::Wildcard;
                combine(
                    values.iter().map(|v| {
                        from_bool(if wildcard {
                            v.glob(&text, ignore_case)
                        } else {
                            v.equals(&text, ignore_case)
                        })
                    }),
                    op,
                )
            }
            Compiled::Regex(regexes) => {
                let text = input_text(name, input)?;
                combine(regexes.iter().map(|r| from_bool(r.is_match(&text))), op)
            }
            Compiled::Bytes(expected) => {
                let bytes = input_bytes(input);
                combine(
                    expected
                        .iter()
                        .map(|e| from_bool(e.as_slice() == &*bytes)),
                    op,
                )
            }
            Compiled::Json(expected) => {
                let actual = input_json(name, input)?;
                let partial = self.kind == MatcherKind::JsonPartial;
                combine(
                    expected.iter().map(|e| {
                        from_bool(if partial {
                            json::json_partial_equals(&actual, e, ignore_case)
                        } else {
                            json::json_equals(&actual, e, ignore_case)
                        })
                    }),
                    op,
                )
            }
            Compiled::JsonPath(paths) => {
                let actual = input_json(name, input)?;
                combine(
                    paths
                        .iter()
                        .map(|p| from_bool(json::json_path_selects(p, &actual))),
                    op,
                )
            }
            Compiled::XPath(expressions) => {
                let text = match input {
                    MatchInput::Json(_) => {
                        return Err(MatchError::input(name, "expected an XML document"))
                    }
                    other => input_text(name, other)?,
                };
                let mut scores = Vec::with_capacity(expressions.len());
                for expression in expressions {
                    let matched = xml::xpath_matches(&text, expression)
                        .map_err(|e| MatchError::input(name, e))?;
                    scores.push(from_bool(matched));
                }
                combine(scores, op)
            }
            Compiled::None => MISMATCH,
        };

        Ok(score)
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.patterns == other.patterns && self.options == other.options
    }
}

/// A string pattern holding a JSON document is compared as that document;
/// any other string is a JSON string literal.
fn json_pattern(pattern: &Value) -> Value {
    match pattern {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| pattern.clone()),
        other => other.clone(),
    }
}

fn pattern_str<'a>(name: &'static str, pattern: &'a Value) -> Result<&'a str, MatchError> {
    pattern
        .as_str()
        .ok_or_else(|| MatchError::pattern(name, "pattern must be a string"))
}

fn input_text<'a>(
    name: &'static str,
    input: MatchInput<'a>,
) -> Result<std::borrow::Cow<'a, str>, MatchError> {
    use std::borrow::Cow;
    match input {
        MatchInput::Text(s) => Ok(Cow::Borrowed(s)),
        MatchInput::Bytes(b) => std::str::from_utf8(b)
            .map(Cow::Borrowed)
            .map_err(|e| MatchError::input(name, e)),
        MatchInput::Json(Value::String(s)) => Ok(Cow::Borrowed(s.as_str())),
        MatchInput::Json(v) => Ok(Cow::Owned(v.to_string())),
        MatchInput::Missing => Ok(Cow::Borrowed("")),
    }
}

fn input_bytes<'a>(input: MatchInput<'a>) -> std::borrow::Cow<'a, [u8]> {
    use std::borrow::Cow;
    match input {
        MatchInput::Text(s) => Cow::Borrowed(s.as_bytes()),
        MatchInput::Bytes(b) => Cow::Borrowed(b),
        MatchInput::Json(v) => Cow::Owned(v.to_string().into_bytes()),
        MatchInput::Missing => Cow::Borrowed(&[]),
    }
}

fn input_json<'a>(
    name: &'static str,
    input: MatchInput<'a>,
) -> Result<std::borrow::Cow<'a, Value>, MatchError> {
    use std::borrow::Cow;
    match input {
        MatchInput::Json(v) => Ok(Cow::Borrowed(v)),
        MatchInput::Text(s) => serde_json::from_str(s)
            .map(Cow::Owned)
            .map_err(|e| MatchError::input(name, e)),
        MatchInput::Bytes(b) => serde_json::from_slice(b)
            .map(Cow::Owned)
            .map_err(|e| MatchError::input(name, e)),
        MatchInput::Missing => Ok(Cow::Owned(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{PERFECT, TOLERANCE};
    use serde_json::json;

    fn score(matcher: &Matcher, input: MatchInput<'_>) -> f64 {
        matcher.score(input).unwrap().score
    }

    #[test]
    fn test_exact_matcher() {
        let matcher = Matcher::exact("GET");
        assert_eq!(score(&matcher, MatchInput::Text("GET")), PERFECT);
        assert_eq!(score(&matcher, MatchInput::Text("get")), MISMATCH);
        assert_eq!(score(&matcher.ignore_case(), MatchInput::Text("get")), PERFECT);
    }

    #[test]
    fn test_wildcard_matcher() {
        let matcher = Matcher::wildcard("/api/*");
        assert_eq!(score(&matcher, MatchInput::Text("/api/users")), PERFECT);
        assert_eq!(score(&matcher, MatchInput::Text("/web")), MISMATCH);
    }

    #[test]
    fn test_regex_matcher_ignore_case() {
        let options = MatcherOptions {
            ignore_case: true,
            ..Default::default()
        };
        let matcher = Matcher::new(MatcherKind::Regex, vec![json!("^/api/v\\d+$")], options).unwrap();
        assert_eq!(score(&matcher, MatchInput::Text("/API/V1")), PERFECT);
    }

    #[test]
    fn test_invalid_regex_rejected_at_construction() {
        let err = Matcher::regex("(").unwrap_err();
        assert!(matches!(err, MatchError::InvalidPattern { matcher: "RegexMatcher", .. }));
    }

    #[test]
    fn test_reject_on_match() {
        let matcher = Matcher::exact("deleted").reject_on_match();
        assert_eq!(score(&matcher, MatchInput::Text("deleted")), MISMATCH);
        assert_eq!(score(&matcher, MatchInput::Text("active")), PERFECT);
        assert_eq!(score(&matcher, MatchInput::Missing), PERFECT);
    }

    #[test]
    fn test_multi_pattern_operators() {
        let patterns = vec![json!("a*"), json!("*z")];
        let or = Matcher::new(MatcherKind::Wildcard, patterns.clone(), MatcherOptions::default())
            .unwrap();
        let and = or.clone().with_operator(MatchOperator::And);
        let avg = or.clone().with_operator(MatchOperator::Average);

        assert_eq!(score(&or, MatchInput::Text("abc")), PERFECT);
        assert_eq!(score(&and, MatchInput::Text("abc")), MISMATCH);
        assert_eq!(score(&and, MatchInput::Text("abz")), PERFECT);
        assert!((score(&avg, MatchInput::Text("abc")) - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn test_empty_patterns_mismatch() {
        let matcher = Matcher::new(MatcherKind::Exact, vec![], MatcherOptions::default()).unwrap();
        assert_eq!(score(&matcher, MatchInput::Text("anything")), MISMATCH);
    }

    #[test]
    fn test_json_matcher_invalid_input_scores_zero() {
        let matcher = Matcher::json(json!({"a": 1}));
        let result = matcher.score(MatchInput::Text("not json")).unwrap();
        assert_eq!(result.score, MISMATCH);
        assert!(matches!(result.error, Some(MatchError::InvalidInput { .. })));
    }

    #[test]
    fn test_json_matcher_invalid_input_throws_when_flagged() {
        let matcher = Matcher::json(json!({"a": 1})).throw_on_invalid_input();
        assert!(matcher.score(MatchInput::Text("not json")).is_err());
    }

    #[test]
    fn test_json_partial_matcher() {
        let matcher = Matcher::json_partial(json!({"user": {"name": "John"}}));
        let body = json!({"user": {"name": "John", "age": 30}});
        assert_eq!(score(&matcher, MatchInput::Json(&body)), PERFECT);
        assert_eq!(score(&Matcher::json(json!({"user": {"name": "John"}})), MatchInput::Json(&body)), MISMATCH);
    }

    #[test]
    fn test_json_matcher_string_pattern() {
        let matcher = Matcher::new(
            MatcherKind::Json,
            vec![json!(r#"{"id": 7}"#)],
            MatcherOptions::default(),
        )
        .unwrap();
        assert_eq!(score(&matcher, MatchInput::Text(r#"{"id":7}"#)), PERFECT);
    }

    #[test]
    fn test_json_path_matcher() {
        let matcher = Matcher::json_path("$.things[?@.name == 'RequiredThing']").unwrap();
        assert_eq!(
            score(&matcher, MatchInput::Text(r#"{"things": [{"name": "RequiredThing"}]}"#)),
            PERFECT
        );
        assert_eq!(score(&matcher, MatchInput::Text(r#"{"things": []}"#)), MISMATCH);
    }

    #[test]
    fn test_xpath_matcher() {
        let matcher = Matcher::xpath("/todo-list[count(todo-item) = 2]").unwrap();
        let xml = "<todo-list><todo-item>a</todo-item><todo-item>b</todo-item></todo-list>";
        assert_eq!(score(&matcher, MatchInput::Text(xml)), PERFECT);

        let result = matcher.score(MatchInput::Text("<broken")).unwrap();
        assert_eq!(result.score, MISMATCH);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_exact_object_matcher() {
        let matcher = Matcher::exact_object(&[1, 2, 3]);
        assert_eq!(score(&matcher, MatchInput::Bytes(&[1, 2, 3])), PERFECT);
        assert_eq!(score(&matcher, MatchInput::Bytes(&[1, 2])), MISMATCH);
        assert_eq!(matcher.patterns(), &[json!("AQID")]);
    }

    #[test]
    fn test_not_null_or_empty_matcher() {
        let matcher = Matcher::not_null_or_empty();
        assert_eq!(score(&matcher, MatchInput::Text("x")), PERFECT);
        assert_eq!(score(&matcher, MatchInput::Text("")), MISMATCH);
        assert_eq!(score(&matcher, MatchInput::Missing), MISMATCH);
    }

    #[test]
    fn test_missing_input_is_mismatch() {
        assert_eq!(score(&Matcher::wildcard("*"), MatchInput::Missing), MISMATCH);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in MatcherKind::ALL {
            assert_eq!(kind.name().parse::<MatcherKind>().unwrap(), kind);
        }
        assert!("LinqMatcher".parse::<MatcherKind>().is_err());
    }
}
