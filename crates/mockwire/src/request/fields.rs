//! Field matchers: value matchers bound to one request attribute.

use super::message::RequestMessage;
use crate::error::MatchError;
use crate::matchers::{MatchInput, MatchResult, Matcher, MatcherKind};
use crate::score::{combine, convert, from_bool, MatchBehaviour, MatchOperator, MISMATCH, PERFECT};

/// A matcher over one attribute of a request.
pub trait RequestFieldMatcher: Send + Sync {
    /// Kind tag recorded in match results.
    fn name(&self) -> &'static str;

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError>;
}

/// Value matchers folded with an operator, evaluated over a set of values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMatchers {
    pub matchers: Vec<Matcher>,
    pub operator: MatchOperator,
}

impl ValueMatchers {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self {
            matchers,
            operator: MatchOperator::Or,
        }
    }

    pub fn with_operator(mut self, operator: MatchOperator) -> Self {
        self.operator = operator;
        self
    }

    /// Each matcher scores its best value; the per-matcher scores fold with
    /// the operator. No values means the attribute is missing.
    pub fn score_values(&self, values: &[&str]) -> Result<MatchResult, MatchError> {
        let mut error = None;
        let mut scores = Vec::with_capacity(self.matchers.len());

        for matcher in &self.matchers {
            let best = if values.is_empty() {
                matcher.score(MatchInput::Missing)?
            } else {
                let mut best: Option<MatchResult> = None;
                for value in values {
                    let result = matcher.score(MatchInput::Text(value))?;
                    if best.as_ref().map_or(true, |b| result.score > b.score) {
                        best = Some(result);
                    }
                }
                best.unwrap_or_else(|| MatchResult::new(MISMATCH))
            };
            if error.is_none() {
                error = best.error;
            }
            scores.push(best.score);
        }

        Ok(MatchResult {
            score: combine(scores, self.operator),
            error,
        })
    }
}

/// Matches the request path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatcher(pub ValueMatchers);

impl RequestFieldMatcher for PathMatcher {
    fn name(&self) -> &'static str {
        "RequestPathMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        self.0.score_values(&[request.path.as_str()])
    }
}

/// Matches the absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlMatcher(pub ValueMatchers);

impl RequestFieldMatcher for UrlMatcher {
    fn name(&self) -> &'static str {
        "RequestUrlMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        self.0.score_values(&[request.url.as_str()])
    }
}

/// Matches the client address.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIpMatcher(pub ValueMatchers);

impl RequestFieldMatcher for ClientIpMatcher {
    fn name(&self) -> &'static str {
        "RequestClientIpMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        match request.client_ip.as_deref() {
            Some(ip) => self.0.score_values(&[ip]),
            None => self.0.score_values(&[]),
        }
    }
}

/// Accepts any of a list of HTTP methods, case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodMatcher {
    pub methods: Vec<String>,
}

impl MethodMatcher {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(|m| m.into().to_uppercase()).collect(),
        }
    }
}

impl RequestFieldMatcher for MethodMatcher {
    fn name(&self) -> &'static str {
        "RequestMethodMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        let score = combine(
            self.methods
                .iter()
                .map(|m| from_bool(m.eq_ignore_ascii_case(&request.method))),
            MatchOperator::Or,
        );
        Ok(MatchResult::new(score))
    }
}

/// A matcher over a named, possibly multi-valued attribute (header, cookie,
/// query parameter).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedMatcher {
    pub key: String,
    /// Compare the key case-insensitively
    pub ignore_case: bool,
    pub behaviour: MatchBehaviour,
    /// With no matchers the field is an existence check
    pub values: ValueMatchers,
}

impl KeyedMatcher {
    pub fn new(key: impl Into<String>, matchers: Vec<Matcher>) -> Self {
        Self {
            key: key.into(),
            ignore_case: false,
            behaviour: MatchBehaviour::AcceptOnMatch,
            values: ValueMatchers::new(matchers),
        }
    }

    /// Exact value match.
    pub fn exact(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, vec![Matcher::exact(value)])
    }

    /// Presence check.
    pub fn exists(key: impl Into<String>) -> Self {
        Self::new(key, Vec::new())
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn reject_on_match(mut self) -> Self {
        self.behaviour = MatchBehaviour::RejectOnMatch;
        self
    }

    pub fn with_operator(mut self, operator: MatchOperator) -> Self {
        self.values.operator = operator;
        self
    }

    fn score_values(&self, values: Option<Vec<&str>>) -> Result<MatchResult, MatchError> {
        let Some(values) = values else {
            return Ok(MatchResult::new(convert(self.behaviour, MISMATCH)));
        };
        if self.values.matchers.is_empty() {
            return Ok(MatchResult::new(convert(self.behaviour, PERFECT)));
        }
        let result = self.values.score_values(&values)?;
        Ok(MatchResult {
            score: convert(self.behaviour, result.score),
            error: result.error,
        })
    }

    fn key_matches(&self, candidate: &str) -> bool {
        if self.ignore_case {
            candidate.eq_ignore_ascii_case(&self.key)
        } else {
            candidate == self.key
        }
    }
}

/// Matches one header. Header names are always compared case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatcher(pub KeyedMatcher);

impl RequestFieldMatcher for HeaderMatcher {
    fn name(&self) -> &'static str {
        "RequestHeaderMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        let values = request
            .header(&self.0.key)
            .map(|values| values.iter().map(String::as_str).collect());
        self.0.score_values(values)
    }
}

/// Matches one cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieMatcher(pub KeyedMatcher);

impl RequestFieldMatcher for CookieMatcher {
    fn name(&self) -> &'static str {
        "RequestCookieMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        let value = request
            .cookies
            .iter()
            .find(|(name, _)| self.0.key_matches(name))
            .map(|(_, value)| vec![value.as_str()]);
        self.0.score_values(value)
    }
}

/// Matches one query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMatcher(pub KeyedMatcher);

impl RequestFieldMatcher for ParamMatcher {
    fn name(&self) -> &'static str {
        "RequestParamMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        let values: Vec<&str> = request
            .query
            .iter()
            .filter(|(name, _)| self.0.key_matches(name))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
            .collect();
        let present = request.query.keys().any(|name| self.0.key_matches(name));
        self.0.score_values(present.then_some(values))
    }
}

/// Matches the request body. Each matcher receives the representation it
/// works on: JSON matchers the parsed tree (or the text to parse), byte
/// matchers the raw bytes, text matchers the UTF-8 text.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyMatcher(pub ValueMatchers);

impl RequestFieldMatcher for BodyMatcher {
    fn name(&self) -> &'static str {
        "RequestBodyMatcher"
    }

    fn score(&self, request: &RequestMessage) -> Result<MatchResult, MatchError> {
        let mut error = None;
        let mut scores = Vec::with_capacity(self.0.matchers.len());

        for matcher in &self.0.matchers {
            let input = match request.body.as_ref() {
                None => MatchInput::Missing,
                Some(body) => match matcher.kind() {
                    kind if kind.wants_json() => match (&body.json, &body.text) {
                        (Some(json), _) => MatchInput::Json(json),
                        (None, Some(text)) => MatchInput::Text(text),
                        (None, None) => MatchInput::Bytes(&body.bytes),
                    },
                    MatcherKind::ExactObject => MatchInput::Bytes(&body.bytes),
                    _ => match &body.text {
                        Some(text) => MatchInput::Text(text),
                        None => MatchInput::Bytes(&body.bytes),
                    },
                },
            };

            let result = matcher.score(input)?;
            if error.is_none() {
                error = result.error;
            }
            scores.push(result.score);
        }

        Ok(MatchResult {
            score: combine(scores, self.0.operator),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> RequestMessage {
        RequestMessage::new("GET", "/api/users?page=2&Tag=x")
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "text/plain")
            .with_header("Accept", "application/json")
            .with_header("Cookie", "session=abc")
            .with_client_ip("10.0.0.1")
    }

    fn score(field: &dyn RequestFieldMatcher, req: &RequestMessage) -> f64 {
        field.score(req).unwrap().score
    }

    #[test]
    fn test_path_matcher() {
        let m = PathMatcher(ValueMatchers::new(vec![Matcher::wildcard("/api/*")]));
        assert_eq!(score(&m, &request()), PERFECT);
        let m = PathMatcher(ValueMatchers::new(vec![Matcher::exact("/other")]));
        assert_eq!(score(&m, &request()), MISMATCH);
    }

    #[test]
    fn test_url_matcher() {
        let m = UrlMatcher(ValueMatchers::new(vec![Matcher::wildcard("http://localhost/api/*")]));
        assert_eq!(score(&m, &request()), PERFECT);
    }

    #[test]
    fn test_method_matcher() {
        let m = MethodMatcher::new(["get", "post"]);
        assert_eq!(score(&m, &request()), PERFECT);
        assert_eq!(score(&MethodMatcher::new(["DELETE"]), &request()), MISMATCH);
    }

    #[test]
    fn test_header_best_value_wins() {
        let m = HeaderMatcher(KeyedMatcher::new("accept", vec![Matcher::exact("application/json")]));
        assert_eq!(score(&m, &request()), PERFECT);
    }

    #[test]
    fn test_header_missing() {
        let m = HeaderMatcher(KeyedMatcher::exact("X-Api-Key", "secret"));
        assert_eq!(score(&m, &request()), MISMATCH);
        let absent = HeaderMatcher(KeyedMatcher::exists("X-Api-Key").reject_on_match());
        assert_eq!(score(&absent, &request()), PERFECT);
    }

    #[test]
    fn test_header_exists() {
        let m = HeaderMatcher(KeyedMatcher::exists("content-type"));
        assert_eq!(score(&m, &request()), PERFECT);
        let m = HeaderMatcher(KeyedMatcher::exists("content-type").reject_on_match());
        assert_eq!(score(&m, &request()), MISMATCH);
    }

    #[test]
    fn test_cookie_matcher() {
        let m = CookieMatcher(KeyedMatcher::exact("session", "abc"));
        assert_eq!(score(&m, &request()), PERFECT);
        let m = CookieMatcher(KeyedMatcher::exact("SESSION", "abc"));
        assert_eq!(score(&m, &request()), MISMATCH);
        let m = CookieMatcher(KeyedMatcher::exact("SESSION", "abc").ignore_case());
        assert_eq!(score(&m, &request()), PERFECT);
    }

    #[test]
    fn test_param_matcher() {
        let m = ParamMatcher(KeyedMatcher::exact("page", "2"));
        assert_eq!(score(&m, &request()), PERFECT);
        let m = ParamMatcher(KeyedMatcher::exact("tag", "x"));
        assert_eq!(score(&m, &request()), MISMATCH);
        let m = ParamMatcher(KeyedMatcher::exact("tag", "x").ignore_case());
        assert_eq!(score(&m, &request()), PERFECT);
    }

    #[test]
    fn test_client_ip_matcher() {
        let m = ClientIpMatcher(ValueMatchers::new(vec![Matcher::wildcard("10.0.*")]));
        assert_eq!(score(&m, &request()), PERFECT);
        let no_ip = RequestMessage::new("GET", "/");
        assert_eq!(score(&m, &no_ip), MISMATCH);
    }

    #[test]
    fn test_body_matcher_routes_inputs() {
        let req = RequestMessage::new("POST", "/").with_body(r#"{"user": {"name": "John", "age": 30}}"#);
        let m = BodyMatcher(
            ValueMatchers::new(vec![
                Matcher::json_partial(json!({"user": {"name": "John"}})),
                Matcher::wildcard("*John*"),
            ])
            .with_operator(MatchOperator::And),
        );
        assert_eq!(score(&m, &req), PERFECT);
    }

    #[test]
    fn test_body_matcher_invalid_json_is_informational() {
        let req = RequestMessage::new("POST", "/").with_body("plain text");
        let m = BodyMatcher(ValueMatchers::new(vec![Matcher::json(json!({"a": 1}))]));
        let result = m.score(&req).unwrap();
        assert_eq!(result.score, MISMATCH);
        assert!(result.error.is_some());

        let strict = BodyMatcher(ValueMatchers::new(vec![
            Matcher::json(json!({"a": 1})).throw_on_invalid_input()
        ]));
        assert!(strict.score(&req).is_err());
    }

    #[test]
    fn test_body_matcher_missing_body() {
        let m = BodyMatcher(ValueMatchers::new(vec![Matcher::not_null_or_empty()]));
        assert_eq!(score(&m, &RequestMessage::new("POST", "/")), MISMATCH);
    }
}
