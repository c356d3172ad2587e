//! Composite request matcher: a mapping's request criteria.

use super::fields::{
    BodyMatcher, ClientIpMatcher, CookieMatcher, HeaderMatcher, KeyedMatcher, MethodMatcher,
    ParamMatcher, PathMatcher, RequestFieldMatcher, UrlMatcher, ValueMatchers,
};
use super::message::RequestMessage;
use crate::error::MatchError;
use crate::match_result::RequestMatchResult;
use crate::matchers::Matcher;

/// An arbitrary subset of field matchers scored as one unit.
///
/// Only configured fields contribute an entry to the result; attributes
/// without a matcher are skipped, never penalized. The aggregate is the
/// mean of the contributed scores, so a partially matching request still
/// ranks as a close candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMatcher {
    pub path: Option<PathMatcher>,
    pub url: Option<UrlMatcher>,
    pub methods: Option<MethodMatcher>,
    pub headers: Vec<HeaderMatcher>,
    pub cookies: Vec<CookieMatcher>,
    pub params: Vec<ParamMatcher>,
    pub body: Option<BodyMatcher>,
    pub client_ip: Option<ClientIpMatcher>,
}

impl RequestMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(self, matcher: Matcher) -> Self {
        self.with_paths(ValueMatchers::new(vec![matcher]))
    }

    pub fn with_paths(mut self, matchers: ValueMatchers) -> Self {
        self.path = Some(PathMatcher(matchers));
        self
    }

    pub fn with_url(mut self, matcher: Matcher) -> Self {
        self.url = Some(UrlMatcher(ValueMatchers::new(vec![matcher])));
        self
    }

    pub fn using_method(self, method: &str) -> Self {
        self.using_methods([method])
    }

    pub fn using_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(MethodMatcher::new(methods));
        self
    }

    pub fn using_get(self) -> Self {
        self.using_method("GET")
    }

    pub fn using_post(self) -> Self {
        self.using_method("POST")
    }

    pub fn using_put(self) -> Self {
        self.using_method("PUT")
    }

    pub fn using_delete(self) -> Self {
        self.using_method("DELETE")
    }

    /// Drop the method criterion.
    pub fn using_any_method(mut self) -> Self {
        self.methods = None;
        self
    }

    pub fn with_header(self, name: &str, matcher: Matcher) -> Self {
        self.with_header_matcher(KeyedMatcher::new(name, vec![matcher]))
    }

    pub fn with_header_matcher(mut self, matcher: KeyedMatcher) -> Self {
        self.headers.push(HeaderMatcher(matcher));
        self
    }

    pub fn with_cookie(self, name: &str, matcher: Matcher) -> Self {
        self.with_cookie_matcher(KeyedMatcher::new(name, vec![matcher]))
    }

    pub fn with_cookie_matcher(mut self, matcher: KeyedMatcher) -> Self {
        self.cookies.push(CookieMatcher(matcher));
        self
    }

    pub fn with_param(self, name: &str, matcher: Matcher) -> Self {
        self.with_param_matcher(KeyedMatcher::new(name, vec![matcher]))
    }

    pub fn with_param_matcher(mut self, matcher: KeyedMatcher) -> Self {
        self.params.push(ParamMatcher(matcher));
        self
    }

    pub fn with_body(self, matcher: Matcher) -> Self {
        self.with_body_matchers(ValueMatchers::new(vec![matcher]))
    }

    pub fn with_body_matchers(mut self, matchers: ValueMatchers) -> Self {
        self.body = Some(BodyMatcher(matchers));
        self
    }

    pub fn with_client_ip(mut self, matcher: Matcher) -> Self {
        self.client_ip = Some(ClientIpMatcher(ValueMatchers::new(vec![matcher])));
        self
    }

    /// Configured field matchers in evaluation order.
    pub fn fields(&self) -> Vec<&dyn RequestFieldMatcher> {
        let mut fields: Vec<&dyn RequestFieldMatcher> = Vec::new();
        if let Some(m) = &self.path {
            fields.push(m);
        }
        if let Some(m) = &self.url {
            fields.push(m);
        }
        if let Some(m) = &self.methods {
            fields.push(m);
        }
        fields.extend(self.headers.iter().map(|m| m as &dyn RequestFieldMatcher));
        fields.extend(self.cookies.iter().map(|m| m as &dyn RequestFieldMatcher));
        fields.extend(self.params.iter().map(|m| m as &dyn RequestFieldMatcher));
        if let Some(m) = &self.body {
            fields.push(m);
        }
        if let Some(m) = &self.client_ip {
            fields.push(m);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Score every configured field. Errors only surface from matchers with
    /// `throw_on_invalid_input` set; others are recorded on the entry.
    pub fn evaluate(&self, request: &RequestMessage) -> Result<RequestMatchResult, MatchError> {
        let mut result = RequestMatchResult::new();
        for field in self.fields() {
            let scored = field.score(request)?;
            result.push(
                field.name(),
                scored.score,
                scored.error.map(|e| e.to_string()),
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::PERFECT;

    #[test]
    fn test_unconfigured_fields_are_skipped() {
        let matcher = RequestMatcher::new().with_path(Matcher::exact("/ping"));
        let req = RequestMessage::new("DELETE", "/ping").with_header("X-Anything", "1");

        let result = matcher.evaluate(&req).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].matcher, "RequestPathMatcher");
        assert_eq!(result.average(), PERFECT);
    }

    #[test]
    fn test_partial_request_scores_mean() {
        let matcher = RequestMatcher::new()
            .with_path(Matcher::exact("/orders"))
            .using_post()
            .with_header("X-Api-Key", Matcher::exact("secret"));
        let req = RequestMessage::new("POST", "/orders");

        let result = matcher.evaluate(&req).unwrap();
        assert_eq!(result.entries.len(), 3);
        assert!((result.average() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.perfect_count(), 2);
        assert!(!result.is_match());
    }

    #[test]
    fn test_entry_order_follows_fields() {
        let matcher = RequestMatcher::new()
            .with_body(Matcher::wildcard("*"))
            .with_param("q", Matcher::exact("1"))
            .using_get()
            .with_path(Matcher::wildcard("/*"));
        let names: Vec<_> = matcher.fields().iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            vec![
                "RequestPathMatcher",
                "RequestMethodMatcher",
                "RequestParamMatcher",
                "RequestBodyMatcher"
            ]
        );
    }

    #[test]
    fn test_empty_matcher_scores_zero() {
        let matcher = RequestMatcher::new();
        assert!(matcher.is_empty());
        let result = matcher.evaluate(&RequestMessage::new("GET", "/")).unwrap();
        assert_eq!(result.average(), 0.0);
    }

    #[test]
    fn test_using_any_method_drops_criterion() {
        let matcher = RequestMatcher::new().using_get().using_any_method();
        assert!(matcher.methods.is_none());
    }
}
