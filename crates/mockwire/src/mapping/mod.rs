//! Mappings: request criteria paired with a response recipe.

mod model;
mod response;

pub use model::MappingModel;
pub use response::{
    ProvidedResponse, ResponseMessage, ResponseModel, ResponseProvider, StaticResponse,
    NO_MATCH_BODY,
};

use crate::error::MappingError;
use crate::request::{RequestMatcher, RequestMessage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Role of a mapping in selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// Ranked against other standard mappings
    #[default]
    Standard,
    /// Internal admin endpoint, never part of normal dispatch
    Admin,
    /// Catch-all (proxy/record), only considered when nothing else matched
    Fallback,
}

/// A registered rule. Immutable once built; re-registering the same id
/// replaces it.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub id: Uuid,
    pub title: Option<String>,
    /// Lower values are evaluated first
    pub priority: i32,
    pub scenario: Option<String>,
    /// Required scenario state
    pub when_state_is: Option<String>,
    /// State set after this mapping is dispatched
    pub set_state_to: Option<String>,
    pub probability: Option<f64>,
    pub request: RequestMatcher,
    pub provider: Arc<dyn ResponseProvider>,
    pub kind: MappingKind,
    pub registered_at: DateTime<Utc>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    pub fn is_admin(&self) -> bool {
        self.kind == MappingKind::Admin
    }

    pub fn is_fallback(&self) -> bool {
        self.kind == MappingKind::Fallback
    }

    pub fn respond(&self, request: &RequestMessage) -> ProvidedResponse {
        self.provider.provide(self, request)
    }

    /// Display label for logs.
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("{title} ({})", self.id),
            None => self.id.to_string(),
        }
    }
}

/// Builder for [`Mapping`]; `build` rejects inconsistent configuration.
#[derive(Default)]
pub struct MappingBuilder {
    id: Option<Uuid>,
    title: Option<String>,
    priority: i32,
    scenario: Option<String>,
    when_state_is: Option<String>,
    set_state_to: Option<String>,
    probability: Option<f64>,
    request: RequestMatcher,
    provider: Option<Arc<dyn ResponseProvider>>,
    kind: MappingKind,
}

impl MappingBuilder {
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn when_state_is(mut self, state: impl Into<String>) -> Self {
        self.when_state_is = Some(state.into());
        self
    }

    pub fn will_set_state_to(mut self, state: impl Into<String>) -> Self {
        self.set_state_to = Some(state.into());
        self
    }

    pub fn probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    pub fn given(mut self, request: RequestMatcher) -> Self {
        self.request = request;
        self
    }

    pub fn respond_with(self, provider: impl ResponseProvider + 'static) -> Self {
        self.respond_with_arc(Arc::new(provider))
    }

    pub fn respond_with_arc(mut self, provider: Arc<dyn ResponseProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn admin(mut self) -> Self {
        self.kind = MappingKind::Admin;
        self
    }

    /// Catch-all evaluated after every other mapping, at the lowest priority.
    pub fn fallback(mut self) -> Self {
        self.kind = MappingKind::Fallback;
        self.priority = i32::MAX;
        self
    }

    pub fn build(self) -> Result<Mapping, MappingError> {
        let id = self.id.unwrap_or_else(Uuid::new_v4);

        if self.scenario.is_none() && (self.when_state_is.is_some() || self.set_state_to.is_some())
        {
            return Err(MappingError::StateWithoutScenario(id));
        }
        if let Some(value) = self.probability {
            if !(0.0..=1.0).contains(&value) {
                return Err(MappingError::InvalidProbability { id, value });
            }
        }

        Ok(Mapping {
            id,
            title: self.title,
            priority: self.priority,
            scenario: self.scenario,
            when_state_is: self.when_state_is,
            set_state_to: self.set_state_to,
            probability: self.probability,
            request: self.request,
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(StaticResponse::status(200))),
            kind: self.kind,
            registered_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::Matcher;

    #[test]
    fn test_build_defaults() {
        let mapping = Mapping::builder()
            .given(RequestMatcher::new().with_path(Matcher::exact("/")))
            .build()
            .unwrap();
        assert_eq!(mapping.priority, 0);
        assert_eq!(mapping.kind, MappingKind::Standard);
        let response = mapping.respond(&RequestMessage::new("GET", "/")).response;
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_state_without_scenario_rejected() {
        let id = Uuid::new_v4();
        let err = Mapping::builder()
            .id(id)
            .will_set_state_to("step2")
            .build()
            .unwrap_err();
        assert_eq!(err, MappingError::StateWithoutScenario(id));

        assert!(Mapping::builder().when_state_is("x").build().is_err());
    }

    #[test]
    fn test_probability_range() {
        assert!(Mapping::builder().probability(1.5).build().is_err());
        assert!(Mapping::builder().probability(f64::NAN).build().is_err());
        assert!(Mapping::builder().probability(0.25).build().is_ok());
    }

    #[test]
    fn test_fallback_has_lowest_priority() {
        let mapping = Mapping::builder().priority(-5).fallback().build().unwrap();
        assert!(mapping.is_fallback());
        assert_eq!(mapping.priority, i32::MAX);
    }

    #[test]
    fn test_closure_provider() {
        let mapping = Mapping::builder()
            .respond_with(|_: &Mapping, req: &RequestMessage| {
                ProvidedResponse::from(ResponseMessage::ok().with_body(req.path.clone()))
            })
            .build()
            .unwrap();
        let provided = mapping.respond(&RequestMessage::new("GET", "/echo"));
        assert_eq!(provided.response.body_text(), Some("/echo"));
    }
}
