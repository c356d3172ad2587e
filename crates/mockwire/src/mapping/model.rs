//! Import/export form of a mapping.

use super::{Mapping, MappingKind, ResponseModel, StaticResponse};
use crate::error::MappingError;
use crate::request::{RequestMatcher, RequestModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingModel {
    /// Generated on import when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_state_is: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_state_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Catch-all consulted only when no standard mapping matches
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_fallback: bool,
    #[serde(default)]
    pub request: RequestModel,
    #[serde(default)]
    pub response: ResponseModel,
}

impl MappingModel {
    /// Parsed id, if one was given.
    pub fn uuid(&self) -> Result<Option<Uuid>, MappingError> {
        self.id
            .as_deref()
            .map(|raw| Uuid::parse_str(raw).map_err(|_| MappingError::InvalidId(raw.to_string())))
            .transpose()
    }

    pub fn to_mapping(&self) -> Result<Mapping, MappingError> {
        let request = RequestMatcher::from_model(&self.request)?;
        let response = self
            .response
            .to_response()
            .map_err(|e| MappingError::InvalidResponse(format!("bodyAsBytes: {e}")))?;

        let mut builder = Mapping::builder();
        if self.is_fallback {
            builder = builder.fallback();
        }
        let mut builder = builder
            .priority(self.priority)
            .given(request)
            .respond_with(StaticResponse::new(response));
        if let Some(id) = self.uuid()? {
            builder = builder.id(id);
        }
        if let Some(title) = &self.title {
            builder = builder.title(title.clone());
        }
        if let Some(scenario) = &self.scenario {
            builder = builder.in_scenario(scenario.clone());
        }
        if let Some(state) = &self.when_state_is {
            builder = builder.when_state_is(state.clone());
        }
        if let Some(state) = &self.set_state_to {
            builder = builder.will_set_state_to(state.clone());
        }
        if let Some(probability) = self.probability {
            builder = builder.probability(probability);
        }
        builder.build()
    }
}

impl Mapping {
    /// Export form. Providers without a persistence model export a bare
    /// 200 response.
    pub fn to_model(&self) -> MappingModel {
        MappingModel {
            id: Some(self.id.to_string()),
            title: self.title.clone(),
            priority: self.priority,
            scenario: self.scenario.clone(),
            when_state_is: self.when_state_is.clone(),
            set_state_to: self.set_state_to.clone(),
            probability: self.probability,
            is_fallback: self.kind == MappingKind::Fallback,
            request: self.request.to_model(),
            response: self.provider.model().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::MatcherKind;

    const MAPPING_JSON: &str = r#"{
        "id": "3b5a9c7e-0d4f-4a55-9d61-8f1b2a3c4d5e",
        "title": "checkout step 2",
        "priority": 5,
        "scenario": "checkout",
        "whenStateIs": "cart-filled",
        "setStateTo": "paid",
        "request": {
            "path": {"matchers": [{"name": "WildcardMatcher", "patterns": ["/checkout/*", "/pay/*"]}]},
            "methods": ["POST"]
        },
        "response": {"statusCode": 202, "bodyAsJson": {"ok": true}}
    }"#;

    #[test]
    fn test_import_mapping() {
        let model: MappingModel = serde_json::from_str(MAPPING_JSON).unwrap();
        let mapping = model.to_mapping().unwrap();

        assert_eq!(mapping.id.to_string(), "3b5a9c7e-0d4f-4a55-9d61-8f1b2a3c4d5e");
        assert_eq!(mapping.priority, 5);
        assert_eq!(mapping.when_state_is.as_deref(), Some("cart-filled"));
        let path = mapping.request.path.as_ref().unwrap();
        assert_eq!(path.0.matchers[0].kind(), MatcherKind::Wildcard);
    }

    #[test]
    fn test_export_round_trip() {
        let model: MappingModel = serde_json::from_str(MAPPING_JSON).unwrap();
        let exported = model.to_mapping().unwrap().to_model();

        assert_eq!(exported.request, model.request);
        assert_eq!(exported.response.status_code, 202);
        assert_eq!(exported.response.body_as_json, Some(serde_json::json!({"ok": true})));
        assert_eq!(exported.to_mapping().unwrap().to_model(), exported);
    }

    #[test]
    fn test_fallback_kind_persisted() {
        let mapping = Mapping::builder().fallback().build().unwrap();
        let model = mapping.to_model();
        assert!(model.is_fallback);

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["isFallback"], serde_json::json!(true));
        let standard = serde_json::to_value(Mapping::builder().build().unwrap().to_model()).unwrap();
        assert!(standard.get("isFallback").is_none());

        let restored = model.to_mapping().unwrap();
        assert_eq!(restored.kind, MappingKind::Fallback);
        assert_eq!(restored.priority, i32::MAX);
    }

    #[test]
    fn test_invalid_id_rejected() {
        let model = MappingModel {
            id: Some("not-a-uuid".to_string()),
            ..Default::default()
        };
        assert_eq!(
            model.to_mapping().unwrap_err(),
            MappingError::InvalidId("not-a-uuid".to_string())
        );
    }

    #[test]
    fn test_state_without_scenario_rejected_on_import() {
        let model = MappingModel {
            set_state_to: Some("next".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            model.to_mapping(),
            Err(MappingError::StateWithoutScenario(_))
        ));
    }
}
