//! Serializable form of a [`RequestMatcher`].

use super::fields::{
    BodyMatcher, ClientIpMatcher, CookieMatcher, HeaderMatcher, KeyedMatcher, MethodMatcher,
    ParamMatcher, PathMatcher, UrlMatcher, ValueMatchers,
};
use super::matcher::RequestMatcher;
use crate::error::MatchError;
use crate::matchers::{Matcher, MatcherModel};
use crate::score::{MatchBehaviour, MatchOperator};
use serde::{Deserialize, Serialize};

/// Matchers bound to a single-valued attribute (path, url, body, client ip).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldModel {
    pub matchers: Vec<MatcherModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<MatchOperator>,
}

/// Matchers bound to a named attribute (header, cookie, query parameter).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<MatcherModel>,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub reject_on_match: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_operator: Option<MatchOperator>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<FieldModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<FieldModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<KeyedModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<KeyedModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyedModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<FieldModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<FieldModel>,
}

impl FieldModel {
    fn from_values(values: &ValueMatchers) -> Self {
        Self {
            matchers: values.matchers.iter().map(Matcher::to_model).collect(),
            match_operator: operator_model(values.operator),
        }
    }

    fn to_values(&self) -> Result<ValueMatchers, MatchError> {
        Ok(ValueMatchers::new(build_matchers(&self.matchers)?)
            .with_operator(self.match_operator.unwrap_or_default()))
    }
}

impl KeyedModel {
    fn from_keyed(keyed: &KeyedMatcher) -> Self {
        Self {
            name: keyed.key.clone(),
            matchers: keyed.values.matchers.iter().map(Matcher::to_model).collect(),
            ignore_case: keyed.ignore_case,
            reject_on_match: keyed.behaviour.is_reject(),
            match_operator: operator_model(keyed.values.operator),
        }
    }

    fn to_keyed(&self) -> Result<KeyedMatcher, MatchError> {
        let mut keyed = KeyedMatcher::new(self.name.clone(), build_matchers(&self.matchers)?)
            .with_operator(self.match_operator.unwrap_or_default());
        keyed.ignore_case = self.ignore_case;
        keyed.behaviour = MatchBehaviour::from_reject(self.reject_on_match);
        Ok(keyed)
    }
}

fn operator_model(op: MatchOperator) -> Option<MatchOperator> {
    (op != MatchOperator::Or).then_some(op)
}

fn build_matchers(models: &[MatcherModel]) -> Result<Vec<Matcher>, MatchError> {
    models.iter().map(Matcher::from_model).collect()
}

impl RequestMatcher {
    pub fn to_model(&self) -> RequestModel {
        RequestModel {
            path: self.path.as_ref().map(|m| FieldModel::from_values(&m.0)),
            url: self.url.as_ref().map(|m| FieldModel::from_values(&m.0)),
            methods: self
                .methods
                .as_ref()
                .map(|m| m.methods.clone())
                .unwrap_or_default(),
            headers: self.headers.iter().map(|m| KeyedModel::from_keyed(&m.0)).collect(),
            cookies: self.cookies.iter().map(|m| KeyedModel::from_keyed(&m.0)).collect(),
            params: self.params.iter().map(|m| KeyedModel::from_keyed(&m.0)).collect(),
            body: self.body.as_ref().map(|m| FieldModel::from_values(&m.0)),
            client_ip: self.client_ip.as_ref().map(|m| FieldModel::from_values(&m.0)),
        }
    }

    pub fn from_model(model: &RequestModel) -> Result<Self, MatchError> {
        Ok(Self {
            path: model.path.as_ref().map(FieldModel::to_values).transpose()?.map(PathMatcher),
            url: model.url.as_ref().map(FieldModel::to_values).transpose()?.map(UrlMatcher),
            methods: (!model.methods.is_empty())
                .then(|| MethodMatcher::new(model.methods.iter().cloned())),
            headers: model
                .headers
                .iter()
                .map(|k| k.to_keyed().map(HeaderMatcher))
                .collect::<Result<_, _>>()?,
            cookies: model
                .cookies
                .iter()
                .map(|k| k.to_keyed().map(CookieMatcher))
                .collect::<Result<_, _>>()?,
            params: model
                .params
                .iter()
                .map(|k| k.to_keyed().map(ParamMatcher))
                .collect::<Result<_, _>>()?,
            body: model.body.as_ref().map(FieldModel::to_values).transpose()?.map(BodyMatcher),
            client_ip: model
                .client_ip
                .as_ref()
                .map(FieldModel::to_values)
                .transpose()?
                .map(ClientIpMatcher),
        })
    }
}
