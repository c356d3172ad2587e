//! Response side of a mapping: the produced message and the providers that
//! build it.

use super::Mapping;
use crate::request::RequestMessage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Body of the built-in response when nothing matches.
pub const NO_MATCH_BODY: &str = r#"{"Status":"No matching mapping found"}"#;

/// A response ready to be written by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Default for ResponseMessage {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ResponseMessage {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type.
    pub fn with_json_body(self, body: &Value) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(body.to_string())
    }

    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Built-in outcome when no mapping answers a request.
    pub fn no_match() -> Self {
        Self::new(404)
            .with_header("Content-Type", "application/json")
            .with_body(NO_MATCH_BODY)
    }
}

/// What a provider hands back to the dispatcher.
pub struct ProvidedResponse {
    pub response: ResponseMessage,
    /// Mapping synthesized from the exchange (record mode), registered by
    /// the dispatcher after the response is produced
    pub new_mapping: Option<Mapping>,
}

impl From<ResponseMessage> for ProvidedResponse {
    fn from(response: ResponseMessage) -> Self {
        Self {
            response,
            new_mapping: None,
        }
    }
}

/// Builds the response for a selected mapping.
///
/// Templating, proxying and scripted providers live outside the engine and
/// plug in through this trait.
pub trait ResponseProvider: Send + Sync {
    fn provide(&self, mapping: &Mapping, request: &RequestMessage) -> ProvidedResponse;

    /// Persistence form, when the provider has one.
    fn model(&self) -> Option<ResponseModel> {
        None
    }
}

impl<F> ResponseProvider for F
where
    F: Fn(&Mapping, &RequestMessage) -> ProvidedResponse + Send + Sync,
{
    fn provide(&self, mapping: &Mapping, request: &RequestMessage) -> ProvidedResponse {
        self(mapping, request)
    }
}

/// A fixed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResponse(pub ResponseMessage);

impl StaticResponse {
    pub fn new(response: ResponseMessage) -> Self {
        Self(response)
    }

    pub fn status(status_code: u16) -> Self {
        Self(ResponseMessage::new(status_code))
    }

    pub fn text(status_code: u16, body: impl Into<String>) -> Self {
        Self(ResponseMessage::new(status_code).with_body(body.into()))
    }

    pub fn json(status_code: u16, body: &Value) -> Self {
        Self(ResponseMessage::new(status_code).with_json_body(body))
    }
}

impl ResponseProvider for StaticResponse {
    fn provide(&self, _mapping: &Mapping, _request: &RequestMessage) -> ProvidedResponse {
        self.0.clone().into()
    }

    fn model(&self) -> Option<ResponseModel> {
        Some(ResponseModel::from(&self.0))
    }
}

impl fmt::Debug for dyn ResponseProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseProvider")
    }
}

/// Persistence model of a static response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseModel {
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_as_json: Option<Value>,
    /// Non-UTF-8 bodies, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_as_bytes: Option<String>,
}

fn default_status_code() -> u16 {
    200
}

impl Default for ResponseModel {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            headers: BTreeMap::new(),
            body: None,
            body_as_json: None,
            body_as_bytes: None,
        }
    }
}

impl From<&ResponseMessage> for ResponseModel {
    fn from(response: &ResponseMessage) -> Self {
        let mut model = ResponseModel {
            status_code: response.status_code,
            headers: response.headers.clone(),
            ..Default::default()
        };
        if response.body.is_empty() {
            return model;
        }
        match response.body_text() {
            Some(text) => {
                let is_json = response
                    .headers
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v.contains("json"));
                match serde_json::from_str::<Value>(text) {
                    Ok(json) if is_json => model.body_as_json = Some(json),
                    _ => model.body = Some(text.to_string()),
                }
            }
            None => model.body_as_bytes = Some(BASE64.encode(&response.body)),
        }
        model
    }
}

impl ResponseModel {
    /// Rebuild the response. A JSON body wins over text, text over bytes.
    pub fn to_response(&self) -> Result<ResponseMessage, base64::DecodeError> {
        let mut response = ResponseMessage::new(self.status_code);
        response.headers = self.headers.clone();
        if let Some(json) = &self.body_as_json {
            if !response
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                response
                    .headers
                    .insert("Content-Type".to_string(), "application/json".to_string());
            }
            response.body = json.to_string().into_bytes();
        } else if let Some(body) = &self.body {
            response.body = body.clone().into_bytes();
        } else if let Some(encoded) = &self.body_as_bytes {
            response.body = BASE64.decode(encoded)?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_match_response() {
        let response = ResponseMessage::no_match();
        assert_eq!(response.status_code, 404);
        assert_eq!(response.body_text(), Some(NO_MATCH_BODY));
        let parsed: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["Status"], "No matching mapping found");
    }

    #[test]
    fn test_json_body_model_round_trip() {
        let response = ResponseMessage::new(201).with_json_body(&json!({"id": 7}));
        let model = ResponseModel::from(&response);
        assert_eq!(model.body_as_json, Some(json!({"id": 7})));
        assert!(model.body.is_none());
        assert_eq!(model.to_response().unwrap(), response);
    }

    #[test]
    fn test_text_and_binary_bodies() {
        let text = ResponseMessage::ok().with_body("hello");
        assert_eq!(ResponseModel::from(&text).body.as_deref(), Some("hello"));

        let binary = ResponseMessage::ok().with_body(vec![0xff, 0x00]);
        let model = ResponseModel::from(&binary);
        assert!(model.body_as_bytes.is_some());
        assert_eq!(model.to_response().unwrap().body, vec![0xff, 0x00]);
    }

    #[test]
    fn test_response_model_defaults() {
        let model: ResponseModel = serde_json::from_str(r#"{"body": "x"}"#).unwrap();
        assert_eq!(model.status_code, 200);
        assert_eq!(model.to_response().unwrap().body_text(), Some("x"));
    }
}
