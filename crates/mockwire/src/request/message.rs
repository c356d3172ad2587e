//! Parsed inbound request as seen by the matchers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Request body in every representation a matcher may ask for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyData {
    /// Raw bytes, base64 in serialized form
    #[serde(with = "base64_bytes", default)]
    pub bytes: Vec<u8>,
    /// UTF-8 text when the bytes are valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Parsed tree when the text is a JSON document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl BodyData {
    pub fn new(bytes: Vec<u8>) -> Self {
        let text = String::from_utf8(bytes.clone()).ok();
        let json = text
            .as_deref()
            .filter(|t| looks_like_json(t))
            .and_then(|t| serde_json::from_str(t).ok());
        Self { bytes, text, json }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('['))
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// An inbound HTTP request reduced to the attributes mappings match on.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub id: Uuid,
    pub method: String,
    /// Absolute URL including scheme, host and query
    pub url: String,
    pub path: String,
    /// Decoded query parameters, multi-valued
    pub query: BTreeMap<String, Vec<String>>,
    /// Headers keyed by lowercased name, multi-valued
    pub headers: BTreeMap<String, Vec<String>>,
    pub cookies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl RequestMessage {
    /// Create a request from a method and a URL (absolute, or a path with
    /// optional query string).
    pub fn new(method: impl Into<String>, url: &str) -> Self {
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("http://localhost{url}")
        };

        let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(&url);
        let path_and_query = after_scheme
            .find(['/', '?'])
            .map(|i| &after_scheme[i..])
            .unwrap_or("");
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        let path = if path.is_empty() { "/" } else { path };

        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            path: path.to_string(),
            query: parse_query_string(query),
            url,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: None,
            client_ip: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_lowercase();
        let value = value.into();
        if name == "cookie" {
            self.cookies.extend(parse_cookies(&value));
        }
        self.headers.entry(name).or_default().push(value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let bytes = body.into();
        self.body = (!bytes.is_empty()).then(|| BodyData::new(bytes));
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Header values by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Parse a query string into decoded, multi-valued parameters.
pub fn parse_query_string(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let Some(q) = query else {
        return params;
    };

    for pair in q.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let entry = params.entry(key).or_default();
        // a=1,2 is shorthand for a=1&a=2
        for part in value.split(',') {
            let decoded = decode_component(part);
            if !decoded.is_empty() || entry.is_empty() {
                entry.push(decoded);
            }
        }
    }
    params
}

fn decode_component(value: &str) -> String {
    let plus_decoded = value.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|v| v.into_owned())
        .unwrap_or(plus_decoded)
}

/// Parse a `Cookie` header value into name/value pairs.
pub fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_path() {
        let req = RequestMessage::new("GET", "/api/users?page=2&tag=a,b");
        assert_eq!(req.path, "/api/users");
        assert_eq!(req.url, "http://localhost/api/users?page=2&tag=a,b");
        assert_eq!(req.query["page"], vec!["2"]);
        assert_eq!(req.query["tag"], vec!["a", "b"]);
    }

    #[test]
    fn test_request_from_absolute_url() {
        let req = RequestMessage::new("POST", "https://example.com:8443/orders");
        assert_eq!(req.path, "/orders");
        assert!(req.query.is_empty());

        let bare = RequestMessage::new("GET", "http://example.com");
        assert_eq!(bare.path, "/");
    }

    #[test]
    fn test_query_without_path() {
        let req = RequestMessage::new("GET", "http://example.com?a=1&b=2");
        assert_eq!(req.path, "/");
        assert_eq!(req.query["a"], vec!["1"]);
        assert_eq!(req.query["b"], vec!["2"]);
    }

    #[test]
    fn test_query_string_decoding() {
        let params = parse_query_string(Some("name=John%20Doe&q=a+b&flag"));
        assert_eq!(params["name"], vec!["John Doe"]);
        assert_eq!(params["q"], vec!["a b"]);
        assert_eq!(params["flag"], vec![""]);
        assert!(parse_query_string(None).is_empty());
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = RequestMessage::new("GET", "/")
            .with_header("Content-Type", "application/json")
            .with_header("X-Multi", "1")
            .with_header("x-multi", "2");
        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.header("X-MULTI").unwrap(), &["1", "2"]);
    }

    #[test]
    fn test_cookies_parsed_from_header() {
        let req = RequestMessage::new("GET", "/").with_header("Cookie", "session=abc; theme=dark");
        assert_eq!(req.cookies["session"], "abc");
        assert_eq!(req.cookies["theme"], "dark");
    }

    #[test]
    fn test_body_representations() {
        let req = RequestMessage::new("POST", "/").with_body(r#"{"id": 1}"#);
        let body = req.body.unwrap();
        assert_eq!(body.text.as_deref(), Some(r#"{"id": 1}"#));
        assert_eq!(body.json, Some(serde_json::json!({"id": 1})));

        let binary = BodyData::new(vec![0xff, 0xfe]);
        assert!(binary.text.is_none());
        assert!(binary.json.is_none());

        assert!(RequestMessage::new("POST", "/").with_body("").body.is_none());
    }

    #[test]
    fn test_request_serde_round_trip() {
        let req = RequestMessage::new("PUT", "/x").with_body(vec![1u8, 2, 3]);
        let json = serde_json::to_string(&req).unwrap();
        let back: RequestMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
