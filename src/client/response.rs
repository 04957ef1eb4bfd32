//! Response types returned to callers.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decoded response body, sniffed from the `content-type` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    /// Decode raw bytes according to the declared content type.
    ///
    /// A JSON content type with an undecodable body is a parse error; anything
    /// else is kept as (lossy UTF-8) text.
    pub fn decode(content_type: Option<&str>, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(ResponseBody::Empty);
        }
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_slice(bytes)
                .map(ResponseBody::Json)
                .map_err(|e| {
                    Error::parse(
                        format!("Failed to parse response JSON: {}", e),
                        Some(String::from_utf8_lossy(bytes).into_owned()),
                    )
                })
        } else {
            Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }

    /// Best-effort decoding used for error responses: never fails.
    pub fn decode_lossy(content_type: Option<&str>, bytes: &[u8]) -> Self {
        Self::decode(content_type, bytes)
            .unwrap_or_else(|_| ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// A successful (2xx/3xx) response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Deserialize the body into a typed value.
    ///
    /// Text bodies are parsed as JSON too, so a server that mislabels its
    /// content type still decodes.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let parsed = match &self.body {
            ResponseBody::Json(v) => serde_json::from_value(v.clone()),
            ResponseBody::Text(s) => serde_json::from_str(s),
            ResponseBody::Empty => serde_json::from_value(serde_json::Value::Null),
        };
        parsed.map_err(|e| {
            Error::parse(
                format!("Failed to decode response body: {}", e),
                self.body.as_text().map(str::to_string),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_sniffs_content_type() {
        let body = ResponseBody::decode(Some("application/json; charset=utf-8"), br#"{"a":1}"#)
            .unwrap();
        assert_eq!(body, ResponseBody::Json(json!({"a": 1})));

        let body = ResponseBody::decode(Some("text/plain"), b"hello").unwrap();
        assert_eq!(body.as_text(), Some("hello"));

        let body = ResponseBody::decode(None, b"").unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_decode_invalid_json_is_parse_error() {
        let err = ResponseBody::decode(Some("application/json"), b"{not json").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.status().is_none());
    }

    #[test]
    fn test_decode_lossy_falls_back_to_text() {
        let body = ResponseBody::decode_lossy(Some("application/json"), b"<html>502</html>");
        assert_eq!(body.as_text(), Some("<html>502</html>"));
    }

    #[test]
    fn test_typed_json_and_header_lookup() {
        #[derive(Deserialize)]
        struct Price {
            amount: u32,
            currency: String,
        }
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let resp = ApiResponse {
            status: 200,
            status_text: "OK".into(),
            headers,
            body: ResponseBody::Json(json!({"amount": 1299, "currency": "EUR"})),
        };
        let price: Price = resp.json().unwrap();
        assert_eq!(price.amount, 1299);
        assert_eq!(price.currency, "EUR");
        assert_eq!(resp.header("Content-Type"), Some("application/json"));

        let bad: Result<Vec<u8>> = resp.json();
        assert!(matches!(bad, Err(Error::Parse { .. })));
    }
}
