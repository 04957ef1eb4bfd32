//! Request key derivation.
//!
//! One key space serves both the response cache and in-flight deduplication.

use crate::transport::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Stable identity of a logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RequestKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives [`RequestKey`]s from `(method, url, body)`.
///
/// Keys look like `GET:https://host/path`; requests with a body get the
/// SHA-256 of the canonical body appended. Object fields are sorted at every
/// depth before hashing, so field order never changes the key.
#[derive(Debug, Clone, Default)]
pub struct RequestKeyBuilder {
    prefix: Option<String>,
}

impl RequestKeyBuilder {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Namespace every key (e.g. per tenant or per API version).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn key(&self, method: Method, url: &str, body: Option<&Value>) -> RequestKey {
        let mut key = String::with_capacity(url.len() + 80);
        if let Some(ref p) = self.prefix {
            key.push_str(p);
            key.push(':');
        }
        key.push_str(method.as_str());
        key.push(':');
        key.push_str(url);
        if let Some(body) = body {
            key.push(':');
            key.push_str(&body_digest(body));
        }
        RequestKey(key)
    }
}

fn body_digest(body: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(body, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Serialize with object keys sorted, independent of serde_json's map ordering.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
