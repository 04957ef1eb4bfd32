use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the client's `cache.enabled` for this call (GET only).
    pub cache: Option<bool>,
    /// Explicit cache / dedup key instead of the derived one.
    pub cache_key: Option<String>,
    /// Merged over the client's default headers.
    pub headers: BTreeMap<String, String>,
    /// Stop waiting (and cancel the network call) when this fires.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
