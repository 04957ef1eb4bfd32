use crate::transport::Method;

/// Per-call observability record returned by the `*_with_stats` methods.
#[derive(Debug, Clone)]
pub struct CallStats {
    pub method: Method,
    pub url: String,
    /// Cache / dedup key (GET only).
    pub key: Option<String>,
    pub http_status: u16,
    /// Network attempts made, 0 for a cache hit.
    pub attempts: u32,
    pub retry_count: u32,
    pub cache_hit: bool,
    /// The call joined an attempt started by another caller.
    pub deduplicated: bool,
    pub duration_ms: u128,
    /// `x-request-id` of the attempt that produced the response.
    pub request_id: Option<String>,
}
