//! 标准错误码：为客户端错误提供稳定的机器可读代码及重试语义。
//!
//! Standard error codes for the API client.
//!
//! Every [`Error`](crate::Error) maps to exactly one `ErrorCode`, so callers can
//! branch on a stable identifier instead of matching message text.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category    | Description                               |
//! |--------|-------------|-------------------------------------------|
//! | E1xxx  | client      | The server rejected the request (4xx)     |
//! | E2xxx  | rate        | Rate limiting (429)                       |
//! | E3xxx  | server      | Upstream or network failures              |
//! | E4xxx  | local       | Decoding, configuration and cancellation  |
//! | E9xxx  | unknown     | Catch-all / unclassified                  |
//!
//! ## Example
//!
//! ```rust
//! use resilient_api_client::error_code::ErrorCode;
//!
//! let code = ErrorCode::from_http_status(429);
//! assert_eq!(code.code(), "E2001");
//! assert!(code.retryable());
//! assert_eq!(code.category(), "rate");
//! ```

use std::fmt;

/// Machine-readable classification of a client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// E1001: Malformed request (400)
    InvalidRequest,
    /// E1002: Missing or invalid credentials (401)
    Authentication,
    /// E1003: Credentials valid but access denied (403)
    PermissionDenied,
    /// E1004: Resource does not exist (404)
    NotFound,
    /// E1005: State conflict (409)
    Conflict,
    /// E1006: Payload too large (413)
    RequestTooLarge,
    /// E1099: Any other 4xx response
    ClientError,
    /// E2001: Rate limit exceeded (429)
    RateLimited,
    /// E3001: Internal server error (5xx)
    ServerError,
    /// E3002: Service temporarily unavailable (503)
    Overloaded,
    /// E3003: Attempt exceeded its deadline
    Timeout,
    /// E3004: No response reached the client
    Connection,
    /// E4001: Response body could not be decoded
    Parse,
    /// E4002: Invalid client or call configuration
    Configuration,
    /// E4003: The caller or client cancelled the request
    Cancelled,
    /// E9999: Error could not be classified
    Unknown,
}

impl ErrorCode {
    /// Returns the canonical code string (e.g., `"E1004"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::Authentication => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::Conflict => "E1005",
            Self::RequestTooLarge => "E1006",
            Self::ClientError => "E1099",
            Self::RateLimited => "E2001",
            Self::ServerError => "E3001",
            Self::Overloaded => "E3002",
            Self::Timeout => "E3003",
            Self::Connection => "E3004",
            Self::Parse => "E4001",
            Self::Configuration => "E4002",
            Self::Cancelled => "E4003",
            Self::Unknown => "E9999",
        }
    }

    /// Returns the snake_case name (e.g., `"not_found"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RequestTooLarge => "request_too_large",
            Self::ClientError => "client_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Parse => "parse",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Returns whether errors with this code are retried by default.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::ServerError
                | Self::Overloaded
                | Self::Timeout
                | Self::Connection
        )
    }

    /// Returns the category: `"client"`, `"rate"`, `"server"`, `"local"`, or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::Conflict
            | Self::RequestTooLarge
            | Self::ClientError => "client",
            Self::RateLimited => "rate",
            Self::ServerError | Self::Overloaded | Self::Timeout | Self::Connection => "server",
            Self::Parse | Self::Configuration | Self::Cancelled => "local",
            Self::Unknown => "unknown",
        }
    }

    /// Maps an HTTP error status to its `ErrorCode`.
    ///
    /// Statuses below 400 are not errors and map to `Unknown`.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            503 => Self::Overloaded,
            500..=599 => Self::ServerError,
            400..=499 => Self::ClientError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
