use crate::client::ResponseBody;
use crate::error_code::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key or option that caused the error (e.g., "config.base_url")
    pub field_path: Option<String>,
    /// Additional context about the error
    pub details: Option<String>,
    /// Component that produced the error (e.g., "timeout_guard", "http_transport")
    pub source: Option<String>,
    /// Resolved request URL
    pub url: Option<String>,
    /// Client-generated correlation id sent as `x-request-id`
    pub request_id: Option<String>,
    /// 0-based attempt on which the error occurred
    pub attempt: Option<u32>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// The single error type returned by the client.
///
/// `Clone` so that every caller joined on a deduplicated request receives the
/// same error value.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Connection error: {message}{}", format_context(.context))]
    Connection {
        message: String,
        context: ErrorContext,
    },

    #[error("Request timed out after {}ms{}", .timeout.as_millis(), format_context(.context))]
    Timeout {
        timeout: Duration,
        context: ErrorContext,
    },

    #[error("HTTP {status} {status_text}: {message}{}", format_context(.context))]
    Http {
        status: u16,
        status_text: String,
        message: String,
        data: ResponseBody,
        retry_after: Option<Duration>,
        context: ErrorContext,
    },

    #[error("Parse error: {message}{}", format_context(.context))]
    Parse {
        message: String,
        data: Option<String>,
        context: ErrorContext,
    },

    #[error("Request cancelled{}", format_context(.context))]
    Cancelled { context: ErrorContext },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if let Some(ref url) = ctx.url {
        parts.push(format!("url: {}", url));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Error::Connection {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Error::Timeout {
            timeout,
            context: ErrorContext::new(),
        }
    }

    pub fn cancelled() -> Self {
        Error::Cancelled {
            context: ErrorContext::new(),
        }
    }

    pub fn parse(msg: impl Into<String>, raw: Option<String>) -> Self {
        Error::Parse {
            message: msg.into(),
            data: raw,
            context: ErrorContext::new(),
        }
    }

    /// Build an HTTP error from a non-success response.
    ///
    /// The message is taken from a JSON `message` or `error` field when the
    /// server sent one, otherwise it is derived from the status line.
    pub fn http(
        status: u16,
        status_text: impl Into<String>,
        data: ResponseBody,
        retry_after: Option<Duration>,
    ) -> Self {
        let status_text = status_text.into();
        let message = data
            .as_json()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error").and_then(|e| e.get("message").or(Some(e))))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("Request failed with status code {}", status));
        Error::Http {
            status,
            status_text,
            message,
            data,
            retry_after,
            context: ErrorContext::new(),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Replace the error context.
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        *self.context_mut() = ctx;
        self
    }

    /// Adjust the existing context in place.
    pub fn map_context(mut self, f: impl FnOnce(ErrorContext) -> ErrorContext) -> Self {
        let ctx = std::mem::take(self.context_mut());
        *self.context_mut() = f(ctx);
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Error::Configuration { context, .. }
            | Error::Connection { context, .. }
            | Error::Timeout { context, .. }
            | Error::Http { context, .. }
            | Error::Parse { context, .. }
            | Error::Cancelled { context } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Error::Configuration { context, .. }
            | Error::Connection { context, .. }
            | Error::Timeout { context, .. }
            | Error::Http { context, .. }
            | Error::Parse { context, .. }
            | Error::Cancelled { context } => context,
        }
    }

    /// Human-readable message without the context suffix.
    pub fn message(&self) -> String {
        match self {
            Error::Configuration { message, .. }
            | Error::Connection { message, .. }
            | Error::Http { message, .. }
            | Error::Parse { message, .. } => message.clone(),
            Error::Timeout { timeout, .. } => {
                format!("timeout of {}ms exceeded", timeout.as_millis())
            }
            Error::Cancelled { .. } => "request cancelled".to_string(),
        }
    }

    /// HTTP status, present only when the server actually responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn status_text(&self) -> Option<&str> {
        match self {
            Error::Http { status_text, .. } => Some(status_text.as_str()),
            _ => None,
        }
    }

    /// Raw response body of a failed response.
    pub fn data(&self) -> Option<&ResponseBody> {
        match self {
            Error::Http { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Server-requested delay before retrying (`Retry-After`).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Configuration { .. } => ErrorCode::Configuration,
            Error::Connection { .. } => ErrorCode::Connection,
            Error::Timeout { .. } => ErrorCode::Timeout,
            Error::Http { status, .. } => ErrorCode::from_http_status(*status),
            Error::Parse { .. } => ErrorCode::Parse,
            Error::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// True for failures where no response reached the client.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Timeout { .. })
    }
}
