//! Error types for provider calls.
//!
//! Each failure mode the host can react to gets its own variant; the variants
//! that matter for a developer-facing debug view carry a [`DebugContext`] with
//! the request body and the raw provider response.

use serde::Serialize;
use serde_json::Value;

/// Raw request/response pair attached to errors for debug display.
#[derive(Debug, Clone, Serialize)]
pub struct DebugContext {
    /// Display name of the provider config, when it has one.
    #[serde(rename = "providerName", skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// The JSON body that was sent.
    pub request: Value,
    /// The provider response body, when one was parseable.
    pub response: Option<Value>,
}

/// Errors produced while executing a provider config.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Transport-level failure (DNS, connection refused, ...) on the initial
    /// request. Poll-request transport failures are transient and swallowed.
    /// Hosts that split errors into network vs. HTTP kinds should map this
    /// variant to the network kind.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The provider answered the initial POST with a non-2xx status. This is
    /// the HTTP-status-code kind of failure, as opposed to [`HttpError`],
    /// which never saw a response at all.
    ///
    /// [`HttpError`]: GenerationError::HttpError
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        context: Option<Box<DebugContext>>,
    },

    /// A response body could not be parsed as JSON.
    #[error("Failed to parse response JSON: {0}")]
    JsonError(String),

    /// The provider config itself is unusable (bad header, missing poll
    /// settings, ...).
    #[error("Invalid provider configuration: {0}")]
    ConfigurationError(String),

    /// Async mode, but `jobIdPath` yielded nothing in the initial response.
    #[error("no job id found in response at path '{path}'")]
    MissingJobId { path: String },

    /// A poll status matched the failure heuristic.
    #[error("job failed with status: {status}")]
    JobFailed { status: String },

    /// The poll loop exhausted its attempt budget.
    #[error("polling timed out after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    /// The response parsed, but no image could be extracted from it.
    #[error("no image field found in the API response")]
    NoImageFound { context: Box<DebugContext> },

    /// The call was cancelled through its [`CancelHandle`](crate::utils::CancelHandle).
    #[error("operation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Debug context carried by this error, if any.
    pub fn debug_context(&self) -> Option<&DebugContext> {
        match self {
            Self::ApiError { context, .. } => context.as_deref(),
            Self::NoImageFound { context } => Some(context),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}
