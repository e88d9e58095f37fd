//! Header assembly and JSON request execution.

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::error::{DebugContext, GenerationError};
use crate::types::ProviderConfig;

/// Strip an API key down to something representable in an HTTP header:
/// trimmed, printable ASCII (0x20..=0x7E) only. User-pasted keys routinely
/// carry trailing newlines or invisible Unicode.
pub(crate) fn sanitize_header_value(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .collect()
}

/// Assemble the header set shared by the initial POST and every poll GET:
/// JSON content type, the config's custom headers, and bearer-token injection
/// unless the config already supplies an `Authorization` header.
pub(crate) fn build_headers(config: &ProviderConfig) -> Result<HeaderMap, GenerationError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, value) in &config.custom_headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            GenerationError::ConfigurationError(format!("Invalid header name '{key}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            GenerationError::ConfigurationError(format!("Invalid header value for '{key}': {e}"))
        })?;
        headers.insert(name, value);
    }

    if let Some(api_key) = &config.api_key
        && !headers.contains_key(AUTHORIZATION)
    {
        let sanitized = sanitize_header_value(api_key.expose_secret());
        let auth_value = if sanitized.to_lowercase().starts_with("bearer ") {
            sanitized
        } else {
            format!("Bearer {sanitized}")
        };
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| {
                GenerationError::ConfigurationError(format!("Invalid API key format: {e}"))
            })?,
        );
    }

    Ok(headers)
}

/// Raw result of a poll GET; the poll loop decides what counts as transient.
#[derive(Debug)]
pub(crate) struct JsonResponse {
    pub status: StatusCode,
    /// Parsed body, `None` when it was not valid JSON.
    pub body: Option<Value>,
}

/// Thin JSON-over-HTTP executor around a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub(crate) struct RequestExecutor {
    http_client: reqwest::Client,
}

impl RequestExecutor {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// POST `body` as JSON and return the parsed response.
    ///
    /// Non-2xx responses become `ApiError` with a best-effort human-readable
    /// message (`message`, else `detail`, else the raw JSON) and full debug
    /// context; transport failures become `HttpError`.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &Value,
        provider_name: Option<&str>,
    ) -> Result<Value, GenerationError> {
        let resp = self
            .http_client
            .post(url)
            .headers(headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::HttpError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let parsed: Option<Value> = resp.json().await.ok();
            let message = parsed
                .as_ref()
                .map(|data| {
                    let pick = |key: &str| {
                        data.get(key)
                            .and_then(Value::as_str)
                            .filter(|s| !s.is_empty())
                    };
                    pick("message")
                        .or_else(|| pick("detail"))
                        .map(str::to_string)
                        .unwrap_or_else(|| data.to_string())
                })
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(GenerationError::ApiError {
                code: status.as_u16(),
                message,
                context: Some(Box::new(DebugContext {
                    provider_name: provider_name.map(str::to_string),
                    request: body.clone(),
                    response: parsed,
                })),
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(Into::into)
    }

    /// GET `url` and best-effort parse the body. Never classifies the status.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<JsonResponse, GenerationError> {
        let resp = self
            .http_client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| GenerationError::HttpError(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .ok()
            .and_then(|t| serde_json::from_str(&t).ok());
        Ok(JsonResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_header(config: &ProviderConfig) -> Option<String> {
        build_headers(config)
            .unwrap()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    #[test]
    fn sanitize_strips_whitespace_and_non_ascii() {
        assert_eq!(sanitize_header_value("  sk-abc\n"), "sk-abc");
        assert_eq!(sanitize_header_value("sk-\u{200b}abc\u{00e9}"), "sk-abc");
        assert_eq!(sanitize_header_value(""), "");
    }

    #[test]
    fn bearer_prefix_added_once() {
        let cfg = ProviderConfig::new("https://x.test").with_api_key("sk-abc\n");
        assert_eq!(auth_header(&cfg).as_deref(), Some("Bearer sk-abc"));

        let cfg = ProviderConfig::new("https://x.test").with_api_key("Bearer sk-abc");
        assert_eq!(auth_header(&cfg).as_deref(), Some("Bearer sk-abc"));

        let cfg = ProviderConfig::new("https://x.test").with_api_key("bearer sk-abc");
        assert_eq!(auth_header(&cfg).as_deref(), Some("bearer sk-abc"));
    }

    #[test]
    fn explicit_authorization_header_wins() {
        let cfg = ProviderConfig::new("https://x.test")
            .with_api_key("sk-ignored")
            .with_header("Authorization", "Token custom");
        assert_eq!(auth_header(&cfg).as_deref(), Some("Token custom"));
    }

    #[test]
    fn content_type_defaults_to_json_but_can_be_overridden() {
        let cfg = ProviderConfig::new("https://x.test");
        let headers = build_headers(&cfg).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

        let cfg = cfg.with_header("Content-Type", "application/json; charset=utf-8");
        let headers = build_headers(&cfg).unwrap();
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }

    #[test]
    fn invalid_custom_header_is_a_config_error() {
        let cfg = ProviderConfig::new("https://x.test").with_header("bad header", "v");
        assert!(matches!(
            build_headers(&cfg),
            Err(GenerationError::ConfigurationError(_))
        ));
    }
}
