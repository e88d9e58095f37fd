//! The top-level client: composes the parameter mapper, request executor,
//! poll engine and image extractor into one `generate` call.

use std::sync::Arc;

use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::error::{DebugContext, GenerationError};
use crate::extract::extract_image_url;
use crate::http::{RequestExecutor, build_headers};
use crate::params::build_request_body;
use crate::polling::PollingEngine;
use crate::types::{
    GenerateOptions, GenerateRequest, GenerationOutcome, OperationType, ProviderConfig,
};
use crate::utils::{Sleeper, TokioSleeper};

/// Client for user-configured image generation and editing providers.
///
/// Holds a shared `reqwest::Client`; calls are independent of each other and
/// safe to run concurrently. The provider config is only ever read.
///
/// ```rust,ignore
/// let client = ImageGenClient::new();
/// let config = ProviderConfig::new("https://api.example.com/v1/images")
///     .with_api_key("sk-...")
///     .with_param("input.prompt", ParamSpec::prompt());
/// let outcome = client
///     .generate(&GenerateRequest::generation("a red fox"), &config, &Default::default())
///     .await?;
/// ```
#[derive(Clone)]
pub struct ImageGenClient {
    http_client: reqwest::Client,
    executor: RequestExecutor,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for ImageGenClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageGenClient {
    pub fn new() -> Self {
        Self::with_http_client(reqwest::Client::new())
    }

    /// Use a pre-configured HTTP client (proxies, timeouts, ...).
    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self {
            executor: RequestExecutor::new(http_client.clone()),
            http_client,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleep implementation used between poll attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run one generation or edit call against `config`.
    ///
    /// Builds the request body from the config's parameter mapping, POSTs it,
    /// drives the poll loop for async providers, extracts the image reference
    /// from the final response, and normalizes remote URLs to data-URIs
    /// (best effort; the remote URL is returned unchanged if embedding fails).
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        config: &ProviderConfig,
        options: &GenerateOptions,
    ) -> Result<GenerationOutcome, GenerationError> {
        // Source images only apply to edit operations; for plain generation
        // the `imageUrl`-tagged params keep their static fallback.
        let source_image = match request.operation {
            OperationType::Edit => request.source_image_url.as_deref(),
            OperationType::Generate => None,
        };
        let request_body =
            build_request_body(&request.prompt, &config.custom_params, source_image);
        let headers = build_headers(config)?;

        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(GenerationError::Cancelled);
        }

        tracing::debug!(endpoint = %config.endpoint, "sending image generation request");
        let initial = self
            .executor
            .post_json(&config.endpoint, &headers, &request_body, config.name.as_deref())
            .await;
        // Discard whatever the request produced if a cancel landed while it
        // was in flight.
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(GenerationError::Cancelled);
        }
        let initial = initial?;

        let response_data = if config.async_mode {
            let settings = config.poll_settings()?;
            let engine = PollingEngine {
                executor: &self.executor,
                sleeper: self.sleeper.as_ref(),
            };
            engine.run(&initial, &settings, &headers, options).await?
        } else {
            initial
        };

        let extracted = extract_image_url(&response_data, config.response_path.as_deref())
            .ok_or_else(|| GenerationError::NoImageFound {
                context: Box::new(DebugContext {
                    provider_name: config.name.clone(),
                    request: request_body.clone(),
                    response: Some(response_data.clone()),
                }),
            })?;

        let image_url = if extracted.starts_with("http") {
            self.fetch_as_data_uri(&extracted).await
        } else {
            extracted
        };

        Ok(GenerationOutcome {
            request_body,
            response_data,
            image_url,
        })
    }

    /// Fire a minimal request at the endpoint to verify it is reachable and
    /// accepts the configured auth. The raw parameter specs are merged at the
    /// top level, as the settings UI this serves has always done.
    pub async fn test_connection(&self, config: &ProviderConfig) -> Result<(), GenerationError> {
        if config.endpoint.is_empty() {
            return Err(GenerationError::ConfigurationError(
                "missing endpoint".to_string(),
            ));
        }
        let headers = build_headers(config)?;
        let mut body = serde_json::Map::new();
        body.insert("prompt".to_string(), Value::from("test"));
        body.insert("n".to_string(), Value::from(1));
        for (key, spec) in &config.custom_params {
            body.insert(key.clone(), serde_json::to_value(spec)?);
        }
        self.executor
            .post_json(
                &config.endpoint,
                &headers,
                &Value::Object(body),
                config.name.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// Best-effort data-URI embedding of a remote image.
    async fn fetch_as_data_uri(&self, url: &str) -> String {
        match self.try_fetch_as_data_uri(url).await {
            Ok(data_uri) => data_uri,
            Err(e) => {
                tracing::warn!("failed to embed remote image, keeping original URL: {e}");
                url.to_string()
            }
        }
    }

    async fn try_fetch_as_data_uri(&self, url: &str) -> Result<String, GenerationError> {
        let resp = self.http_client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(GenerationError::HttpError(format!(
                "HTTP {}",
                resp.status().as_u16()
            )));
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let bytes = resp.bytes().await?;
        let mime = content_type
            .or_else(|| infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| "image/png".to_string());
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{mime};base64,{encoded}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamSpec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_connection_posts_probe_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images"))
            .and(body_partial_json(json!({"prompt": "test", "n": 1, "model": "flux"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig::new(format!("{}/v1/images", server.uri()))
            .with_param("model", ParamSpec::value("flux"));
        ImageGenClient::new().test_connection(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_reports_http_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad key"})))
            .mount(&server)
            .await;

        let config = ProviderConfig::new(server.uri());
        let err = ImageGenClient::new()
            .test_connection(&config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::ApiError { code: 401, ref message, .. } if message == "bad key"
        ));
    }

    #[tokio::test]
    async fn cancel_during_initial_request_discards_its_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "data:image/png;base64,AA=="}))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let handle = crate::utils::new_cancel_handle();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let config = ProviderConfig::new(format!("{}/v1/images", server.uri()));
        let err = ImageGenClient::new()
            .generate(
                &GenerateRequest::generation("a red fox"),
                &config,
                &GenerateOptions::default().with_cancel(handle),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn normalization_failure_keeps_remote_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ImageGenClient::new();
        let url = format!("{}/gone.png", server.uri());
        assert_eq!(client.fetch_as_data_uri(&url).await, url);
    }

    #[tokio::test]
    async fn normalization_prefers_content_type_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFFu8, 0xD8, 0xFF]),
            )
            .mount(&server)
            .await;

        let client = ImageGenClient::new();
        let data_uri = client
            .fetch_as_data_uri(&format!("{}/img", server.uri()))
            .await;
        assert!(data_uri.starts_with("data:image/jpeg;base64,"));
    }
}
