//! Bounded polling loop for asynchronous (submit-then-poll) providers.
//!
//! After a successful initial POST, the job id is extracted from the
//! response, substituted into the poll URL template, and the derived URL is
//! polled on a fixed interval until the status matches the configured success
//! value, matches a failure heuristic, or the attempt budget runs out.

use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::GenerationError;
use crate::http::RequestExecutor;
use crate::json_path::{display_string, get_path, is_truthy};
use crate::types::{GenerateOptions, PollProgress, PollSettings};
use crate::utils::Sleeper;

/// Hard ceiling on poll attempts. Not user-configurable: a provider whose job
/// never completes must not keep background work alive indefinitely.
pub const MAX_POLL_ATTEMPTS: u32 = 60;

/// Status text reported when the configured status path resolves to nothing.
/// Must not contain `fail` or `error`, which the failure heuristic matches.
const UNKNOWN_STATUS: &str = "unknown (status path mismatch?)";

/// Success when the status equals the configured value exactly, or when the
/// value compiled as a regex matches the stringified status. Both semantics
/// are kept: configs in the wild rely on the regex fallback.
fn is_success_status(status: &str, success_value: &str, pattern: Option<&Regex>) -> bool {
    status == success_value || pattern.is_some_and(|re| re.is_match(status))
}

/// Failure heuristic: the status contains `fail` or `error`, case-insensitive.
fn is_failure_status(status: &str) -> bool {
    let lower = status.to_lowercase();
    lower.contains("fail") || lower.contains("error")
}

fn cancelled(options: &GenerateOptions) -> bool {
    options.cancel.as_ref().is_some_and(|c| c.is_cancelled())
}

/// Drives the poll loop for one call.
pub(crate) struct PollingEngine<'a> {
    pub executor: &'a RequestExecutor,
    pub sleeper: &'a dyn Sleeper,
}

impl PollingEngine<'_> {
    /// Poll until success, failure, timeout, or cancellation, and return the
    /// final response body on success.
    pub async fn run(
        &self,
        initial_response: &Value,
        settings: &PollSettings,
        headers: &HeaderMap,
        options: &GenerateOptions,
    ) -> Result<Value, GenerationError> {
        let job_id = get_path(initial_response, &settings.job_id_path)
            .filter(|v| is_truthy(v))
            .map(display_string)
            .ok_or_else(|| GenerationError::MissingJobId {
                path: settings.job_id_path.clone(),
            })?;
        let poll_url = settings.poll_url.replace("{id}", &job_id);

        let success_pattern = match Regex::new(&settings.success_value) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(
                    pattern = %settings.success_value,
                    "successValue is not a valid regex, using exact match only: {e}"
                );
                None
            }
        };

        tracing::debug!(%poll_url, interval = ?settings.interval, "entering poll loop");

        for attempt in 1..=MAX_POLL_ATTEMPTS {
            if cancelled(options) {
                return Err(GenerationError::Cancelled);
            }
            self.sleeper.sleep(settings.interval).await;
            if cancelled(options) {
                return Err(GenerationError::Cancelled);
            }

            let result = self.executor.get_json(&poll_url, headers).await;
            // A cancel that lands while the request is in flight discards the
            // completed attempt's result, success included.
            if cancelled(options) {
                return Err(GenerationError::Cancelled);
            }
            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    // Poll transport failures are transient; the attempt is
                    // still consumed.
                    tracing::debug!(attempt, "poll request failed: {e}");
                    continue;
                }
            };
            if !resp.status.is_success() {
                tracing::debug!(attempt, status = %resp.status, "non-2xx poll response, ignoring");
                continue;
            }
            let Some(body) = resp.body else {
                tracing::debug!(attempt, "unparseable poll body, ignoring");
                continue;
            };

            let status_value = get_path(&body, &settings.status_path).cloned();
            let status_text = status_value
                .as_ref()
                .map(display_string)
                .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
            tracing::debug!(attempt, status = %status_text, "poll status");

            if let Some(sink) = &options.on_progress {
                sink(&PollProgress {
                    attempt,
                    max_attempts: MAX_POLL_ATTEMPTS,
                    status_text: status_text.clone(),
                });
            }

            // A missing status is observational only; it does not feed the
            // success/failure checks.
            if status_value.is_none() {
                continue;
            }

            if is_success_status(&status_text, &settings.success_value, success_pattern.as_ref()) {
                return Ok(body);
            }
            if is_failure_status(&status_text) {
                return Err(GenerationError::JobFailed {
                    status: status_text,
                });
            }
        }

        Err(GenerationError::PollTimeout {
            attempts: MAX_POLL_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::types::ProviderConfig;
    use crate::utils::new_cancel_handle;

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn settings(poll_url: &str, success_value: &str) -> PollSettings {
        ProviderConfig::new("https://unused.test")
            .with_async_polling("id", poll_url, "state", success_value)
            .poll_settings()
            .unwrap()
    }

    #[test]
    fn success_check_has_exact_and_regex_semantics() {
        let re = Regex::new("^done$").ok();
        assert!(is_success_status("done", "^done$", re.as_ref()));
        assert!(!is_success_status("not done", "^done$", re.as_ref()));

        // Unanchored pattern matches as a substring, by design.
        let re = Regex::new("true").ok();
        assert!(is_success_status("istrue", "true", re.as_ref()));

        // Invalid pattern degrades to exact equality.
        assert!(is_success_status("(done", "(done", None));
        assert!(!is_success_status("done", "(done", None));
    }

    #[test]
    fn failure_check_is_case_insensitive_substring() {
        assert!(is_failure_status("Error: quota exceeded"));
        assert!(is_failure_status("FAILED"));
        assert!(!is_failure_status("running"));
        assert!(!is_failure_status(UNKNOWN_STATUS));
    }

    #[tokio::test]
    async fn missing_job_id_fails_without_polling() {
        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };
        let err = engine
            .run(
                &json!({"task": {}}),
                &settings("https://unused.test/{id}", "done"),
                &HeaderMap::new(),
                &GenerateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingJobId { path } if path == "id"));
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn never_matching_status_times_out_after_sixty_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/job1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "running"})))
            .expect(60)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };

        let progress: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = progress.clone();
        let options = GenerateOptions::default()
            .with_progress(Arc::new(move |p: &PollProgress| {
                seen.lock().unwrap().push(p.attempt)
            }));

        let err = engine
            .run(
                &json!({"id": "job1"}),
                &settings(&format!("{}/status/{{id}}", server.uri()), "done"),
                &HeaderMap::new(),
                &options,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::PollTimeout { attempts: 60 }));
        let delays = sleeper.delays.lock().unwrap();
        assert_eq!(delays.len(), 60);
        assert!(delays.iter().all(|d| *d == Duration::from_secs(2)));
        // Progress delivered in attempt order.
        assert_eq!(*progress.lock().unwrap(), (1..=60).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failure_status_stops_on_first_appearance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/j"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"state": "Error: quota exceeded"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };
        let err = engine
            .run(
                &json!({"id": "j"}),
                &settings(&format!("{}/status/{{id}}", server.uri()), "done"),
                &HeaderMap::new(),
                &GenerateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, GenerationError::JobFailed { status } if status == "Error: quota exceeded")
        );
    }

    #[tokio::test]
    async fn non_2xx_polls_are_transient_but_consume_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/j"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status/j"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "done"})))
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };
        let body = engine
            .run(
                &json!({"id": "j"}),
                &settings(&format!("{}/status/{{id}}", server.uri()), "done"),
                &HeaderMap::new(),
                &GenerateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(body["state"], json!("done"));
        assert_eq!(sleeper.delays.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_scheduling_polls() {
        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };
        let handle = new_cancel_handle();
        handle.cancel();
        let err = engine
            .run(
                &json!({"id": "j"}),
                &settings("https://unused.test/{id}", "done"),
                &HeaderMap::new(),
                &GenerateOptions::default().with_cancel(handle),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_during_in_flight_poll_discards_its_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/j"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"state": "done"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };
        let handle = new_cancel_handle();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        // The GET completes with a success body, but the cancel arrived while
        // it was in flight, so the body must not be returned.
        let err = engine
            .run(
                &json!({"id": "j"}),
                &settings(&format!("{}/status/{{id}}", server.uri()), "done"),
                &HeaderMap::new(),
                &GenerateOptions::default().with_cancel(handle),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn numeric_job_id_is_substituted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(reqwest::Client::new());
        let sleeper = RecordingSleeper::default();
        let engine = PollingEngine {
            executor: &executor,
            sleeper: &sleeper,
        };
        engine
            .run(
                &json!({"id": 42}),
                &settings(&format!("{}/status/{{id}}", server.uri()), "done"),
                &HeaderMap::new(),
                &GenerateOptions::default(),
            )
            .await
            .unwrap();
    }
}
