//! Request, configuration and result types.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GenerationError;
use crate::utils::CancelHandle;

/// What a configured request field should be filled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    /// Replaced by the caller-supplied prompt text.
    Prompt,
    /// Replaced by the source image reference (edit operations only).
    ImageUrl,
    /// Any other tag a config may carry; resolves to the static value.
    #[serde(untagged)]
    Other(String),
}

/// A single entry of a provider's parameter mapping: either a raw JSON value,
/// or a `{fieldType, value}` pair that is substituted at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    /// Tagged form; `value` is the static fallback when the tag does not apply.
    Tagged {
        #[serde(rename = "fieldType")]
        field_type: FieldType,
        #[serde(default)]
        value: Value,
    },
    /// Plain value placed into the body as-is.
    Static(Value),
}

impl ParamSpec {
    /// Entry that receives the prompt text.
    pub fn prompt() -> Self {
        Self::Tagged {
            field_type: FieldType::Prompt,
            value: Value::Null,
        }
    }

    /// Entry that receives the source image URL, with a static fallback for
    /// plain generation calls.
    pub fn image_url(fallback: impl Into<Value>) -> Self {
        Self::Tagged {
            field_type: FieldType::ImageUrl,
            value: fallback.into(),
        }
    }

    /// Plain static value.
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Static(v.into())
    }
}

/// A user-authored remote image-generation or image-editing HTTP API.
///
/// The crate only ever reads this; a fresh request body is built per call.
/// Field names follow the JSON the embedding application stores
/// (`camelCase`), so configs deserialize unchanged.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Display name, used in error debug context.
    #[serde(default)]
    pub name: Option<String>,
    /// Absolute URL the initial POST goes to.
    pub endpoint: String,
    /// API key, injected as a bearer token unless the config already sets an
    /// `Authorization` header.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
    /// Declarative request-body mapping: dotted path -> spec.
    #[serde(default)]
    pub custom_params: BTreeMap<String, ParamSpec>,
    /// Primary path for image extraction, tried before the shape heuristics.
    #[serde(default)]
    pub response_path: Option<String>,
    /// Whether the provider is a submit-then-poll job API.
    #[serde(default)]
    pub async_mode: bool,
    /// Path to the job id in the initial response (async mode).
    #[serde(default)]
    pub job_id_path: Option<String>,
    /// Poll URL template containing a literal `{id}` (async mode).
    #[serde(default)]
    pub poll_url: Option<String>,
    /// Path to the status value in each poll response (async mode).
    #[serde(default)]
    pub status_path: Option<String>,
    /// Status value (exact string or regex pattern) that means success.
    #[serde(default)]
    pub success_value: Option<String>,
    /// Seconds between poll attempts; defaults to 2.
    #[serde(default, alias = "pollIntervalSeconds")]
    pub poll_interval: Option<u64>,
}

impl ProviderConfig {
    /// Create a config for a synchronous provider at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            name: None,
            endpoint: endpoint.into(),
            api_key: None,
            custom_headers: HashMap::new(),
            custom_params: BTreeMap::new(),
            response_path: None,
            async_mode: false,
            job_id_path: None,
            poll_url: None,
            status_path: None,
            success_value: None,
            poll_interval: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_param(mut self, path: impl Into<String>, spec: ParamSpec) -> Self {
        self.custom_params.insert(path.into(), spec);
        self
    }

    pub fn with_response_path(mut self, path: impl Into<String>) -> Self {
        self.response_path = Some(path.into());
        self
    }

    /// Turn on async job polling.
    pub fn with_async_polling(
        mut self,
        job_id_path: impl Into<String>,
        poll_url: impl Into<String>,
        status_path: impl Into<String>,
        success_value: impl Into<String>,
    ) -> Self {
        self.async_mode = true;
        self.job_id_path = Some(job_id_path.into());
        self.poll_url = Some(poll_url.into());
        self.status_path = Some(status_path.into());
        self.success_value = Some(success_value.into());
        self
    }

    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval = Some(seconds);
        self
    }

    /// Validated view of the async fields.
    ///
    /// A missing `jobIdPath` is left to the poll engine (it surfaces as
    /// `MissingJobId`); the other three have no sane fallback.
    pub(crate) fn poll_settings(&self) -> Result<PollSettings, GenerationError> {
        let require = |field: Option<&String>, name: &str| {
            field.cloned().ok_or_else(|| {
                GenerationError::ConfigurationError(format!("asyncMode requires `{name}`"))
            })
        };
        Ok(PollSettings {
            job_id_path: self.job_id_path.clone().unwrap_or_default(),
            poll_url: require(self.poll_url.as_ref(), "pollUrl")?,
            status_path: require(self.status_path.as_ref(), "statusPath")?,
            success_value: require(self.success_value.as_ref(), "successValue")?,
            interval: Duration::from_secs(self.poll_interval.unwrap_or(2)),
        })
    }
}

/// Resolved polling parameters for one async call.
#[derive(Debug, Clone)]
pub(crate) struct PollSettings {
    pub job_id_path: String,
    pub poll_url: String,
    pub status_path: String,
    pub success_value: String,
    pub interval: Duration,
}

/// The kind of call being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Generate,
    Edit,
}

/// One image-generation or image-edit call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Prompt text describing the image.
    pub prompt: String,
    pub operation: OperationType,
    /// Source image for edit operations; a remote URL or a data-URI.
    pub source_image_url: Option<String>,
}

impl GenerateRequest {
    pub fn generation(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            operation: OperationType::Generate,
            source_image_url: None,
        }
    }

    pub fn edit(prompt: impl Into<String>, source_image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            operation: OperationType::Edit,
            source_image_url: Some(source_image_url.into()),
        }
    }
}

/// Progress of one poll attempt, delivered to the host's progress sink.
#[derive(Debug, Clone)]
pub struct PollProgress {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Status text extracted from the poll response (or a placeholder when
    /// the status path resolved to nothing).
    pub status_text: String,
}

/// Fire-and-forget observer for poll progress.
pub type ProgressSink = Arc<dyn Fn(&PollProgress) + Send + Sync>;

/// Per-call options: progress reporting and cancellation.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub on_progress: Option<ProgressSink>,
    pub cancel: Option<CancelHandle>,
}

impl GenerateOptions {
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.on_progress = Some(sink);
        self
    }

    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }
}

/// Successful outcome of a call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    /// The JSON body that was POSTed, for history/debug display.
    #[serde(rename = "requestBody")]
    pub request_body: Value,
    /// The final provider response (the poll body that matched success, for
    /// async providers).
    #[serde(rename = "responseData")]
    pub response_data: Value,
    /// The generated image: a data-URI whenever normalization succeeded,
    /// otherwise the provider's remote URL.
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}
