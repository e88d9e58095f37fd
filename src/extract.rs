//! Image extraction from arbitrary provider response shapes.
//!
//! A configured response path always wins; after that a fixed, ordered list of
//! shape heuristics covers the response formats seen in the wild (OpenAI-style
//! `data[]`, Stability-style `artifacts[]`, Replicate-style `output`, and flat
//! `url`/`image` keys). The order is a compatibility contract: responses can
//! carry several of these fields at once.

use serde_json::Value;

use crate::json_path::{get_path, is_truthy};

type ExtractRule = fn(&Value) -> Option<String>;

/// Fallback heuristics, tried in order after the configured path.
const FALLBACK_RULES: &[ExtractRule] = &[
    openai_data,
    stability_artifacts,
    replicate_output,
    flat_url,
    flat_image,
];

/// Find the generated image reference (URL or data-URI) in `body`.
pub fn extract_image_url(body: &Value, configured_path: Option<&str>) -> Option<String> {
    if let Some(path) = configured_path
        && let Some(v) = get_path(body, path).filter(|v| is_truthy(v))
        && let Some(s) = v.as_str()
    {
        return Some(s.to_string());
    }
    FALLBACK_RULES.iter().find_map(|rule| rule(body))
}

fn wrap_base64(b64: &str) -> String {
    format!("data:image/png;base64,{b64}")
}

fn string_field(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// `data[0].url`, else `data[0].b64_json` as a data-URI.
fn openai_data(body: &Value) -> Option<String> {
    let first = body.get("data")?.get(0)?;
    string_field(&first["url"])
        .or_else(|| first["b64_json"].as_str().map(wrap_base64))
}

/// `artifacts[0].base64` as a data-URI.
fn stability_artifacts(body: &Value) -> Option<String> {
    body.get("artifacts")?
        .get(0)?
        .get("base64")?
        .as_str()
        .map(wrap_base64)
}

/// `output` as a string, or the first element of an `output` array.
fn replicate_output(body: &Value) -> Option<String> {
    match body.get("output")? {
        Value::Array(items) => string_field(items.first()?),
        other => string_field(other),
    }
}

fn flat_url(body: &Value) -> Option<String> {
    string_field(body.get("url")?)
}

fn flat_image(body: &Value) -> Option<String> {
    string_field(body.get("image")?)
}
