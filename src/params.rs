//! Request-body construction from a declarative parameter mapping.

use std::collections::BTreeMap;

use rand::Rng;
use serde_json::Value;

use crate::json_path::{is_truthy, set_path};
use crate::types::{FieldType, ParamSpec};

/// Sentinel value replaced with a fresh random integer on every build.
pub const RANDOM_MARKER: &str = "__RANDOM__";

/// Build the outgoing JSON body for one call.
///
/// Each `(path, spec)` entry is resolved and placed at its (possibly nested)
/// path. `fieldType:"prompt"` entries receive the prompt; `fieldType:"imageUrl"`
/// entries receive `source_image_url` when one is supplied and fall back to
/// their static value otherwise. If no entry is tagged as the prompt, a
/// top-level `prompt` key is added, and `n` defaults to 1 unless the mapping
/// already set `n` or `N`. Never fails.
pub fn build_request_body(
    prompt: &str,
    custom_params: &BTreeMap<String, ParamSpec>,
    source_image_url: Option<&str>,
) -> Value {
    let mut body = Value::Object(serde_json::Map::new());

    for (path, spec) in custom_params {
        let mut final_value = match spec {
            ParamSpec::Tagged { field_type, value } => match field_type {
                FieldType::Prompt => Value::String(prompt.to_string()),
                FieldType::ImageUrl => match source_image_url {
                    Some(url) => Value::String(url.to_string()),
                    None => value.clone(),
                },
                FieldType::Other(_) => value.clone(),
            },
            ParamSpec::Static(value) => value.clone(),
        };

        if final_value.as_str() == Some(RANDOM_MARKER) {
            final_value = Value::from(random_seed());
        }

        set_path(&mut body, path, final_value);
    }

    let has_prompt_field = custom_params.values().any(|spec| {
        matches!(
            spec,
            ParamSpec::Tagged { field_type: FieldType::Prompt, .. }
        )
    });
    let map = body.as_object_mut().expect("body is always an object");
    if !has_prompt_field && !map.contains_key("prompt") {
        map.insert("prompt".to_string(), Value::String(prompt.to_string()));
    }

    let n_set = ["n", "N"]
        .iter()
        .any(|k| map.get(*k).is_some_and(is_truthy));
    if !n_set {
        map.insert("n".to_string(), Value::from(1));
    }

    body
}

/// Uniform random integer in `[0, 2^31 - 1]`. Deliberately a plain PRNG:
/// providers expect a "seed"-style integer, not key material.
fn random_seed() -> i64 {
    rand::thread_rng().gen_range(0..=i32::MAX as i64)
}
