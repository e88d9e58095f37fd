//! pictora
//!
//! A client for *user-configured* image generation and editing HTTP APIs.
//! Instead of one hardcoded integration per vendor, a [`ProviderConfig`]
//! describes the provider declaratively: endpoint and auth, a dotted-path
//! parameter mapping for the request body, an optional submit-then-poll job
//! flow, and a response path for extracting the generated image. The client
//! turns that description into a concrete call and returns a uniform
//! [`GenerationOutcome`] or a classified [`GenerationError`].
//!
//! The embedding application owns everything around this: provider
//! selection, persistence, and all user interaction. This crate only reads a
//! fully resolved config.
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod extract;
pub mod json_path;
pub mod params;
pub mod types;
pub mod utils;

mod http;
mod polling;

pub use client::ImageGenClient;
pub use error::{DebugContext, GenerationError};
pub use params::RANDOM_MARKER;
pub use polling::MAX_POLL_ATTEMPTS;
pub use types::{
    FieldType, GenerateOptions, GenerateRequest, GenerationOutcome, OperationType, ParamSpec,
    PollProgress, ProgressSink, ProviderConfig,
};
pub use utils::{CancelHandle, Sleeper, TokioSleeper, new_cancel_handle};
