//! Ambient HTTP binary for `ultrafast-models-sdk` (§1a): loads a TOML
//! config into a catalogue, router and pool, and exposes it behind a
//! minimal axum surface — `/health`, `/v1/models`, `/metrics`, and an
//! OpenAI-compatible `/v1/chat/completions` pass-through. All routing,
//! provisioning, and invocation logic lives in the SDK crate; this crate
//! is deliberately thin.

pub mod config;
pub mod gateway_error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use gateway_error::GatewayError;
pub use server::{create_server, AppState};
