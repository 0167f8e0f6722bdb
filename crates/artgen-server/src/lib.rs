//! HTTP surface and wiring for artgen: operator-gated routes that generate
//! images from prompts and commit them into configured storages.

pub mod config;
pub mod http;
pub mod state;

pub use config::{Config, FieldConfig, ValidationResult};
pub use http::{router, serve, ApiError, OperatorGate};
pub use state::{AppState, Services};
