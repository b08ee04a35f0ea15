// Library root
// -----------
// This crate exposes the audit API client as a library; the binary
// (`main.rs`) drives it through an interactive menu.
//
// Module responsibilities:
// - `api`: configuration, request/attachment types and the blocking HTTP
//   client that submits audits and probes the health endpoint.
// - `error`: the error type returned by `api`.
// - `ui`: terminal flows (prompts, spinners, result printing) built on top
//   of `api`. File existence checks live here, not in the client.
pub mod api;
pub mod error;
pub mod ui;

pub use api::{ApiClient, AuditRequest, AuditResponse, ClientConfig, HealthStatus, ImageAttachment};
pub use error::AuditError;
