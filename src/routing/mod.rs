//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! /api/{version}/{module}[/{param}[/{param_id}]]
//!     → path.rs (split and validate segments)
//!     → ApiPath { version, module, param, param_id }
//!     → module names the backend service
//! ```
//!
//! # Design Decisions
//! - One route shape; the module segment is the service name
//! - Deterministic: same path always yields the same `ApiPath`
//! - Extra segments are a miss, not silently dropped

pub mod path;

pub use path::{ApiPath, API_PREFIX, ENTRYPOINT_MODULE, HEARTBEAT_MODULE, INFO_MODULE};
