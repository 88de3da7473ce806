//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP token bucket, 429 on exhaustion)
//!     → envelope built, module known
//!     → gate.rs (sign / hmac / mtls check, 401 or 500)
//!     → gate.rs stamps the outbound sign for the backend
//!     → dispatch
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing or unknown mode rejects every call
//! - No trust in client input; the client's sign is replaced before dispatch

pub mod gate;
pub mod rate_limit;

pub use gate::{compute_hmac, verify_hmac, SecurityGate, SecurityMode};
