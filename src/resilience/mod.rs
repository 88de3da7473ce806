//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend call:
//!     → timeouts.rs (service timeout combined with the caller deadline)
//!     → retries.rs (retry transient statuses with backoff.rs delays)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - The deadline covers the whole retry loop, not each attempt
//! - Retries only on statuses that say nothing was processed

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{call_with_retry, RetryPolicy};
pub use timeouts::{effective_deadline, with_deadline};
