//! Network layer.
//!
//! # Responsibilities
//! - Load listener certificates (one-way TLS or mTLS)
//! - Attach the verified client identity to requests

pub mod tls;

pub use tls::{load_tls_config, PeerIdentity, PeerIdentityAcceptor};
