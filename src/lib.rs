//! HTTP → gRPC API gateway library.
//!
//! Routes `/api/{version}/{module}/...` requests to backend services that
//! speak the `Reverse` RPC protocol, resolving services through a static
//! table or a coordinator and reusing pooled, optionally mutually
//! authenticated, channels.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod proto;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod transport;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
