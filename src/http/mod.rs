//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, TLS acceptor)
//!     → handlers.rs (route, authorize, dispatch)
//!         → request.rs (envelope + arguments)
//!         → heartbeat.rs (local answer or coordinator relay)
//!         → session.rs (session check, optional)
//!     → response.rs (status from httpcode, JSON body or file download)
//!     → Send to client
//! ```

pub mod handlers;
pub mod heartbeat;
pub mod request;
pub mod response;
pub mod server;
pub mod session;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
