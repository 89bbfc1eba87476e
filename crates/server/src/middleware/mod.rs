//! HTTP middleware.

pub mod cors;
pub mod panic;
pub mod request_id;

pub use cors::cors_middleware;
pub use panic::catch_panic_middleware;
pub use request_id::{RequestId, request_id_middleware};
