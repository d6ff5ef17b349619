//! Control API (§4.8): the HTTP surface for local UI and federation
//! consumers.

pub mod client;
pub mod routes;

pub use routes::{build_router, ApiState};
