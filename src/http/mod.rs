//! HTTP surface: health and the WebSocket upgrade

pub mod routes;

pub use routes::build_router;
