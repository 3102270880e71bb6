//! HTTP surface: router, handlers and server lifecycle.

pub mod routes;
pub mod server;
