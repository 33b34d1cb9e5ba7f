//! REST API

pub mod handlers;
pub mod middleware;
pub mod routes;
