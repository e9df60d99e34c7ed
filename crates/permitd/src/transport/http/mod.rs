//! HTTP/JSON transport.

mod routes;
mod server;

pub use routes::routes;
pub use server::{ServerConfig, serve};
