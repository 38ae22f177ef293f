//! Status, health and log push over HTTP.

pub mod routes;
pub mod server;

pub use routes::create_router;
pub use server::{serve, serve_on, shutdown_signal};
