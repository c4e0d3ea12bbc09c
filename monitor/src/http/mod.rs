//! Minimal HTTP/1.1 exposition over a raw listening socket.
pub mod pages;
pub mod server;

pub use server::{ExpositionServer, Response};
