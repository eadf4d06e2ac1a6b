//! CareHub auth server.
//!
//! Loads [`config::AppConfig`], wires the auth engine onto a storage backend
//! and serves the authorize flow, the OAuth2 endpoints and `/login_by_phone`.

pub mod config;
pub mod observability;
pub mod seed;
pub mod server;

pub use server::{CarehubServer, ServerBuilder, build_app};
