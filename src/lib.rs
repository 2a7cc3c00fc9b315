//! Gatekeeper Library
//!
//! Credential checks, bearer tokens, rate limiting and the interceptor chain
//! that puts them in front of HTTP handlers. The binary wires these together;
//! tests drive the same router.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
