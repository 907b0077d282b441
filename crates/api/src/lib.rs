//! HTTP boundary for the authorization core: bearer authentication, TOTP
//! step-up endpoints and authorization checks.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
