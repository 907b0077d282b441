//! Infrastructure adapters for the authorization core.

pub mod sessions;
