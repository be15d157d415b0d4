//! Quota-gated chat assistant server - Library exports for testing

pub mod api;
pub mod core;
pub mod infrastructure;
