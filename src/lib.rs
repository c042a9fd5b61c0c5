//! Order lifecycle and payment reconciliation for a chat-driven storefront.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
