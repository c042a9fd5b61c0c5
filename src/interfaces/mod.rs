//! Transport-facing adapters.

pub mod commands;
pub mod csv;
pub mod dispatcher;
