//! Replay transport: chat events in, order table out.

pub mod event_reader;
pub mod order_writer;
