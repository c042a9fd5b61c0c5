//! Application layer: the order lifecycle engine, the per-customer session
//! tracker and the operator allow-list.

pub mod access;
pub mod engine;
pub mod session;
