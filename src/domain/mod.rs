//! Domain types and the ports the application layer talks through.

pub mod customer;
pub mod invoice;
pub mod money;
pub mod notification;
pub mod order;
pub mod ports;
pub mod pricing;
pub mod session;
