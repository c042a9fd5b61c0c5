//! Adapters for the domain ports: stores, the crypto invoice gateway and
//! the notifier.

pub mod crypto_pay;
pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
