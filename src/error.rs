use crate::domain::customer::CustomerId;
use crate::domain::invoice::InvoiceStatus;
use crate::domain::order::{OrderAction, OrderId, OrderStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Order #{order} cannot {action} while {status}")]
    InvalidTransition {
        order: OrderId,
        status: OrderStatus,
        action: OrderAction,
    },
    #[error("Order #{0} not found")]
    NotFound(OrderId),
    #[error("Customer {0} is not allowed to run operator commands")]
    PermissionDenied(CustomerId),
    #[error("Order #{order} invoice is {status}, payment not verified")]
    PaymentNotVerified { order: OrderId, status: InvoiceStatus },
    #[error("No flow is waiting for this input")]
    NoActiveFlow,
    #[error("Crypto payments are not configured")]
    GatewayUnavailable,
    #[error("Invoice gateway error: {0}")]
    GatewayError(#[from] GatewayError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

/// Failure to talk to the invoice provider.
///
/// Never a statement about the payment itself: an invoice that is merely
/// unpaid or expired comes back as an [`InvoiceStatus`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider rejected the request: {name}")]
    Api { name: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

pub type Result<T, E = ShopError> = std::result::Result<T, E>;
