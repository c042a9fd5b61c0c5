use super::customer::{Customer, CustomerId};
use super::invoice::{Invoice, InvoiceId, InvoiceRequest, InvoiceStatus};
use super::notification::Notification;
use super::order::{NewOrder, Order, OrderId, OrderPatch, OrderStatus};
use super::session::Flow;
use crate::error::{GatewayError, Result, ShopError};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Outcome of a guarded order write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Applied(Order),
    /// No order with that id.
    Missing,
    /// The order moved on; carries the status it holds now.
    Conflict(OrderStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    All,
    /// Every order that is neither completed nor cancelled.
    Active,
    Status(OrderStatus),
}

impl OrderFilter {
    pub fn matches(self, status: OrderStatus) -> bool {
        match self {
            OrderFilter::All => true,
            OrderFilter::Active => !status.is_terminal(),
            OrderFilter::Status(wanted) => status == wanted,
        }
    }
}

/// Aggregates the order table can answer on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTotals {
    pub completed_orders: u64,
    pub completed_revenue: Decimal,
    pub pending_orders: u64,
}

impl OrderTotals {
    /// Counts `order` in; revenue overflow is an error rather than a wrap.
    pub fn record(&mut self, order: &Order) -> Result<()> {
        match order.status {
            OrderStatus::Completed => {
                self.completed_orders += 1;
                self.completed_revenue = self
                    .completed_revenue
                    .checked_add(order.amount.value())
                    .ok_or_else(|| ShopError::InternalError("completed revenue overflowed".into()))?;
            }
            OrderStatus::Pending => self.pending_orders += 1,
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Inserts on first contact; afterwards only the display name is refreshed.
    async fn upsert(&self, id: CustomerId, display_name: &str) -> Result<Customer>;
    async fn count(&self) -> Result<u64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in `pending` and assigns the next id.
    async fn insert(&self, order: NewOrder) -> Result<Order>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    /// Atomically applies `patch` if the order is still in `expected`.
    async fn update(&self, id: OrderId, expected: OrderStatus, patch: OrderPatch)
    -> Result<StatusUpdate>;
    /// Matching orders, newest first.
    async fn list(&self, filter: OrderFilter) -> Result<Vec<Order>>;
    async fn totals(&self) -> Result<OrderTotals>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, customer: CustomerId) -> Result<Option<Flow>>;
    /// Replaces whatever flow the customer had.
    async fn set(&self, customer: CustomerId, flow: Flow) -> Result<()>;
    async fn clear(&self, customer: CustomerId) -> Result<Option<Flow>>;
    /// Replaces the customer's flow with `next` only while it still equals
    /// `expected` (`None` meaning no flow). Returns whether it did.
    async fn swap_if(
        &self,
        customer: CustomerId,
        expected: Option<&Flow>,
        next: Option<Flow>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError>;
    async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatus, GatewayError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivery is best effort; failures are the notifier's to log.
    async fn notify(&self, notification: Notification);
}

pub type CustomerStoreBox = Box<dyn CustomerStore>;
pub type OrderStoreBox = Box<dyn OrderStore>;
pub type SessionStoreBox = Box<dyn SessionStore>;
pub type InvoiceGatewayBox = Box<dyn InvoiceGateway>;
pub type NotifierBox = Box<dyn Notifier>;
