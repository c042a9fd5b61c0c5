use super::customer::CustomerId;
use super::order::{OrderId, OrderStatus};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    EvidenceSubmitted,
    PaymentConfirmed,
    Completed,
    Cancelled,
}

impl OrderEvent {
    /// The event a transition into `status` announces, if any.
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::WaitingConfirmation => Some(OrderEvent::EvidenceSubmitted),
            OrderStatus::Confirmed => Some(OrderEvent::PaymentConfirmed),
            OrderStatus::Completed => Some(OrderEvent::Completed),
            OrderStatus::Cancelled => Some(OrderEvent::Cancelled),
            OrderStatus::Pending | OrderStatus::WaitingPayment | OrderStatus::WaitingCrypto => None,
        }
    }

    pub fn notifies_customer(self) -> bool {
        !matches!(self, OrderEvent::EvidenceSubmitted)
    }

    pub fn notifies_operators(self) -> bool {
        matches!(self, OrderEvent::EvidenceSubmitted | OrderEvent::PaymentConfirmed)
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderEvent::EvidenceSubmitted => "payment evidence submitted",
            OrderEvent::PaymentConfirmed => "payment confirmed",
            OrderEvent::Completed => "order completed",
            OrderEvent::Cancelled => "order cancelled",
        })
    }
}

/// Emitted once per applied transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub order_id: OrderId,
    pub customer: CustomerId,
    pub event: OrderEvent,
}
