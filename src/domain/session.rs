use super::order::{OrderId, PremiumPeriod};
use serde::{Deserialize, Serialize};

/// Which free-text input a customer owes next.
///
/// At most one per customer; starting a new flow discards the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    AwaitingRecipient(RecipientFor),
    AwaitingQuantity(QuantityFor),
    AwaitingEvidence { order_id: OrderId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientFor {
    Stars,
    Premium(PremiumPeriod),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityFor {
    /// Star count, for a recipient already collected.
    Stars { recipient: String },
    /// Base-currency amount to exchange.
    Exchange,
}

/// The menu entry a customer picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStart {
    Stars,
    Premium(PremiumPeriod),
    Exchange,
}

impl From<FlowStart> for Flow {
    fn from(start: FlowStart) -> Self {
        match start {
            FlowStart::Stars => Flow::AwaitingRecipient(RecipientFor::Stars),
            FlowStart::Premium(period) => Flow::AwaitingRecipient(RecipientFor::Premium(period)),
            FlowStart::Exchange => Flow::AwaitingQuantity(QuantityFor::Exchange),
        }
    }
}

impl Flow {
    pub fn expects(&self) -> &'static str {
        match self {
            Flow::AwaitingRecipient(_) => "recipient username",
            Flow::AwaitingQuantity(QuantityFor::Stars { .. }) => "star quantity",
            Flow::AwaitingQuantity(QuantityFor::Exchange) => "exchange amount",
            Flow::AwaitingEvidence { .. } => "payment screenshot",
        }
    }
}
