use crate::application::engine::{OrderEngine, OrderRequest, normalize_recipient};
use crate::domain::customer::CustomerId;
use crate::domain::order::{MediaRef, Order, OrderAction, OrderId, OrderStatus, Rail};
use crate::domain::ports::SessionStoreBox;
use crate::domain::session::{Flow, FlowStart, QuantityFor, RecipientFor};
use crate::error::{Result, ShopError};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// What a piece of free text did to the customer's flow.
#[derive(Debug, Clone, PartialEq)]
pub enum TextReply {
    /// The recipient was accepted; the star quantity is next.
    AwaitingQuantity { recipient: String },
    /// The flow finished with a new order; the customer picks a rail next.
    OrderCreated { order: Order, rails: Vec<Rail> },
    /// Text arrived while a payment screenshot was expected.
    EvidenceExpected { order_id: OrderId },
}

/// Tracks which multi-step flow each customer is in and routes their free
/// input to the engine.
///
/// One flow per customer. Starting a flow replaces the previous one; a
/// finished flow is removed.
pub struct SessionTracker {
    engine: Arc<OrderEngine>,
    sessions: SessionStoreBox,
}

impl SessionTracker {
    pub fn new(engine: Arc<OrderEngine>, sessions: SessionStoreBox) -> Self {
        Self { engine, sessions }
    }

    pub async fn start(&self, customer: CustomerId, start: FlowStart) -> Result<Flow> {
        let flow = Flow::from(start);
        self.sessions.set(customer, flow.clone()).await?;
        debug!(%customer, expects = flow.expects(), "Flow started");
        Ok(flow)
    }

    /// The customer says they paid by card: their next photo is evidence for
    /// this order.
    pub async fn expect_evidence(&self, customer: CustomerId, order_id: OrderId) -> Result<Order> {
        let order = self.engine.order_for(customer, order_id).await?;
        if order.status != OrderStatus::WaitingPayment {
            return Err(ShopError::InvalidTransition {
                order: order.id,
                status: order.status,
                action: OrderAction::AttachEvidence,
            });
        }
        self.sessions
            .set(customer, Flow::AwaitingEvidence { order_id })
            .await?;
        Ok(order)
    }

    /// Abandons whatever flow the customer was in.
    pub async fn cancel(&self, customer: CustomerId) -> Result<Option<Flow>> {
        self.sessions.clear(customer).await
    }

    pub async fn current(&self, customer: CustomerId) -> Result<Option<Flow>> {
        self.sessions.get(customer).await
    }

    /// Routes free text by the customer's current flow.
    ///
    /// Unparsable input is a validation error and leaves the flow in place so
    /// the customer can retry. Each flow step is consumed at most once: of two
    /// concurrent answers to the same step, the later one gets `NoActiveFlow`.
    pub async fn handle_text(&self, customer: CustomerId, text: &str) -> Result<TextReply> {
        let flow = self
            .sessions
            .get(customer)
            .await?
            .ok_or(ShopError::NoActiveFlow)?;
        let prices = self.engine.prices();

        let (recipient, details) = match &flow {
            Flow::AwaitingRecipient(RecipientFor::Stars) => {
                let recipient = normalize_recipient(text)?;
                let next = Flow::AwaitingQuantity(QuantityFor::Stars {
                    recipient: recipient.clone(),
                });
                self.advance(customer, &flow, Some(next)).await?;
                return Ok(TextReply::AwaitingQuantity { recipient });
            }
            Flow::AwaitingRecipient(RecipientFor::Premium(period)) => {
                (normalize_recipient(text)?, prices.quote_premium(*period))
            }
            Flow::AwaitingQuantity(QuantityFor::Stars { recipient }) => {
                let stars = text.trim().parse::<u64>().map_err(|_| {
                    ShopError::ValidationError(format!("Star quantity must be a whole number: {text:?}"))
                })?;
                (recipient.clone(), prices.quote_stars(stars)?)
            }
            Flow::AwaitingQuantity(QuantityFor::Exchange) => {
                let amount = text.trim().replace(',', ".").parse::<Decimal>().map_err(|_| {
                    ShopError::ValidationError(format!("Exchange amount must be a number: {text:?}"))
                })?;
                (String::new(), prices.quote_exchange(amount)?)
            }
            Flow::AwaitingEvidence { order_id } => {
                return Ok(TextReply::EvidenceExpected {
                    order_id: *order_id,
                });
            }
        };

        self.advance(customer, &flow, None).await?;
        let created = self
            .engine
            .create_order(OrderRequest {
                owner: customer,
                recipient,
                details,
                rail: Rail::Card,
            })
            .await;
        let order = match created {
            Ok(order) => order,
            Err(e) => {
                // Hand the step back unless a new flow was started meanwhile.
                self.sessions.swap_if(customer, None, Some(flow)).await?;
                return Err(e);
            }
        };
        let rails = self.engine.offered_rails(order.kind());
        Ok(TextReply::OrderCreated { order, rails })
    }

    /// Attaches a photo to the order the customer is uploading evidence for.
    ///
    /// The evidence flow is removed afterwards only if it is still current, so
    /// a flow started while the upload was processed survives.
    pub async fn handle_evidence(&self, customer: CustomerId, media: MediaRef) -> Result<Order> {
        let Some(flow @ Flow::AwaitingEvidence { order_id }) = self.sessions.get(customer).await?
        else {
            return Err(ShopError::NoActiveFlow);
        };
        let order = self.engine.attach_evidence(customer, order_id, media).await?;
        self.sessions.swap_if(customer, Some(&flow), None).await?;
        Ok(order)
    }

    async fn advance(&self, customer: CustomerId, from: &Flow, next: Option<Flow>) -> Result<()> {
        if self.sessions.swap_if(customer, Some(from), next).await? {
            Ok(())
        } else {
            debug!(%customer, "Flow changed before the answer was applied");
            Err(ShopError::NoActiveFlow)
        }
    }
}
