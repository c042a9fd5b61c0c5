use crate::application::access::Operator;
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::invoice::{Invoice, InvoiceRequest, InvoiceStatus};
use crate::domain::notification::{Notification, OrderEvent};
use crate::domain::order::{
    MediaRef, NewOrder, Order, OrderAction, OrderDetails, OrderId, OrderKind, OrderPatch,
    OrderStatus, Rail,
};
use crate::domain::ports::{
    CustomerStoreBox, InvoiceGatewayBox, NotifierBox, OrderFilter, OrderStoreBox, StatusUpdate,
};
use crate::domain::pricing::PriceList;
use crate::error::{Result, ShopError};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// What a customer asks for when committing a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub owner: CustomerId,
    pub recipient: String,
    pub details: OrderDetails,
    pub rail: Rail,
}

/// Result of starting the crypto rail: the invoice to pay and the billed
/// amount in the settlement asset.
#[derive(Debug, Clone, PartialEq)]
pub struct CryptoCheckout {
    pub order: Order,
    pub invoice: Invoice,
    pub settlement: Decimal,
}

/// Outcome of polling the invoice of a crypto order.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCheck {
    /// The invoice is paid; this poll moved the order to `confirmed`.
    Confirmed(Order),
    /// Not paid yet. Nothing changed.
    Pending(Order),
    /// The invoice expired; this poll cancelled the order.
    Expired(Order),
    /// The order was already confirmed or completed. Nothing changed.
    AlreadySettled(Order),
}

impl PaymentCheck {
    pub fn order(&self) -> &Order {
        match self {
            PaymentCheck::Confirmed(order)
            | PaymentCheck::Pending(order)
            | PaymentCheck::Expired(order)
            | PaymentCheck::AlreadySettled(order) => order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub customers: u64,
    pub completed_orders: u64,
    pub revenue: Decimal,
    pub pending_orders: u64,
}

/// Strips surrounding whitespace and one leading `@`.
pub fn normalize_recipient(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if name.is_empty() {
        return Err(ShopError::ValidationError(
            "Recipient username must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// The order lifecycle engine.
///
/// Owns the stores and the optional invoice gateway. Every status change goes
/// through a compare-and-set on the order store, so a failed or lost update
/// leaves the persisted order exactly as it was. Gateway calls happen before
/// the write and never under a store lock.
pub struct OrderEngine {
    customers: CustomerStoreBox,
    orders: OrderStoreBox,
    gateway: Option<InvoiceGatewayBox>,
    notifier: NotifierBox,
    prices: PriceList,
}

impl OrderEngine {
    /// Creates an engine without a crypto rail.
    pub fn new(
        customers: CustomerStoreBox,
        orders: OrderStoreBox,
        notifier: NotifierBox,
        prices: PriceList,
    ) -> Self {
        Self {
            customers,
            orders,
            gateway: None,
            notifier,
            prices,
        }
    }

    /// Enables the crypto rail.
    pub fn with_gateway(mut self, gateway: InvoiceGatewayBox) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn prices(&self) -> &PriceList {
        &self.prices
    }

    pub fn crypto_enabled(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn offered_rails(&self, kind: OrderKind) -> Vec<Rail> {
        self.prices.offered_rails(kind, self.crypto_enabled())
    }

    pub async fn register_customer(&self, id: CustomerId, display_name: &str) -> Result<Customer> {
        self.customers.upsert(id, display_name).await
    }

    /// Validates and prices the request, then persists a `pending` order.
    ///
    /// The amount is always derived from the details; callers cannot supply it.
    pub async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        let amount = self.prices.price(&request.details)?;
        let recipient = match request.details.kind() {
            OrderKind::Exchange => String::new(),
            OrderKind::Stars | OrderKind::Premium => normalize_recipient(&request.recipient)?,
        };
        if !self.offered_rails(request.details.kind()).contains(&request.rail) {
            return Err(ShopError::ValidationError(format!(
                "{} payment is not available for {} orders",
                request.rail,
                request.details.kind()
            )));
        }

        let order = self
            .orders
            .insert(NewOrder {
                owner: request.owner,
                recipient,
                details: request.details,
                amount,
                rail: request.rail,
            })
            .await?;
        info!(
            order_id = %order.id,
            owner = %order.owner,
            kind = %order.kind(),
            amount = %order.amount,
            "Order created"
        );
        Ok(order)
    }

    pub async fn order(&self, id: OrderId) -> Result<Order> {
        self.orders.get(id).await?.ok_or(ShopError::NotFound(id))
    }

    /// Looks up an order on behalf of a customer. Orders owned by someone
    /// else are reported as missing.
    pub async fn order_for(&self, customer: CustomerId, id: OrderId) -> Result<Order> {
        match self.orders.get(id).await? {
            Some(order) if order.owner == customer => Ok(order),
            _ => Err(ShopError::NotFound(id)),
        }
    }

    /// Moves the order to `waiting_payment` on the card rail. Repeating it is
    /// a no-op.
    pub async fn begin_card_payment(&self, customer: CustomerId, id: OrderId) -> Result<Order> {
        let order = self.order_for(customer, id).await?;
        if order.status == OrderStatus::WaitingPayment {
            return Ok(order);
        }
        let next = next_status(&order, OrderAction::BeginCardPayment)?;
        self.commit(
            &order,
            OrderAction::BeginCardPayment,
            OrderPatch::to(next).with_rail(Rail::Card),
        )
        .await
    }

    /// Creates an invoice and moves the order to `waiting_crypto`.
    ///
    /// An order already waiting on an invoice gets that invoice back; a second
    /// one is never created. On gateway failure nothing is written.
    pub async fn begin_crypto_payment(
        &self,
        customer: CustomerId,
        id: OrderId,
    ) -> Result<CryptoCheckout> {
        let order = self.order_for(customer, id).await?;
        let settlement = self.prices.settlement_amount(order.amount);
        if order.status == OrderStatus::WaitingCrypto
            && let Some(invoice) = order.invoice.clone()
        {
            return Ok(CryptoCheckout {
                order,
                invoice,
                settlement,
            });
        }

        let next = next_status(&order, OrderAction::BeginCryptoPayment)?;
        let gateway = self.gateway.as_ref().ok_or(ShopError::GatewayUnavailable)?;
        if !self.offered_rails(order.kind()).contains(&Rail::Crypto) {
            return Err(ShopError::ValidationError(format!(
                "crypto payment is not available for {} orders",
                order.kind()
            )));
        }

        let request = InvoiceRequest {
            order_id: order.id,
            amount: settlement,
            description: format!("Order #{} | {}", order.id, order.kind()),
        };
        let invoice = gateway.create_invoice(&request).await.map_err(|e| {
            warn!(order_id = %order.id, error = %e, "Invoice creation failed");
            e
        })?;
        info!(order_id = %order.id, invoice_id = %invoice.id, %settlement, "Invoice created");

        let committed = self
            .commit(
                &order,
                OrderAction::BeginCryptoPayment,
                OrderPatch::to(next)
                    .with_rail(Rail::Crypto)
                    .with_invoice(invoice.clone()),
            )
            .await;
        let order = match committed {
            Ok(order) => order,
            Err(ShopError::InvalidTransition {
                status: OrderStatus::WaitingCrypto,
                ..
            }) => {
                // A concurrent checkout stored its invoice first; ours is never shown.
                let current = self.order(id).await?;
                let Some(stored) = current.invoice.clone() else {
                    return Err(invalid(&current, OrderAction::BeginCryptoPayment));
                };
                warn!(order_id = %id, unused_invoice = %invoice.id, invoice_id = %stored.id, "Reusing invoice of concurrent checkout");
                return Ok(CryptoCheckout {
                    order: current,
                    invoice: stored,
                    settlement,
                });
            }
            Err(e) => return Err(e),
        };
        Ok(CryptoCheckout {
            order,
            invoice,
            settlement,
        })
    }

    /// Stores the payment screenshot and hands the order to operator review.
    pub async fn attach_evidence(
        &self,
        customer: CustomerId,
        id: OrderId,
        media: MediaRef,
    ) -> Result<Order> {
        let order = self.order_for(customer, id).await?;
        let next = next_status(&order, OrderAction::AttachEvidence)?;
        self.commit(
            &order,
            OrderAction::AttachEvidence,
            OrderPatch::to(next).with_evidence(media),
        )
        .await
    }

    /// Polls the invoice of a customer's crypto order.
    ///
    /// Safe to repeat: a settled order is reported as such without any write
    /// or notification, and gateway failures change nothing.
    pub async fn check_crypto_payment(
        &self,
        customer: CustomerId,
        id: OrderId,
    ) -> Result<PaymentCheck> {
        let order = self.order_for(customer, id).await?;
        if matches!(order.status, OrderStatus::Confirmed | OrderStatus::Completed) {
            return Ok(PaymentCheck::AlreadySettled(order));
        }
        if order.status != OrderStatus::WaitingCrypto {
            return Err(invalid(&order, OrderAction::InvoicePaid));
        }

        let status = self.fetch_invoice_status(&order).await?;
        let (action, target) = match status {
            InvoiceStatus::Active => return Ok(PaymentCheck::Pending(order)),
            InvoiceStatus::Paid => (OrderAction::InvoicePaid, OrderStatus::Confirmed),
            InvoiceStatus::Expired => (OrderAction::InvoiceExpired, OrderStatus::Cancelled),
        };

        match self
            .orders
            .update(order.id, order.status, OrderPatch::to(target))
            .await?
        {
            StatusUpdate::Applied(updated) => {
                self.announce(&order, &updated).await;
                Ok(match status {
                    InvoiceStatus::Expired => PaymentCheck::Expired(updated),
                    _ => PaymentCheck::Confirmed(updated),
                })
            }
            StatusUpdate::Missing => Err(ShopError::NotFound(order.id)),
            StatusUpdate::Conflict(OrderStatus::Confirmed | OrderStatus::Completed) => {
                Ok(PaymentCheck::AlreadySettled(self.order(order.id).await?))
            }
            StatusUpdate::Conflict(actual) => Err(ShopError::InvalidTransition {
                order: order.id,
                status: actual,
                action,
            }),
        }
    }

    /// Confirms payment. On the crypto rail the invoice is re-checked first
    /// and must be paid.
    pub async fn confirm(&self, operator: &Operator, id: OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        let next = next_status(&order, OrderAction::Confirm)?;
        if order.status == OrderStatus::WaitingCrypto {
            let status = self.fetch_invoice_status(&order).await?;
            if status != InvoiceStatus::Paid {
                warn!(
                    order_id = %order.id,
                    operator = %operator.id(),
                    invoice_status = %status,
                    "Confirmation refused, invoice not paid"
                );
                return Err(ShopError::PaymentNotVerified {
                    order: order.id,
                    status,
                });
            }
        }
        info!(order_id = %order.id, operator = %operator.id(), "Operator confirm");
        self.commit(&order, OrderAction::Confirm, OrderPatch::to(next))
            .await
    }

    pub async fn reject(&self, operator: &Operator, id: OrderId) -> Result<Order> {
        self.operator_transition(operator, id, OrderAction::Reject)
            .await
    }

    /// Marks a confirmed order as delivered.
    pub async fn complete(&self, operator: &Operator, id: OrderId) -> Result<Order> {
        self.operator_transition(operator, id, OrderAction::Complete)
            .await
    }

    pub async fn cancel(&self, operator: &Operator, id: OrderId) -> Result<Order> {
        self.operator_transition(operator, id, OrderAction::Cancel)
            .await
    }

    pub async fn inspect(&self, _operator: &Operator, id: OrderId) -> Result<Order> {
        self.order(id).await
    }

    /// Live provider status of a crypto order's invoice. Read-only.
    pub async fn invoice_status(
        &self,
        _operator: &Operator,
        id: OrderId,
    ) -> Result<(Order, InvoiceStatus)> {
        let order = self.order(id).await?;
        let status = self.fetch_invoice_status(&order).await?;
        Ok((order, status))
    }

    pub async fn list(&self, _operator: &Operator, filter: OrderFilter) -> Result<Vec<Order>> {
        self.orders.list(filter).await
    }

    pub async fn statistics(&self, _operator: &Operator) -> Result<Statistics> {
        let totals = self.orders.totals().await?;
        Ok(Statistics {
            customers: self.customers.count().await?,
            completed_orders: totals.completed_orders,
            revenue: totals.completed_revenue,
            pending_orders: totals.pending_orders,
        })
    }

    /// Every order, oldest first.
    pub async fn export(&self) -> Result<Vec<Order>> {
        let mut orders = self.orders.list(OrderFilter::All).await?;
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    async fn operator_transition(
        &self,
        operator: &Operator,
        id: OrderId,
        action: OrderAction,
    ) -> Result<Order> {
        let order = self.order(id).await?;
        let next = next_status(&order, action)?;
        info!(order_id = %order.id, operator = %operator.id(), %action, "Operator action");
        self.commit(&order, action, OrderPatch::to(next)).await
    }

    async fn fetch_invoice_status(&self, order: &Order) -> Result<InvoiceStatus> {
        let gateway = self.gateway.as_ref().ok_or(ShopError::GatewayUnavailable)?;
        let invoice = order.invoice.as_ref().ok_or_else(|| {
            ShopError::ValidationError(format!("Order #{} has no crypto invoice", order.id))
        })?;
        gateway.invoice_status(&invoice.id).await.map_err(|e| {
            warn!(order_id = %order.id, invoice_id = %invoice.id, error = %e, "Invoice status check failed");
            ShopError::from(e)
        })
    }

    /// Writes `patch` if the order is still in the status it was read in.
    async fn commit(&self, order: &Order, action: OrderAction, patch: OrderPatch) -> Result<Order> {
        match self.orders.update(order.id, order.status, patch).await? {
            StatusUpdate::Applied(updated) => {
                self.announce(order, &updated).await;
                Ok(updated)
            }
            StatusUpdate::Missing => Err(ShopError::NotFound(order.id)),
            StatusUpdate::Conflict(actual) => Err(ShopError::InvalidTransition {
                order: order.id,
                status: actual,
                action,
            }),
        }
    }

    async fn announce(&self, before: &Order, after: &Order) {
        info!(order_id = %after.id, from = %before.status, to = %after.status, "Order status changed");
        if let Some(event) = OrderEvent::for_status(after.status) {
            self.notifier
                .notify(Notification {
                    order_id: after.id,
                    customer: after.owner,
                    event,
                })
                .await;
        }
    }
}

fn next_status(order: &Order, action: OrderAction) -> Result<OrderStatus> {
    order
        .status
        .apply(action)
        .ok_or_else(|| invalid(order, action))
}

fn invalid(order: &Order, action: OrderAction) -> ShopError {
    ShopError::InvalidTransition {
        order: order.id,
        status: order.status,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::access::OperatorAccess;
    use crate::domain::invoice::InvoiceId;
    use crate::domain::order::{ExchangeDetails, StarsDetails};
    use crate::domain::ports::InvoiceGateway;
    use crate::error::GatewayError;
    use crate::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryOrderStore};
    use crate::infrastructure::notifier::LogNotifier;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};

    const OPERATOR: CustomerId = CustomerId(1000);

    fn engine() -> OrderEngine {
        OrderEngine::new(
            Box::new(InMemoryCustomerStore::new()),
            Box::new(InMemoryOrderStore::new()),
            Box::new(LogNotifier::default()),
            PriceList::default(),
        )
    }

    fn operator() -> Operator {
        OperatorAccess::new([OPERATOR]).authorize(OPERATOR).unwrap()
    }

    fn stars(owner: i64, stars: u64) -> OrderRequest {
        OrderRequest {
            owner: CustomerId(owner),
            recipient: " @alice ".to_string(),
            details: OrderDetails::Stars(StarsDetails { stars }),
            rail: Rail::Card,
        }
    }

    #[test]
    fn test_normalize_recipient() {
        assert_eq!(normalize_recipient("  @durov ").unwrap(), "durov");
        assert_eq!(normalize_recipient("durov").unwrap(), "durov");
        assert!(normalize_recipient(" @ ").is_err());
        assert!(normalize_recipient("").is_err());
    }

    #[tokio::test]
    async fn test_create_order_derives_amount() {
        let engine = engine();
        let order = engine.create_order(stars(1, 100)).await.unwrap();

        assert_eq!(order.amount.value(), dec!(150.00));
        assert_eq!(order.recipient, "alice");
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_order_rejects_forged_exchange() {
        let engine = engine();
        let forged = OrderRequest {
            owner: CustomerId(1),
            recipient: String::new(),
            details: OrderDetails::Exchange(ExchangeDetails {
                amount_rub: dec!(850),
                amount_usd: dec!(100.00),
            }),
            rail: Rail::Card,
        };
        assert!(matches!(
            engine.create_order(forged).await,
            Err(ShopError::ValidationError(_))
        ));
        assert!(engine.export().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crypto_rail_requires_gateway() {
        let engine = engine();
        let mut request = stars(1, 100);
        request.rail = Rail::Crypto;
        assert!(engine.create_order(request).await.is_err());

        let order = engine.create_order(stars(1, 100)).await.unwrap();
        assert!(matches!(
            engine.begin_crypto_payment(CustomerId(1), order.id).await,
            Err(ShopError::GatewayUnavailable)
        ));
        assert_eq!(engine.order(order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_card_payment_is_idempotent() {
        let engine = engine();
        let order = engine.create_order(stars(1, 100)).await.unwrap();

        let first = engine.begin_card_payment(CustomerId(1), order.id).await.unwrap();
        let second = engine.begin_card_payment(CustomerId(1), order.id).await.unwrap();
        assert_eq!(first.status, OrderStatus::WaitingPayment);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_foreign_order_is_not_found() {
        let engine = engine();
        let order = engine.create_order(stars(1, 100)).await.unwrap();

        assert!(matches!(
            engine.begin_card_payment(CustomerId(2), order.id).await,
            Err(ShopError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_evidence_outside_window_is_rejected() {
        let engine = engine();
        let order = engine.create_order(stars(1, 100)).await.unwrap();

        let result = engine
            .attach_evidence(CustomerId(1), order.id, MediaRef("p".to_string()))
            .await;
        assert!(matches!(
            result,
            Err(ShopError::InvalidTransition {
                status: OrderStatus::Pending,
                action: OrderAction::AttachEvidence,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_card_lifecycle_and_statistics() {
        let engine = engine();
        let op = operator();
        engine.register_customer(CustomerId(1), "Alice").await.unwrap();
        let order = engine.create_order(stars(1, 100)).await.unwrap();
        engine.create_order(stars(1, 60)).await.unwrap();

        engine.begin_card_payment(CustomerId(1), order.id).await.unwrap();
        engine
            .attach_evidence(CustomerId(1), order.id, MediaRef("photo".to_string()))
            .await
            .unwrap();
        engine.confirm(&op, order.id).await.unwrap();
        let done = engine.complete(&op, order.id).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);

        let stats = engine.statistics(&op).await.unwrap();
        assert_eq!(
            stats,
            Statistics {
                customers: 1,
                completed_orders: 1,
                revenue: dec!(150.00),
                pending_orders: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let engine = engine();
        let op = operator();
        let order = engine.create_order(stars(1, 100)).await.unwrap();

        engine.cancel(&op, order.id).await.unwrap();
        assert!(matches!(
            engine.cancel(&op, order.id).await,
            Err(ShopError::InvalidTransition {
                status: OrderStatus::Cancelled,
                ..
            })
        ));
        assert!(engine.begin_card_payment(CustomerId(1), order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_operator_views() {
        let engine = engine();
        let op = operator();
        let first = engine.create_order(stars(1, 100)).await.unwrap();
        let second = engine.create_order(stars(2, 200)).await.unwrap();
        engine.cancel(&op, first.id).await.unwrap();

        let active = engine.list(&op, OrderFilter::Active).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert_eq!(engine.inspect(&op, second.id).await.unwrap(), second);

        assert!(matches!(
            engine.invoice_status(&op, second.id).await,
            Err(ShopError::GatewayUnavailable)
        ));
    }

    /// Hands out a fresh invoice per call and suspends before answering.
    #[derive(Default)]
    struct SlowGateway {
        created: AtomicU64,
    }

    #[async_trait]
    impl InvoiceGateway for SlowGateway {
        async fn create_invoice(
            &self,
            _request: &InvoiceRequest,
        ) -> Result<Invoice, GatewayError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::task::yield_now().await;
            Ok(Invoice {
                id: InvoiceId(format!("inv-{n}")),
                pay_url: format!("https://pay.example/inv-{n}"),
            })
        }

        async fn invoice_status(
            &self,
            _id: &InvoiceId,
        ) -> Result<InvoiceStatus, GatewayError> {
            Ok(InvoiceStatus::Active)
        }
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_share_one_invoice() {
        let engine = engine().with_gateway(Box::new(SlowGateway::default()));
        let order = engine.create_order(stars(1, 100)).await.unwrap();

        let (first, second) = tokio::join!(
            engine.begin_crypto_payment(CustomerId(1), order.id),
            engine.begin_crypto_payment(CustomerId(1), order.id)
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.invoice, second.invoice);
        let stored = engine.order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::WaitingCrypto);
        assert_eq!(stored.invoice, Some(first.invoice));
    }
}
