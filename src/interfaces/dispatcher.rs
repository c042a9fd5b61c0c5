use crate::application::access::{Operator, OperatorAccess};
use crate::application::engine::{CryptoCheckout, OrderEngine, PaymentCheck, Statistics};
use crate::application::session::{SessionTracker, TextReply};
use crate::domain::customer::CustomerId;
use crate::domain::invoice::InvoiceStatus;
use crate::domain::order::{Order, OrderId};
use crate::domain::session::Flow;
use crate::error::{Result, ShopError};
use crate::interfaces::commands::Action;
use std::fmt;
use std::sync::Arc;

/// What the transport should render back to the actor.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Welcome,
    Menu,
    FlowStarted(Flow),
    Text(TextReply),
    CardInstructions(Order),
    Checkout(CryptoCheckout),
    AwaitingEvidence(Order),
    EvidenceReceived(Order),
    Payment(PaymentCheck),
    UploadCancelled(OrderId),
    Order(Order),
    Invoice { order: Order, status: InvoiceStatus },
    Orders(Vec<Order>),
    Statistics(Statistics),
}

struct Summary<'a>(&'a Order);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.0;
        write!(
            f,
            "#{} {} {} ({}, {})",
            order.id,
            order.kind(),
            order.amount,
            order.rail,
            order.status
        )
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Welcome => f.write_str("welcome"),
            Reply::Menu => f.write_str("main menu"),
            Reply::FlowStarted(flow) => write!(f, "send {}", flow.expects()),
            Reply::Text(TextReply::AwaitingQuantity { recipient }) => {
                write!(f, "recipient {recipient}, send star quantity")
            }
            Reply::Text(TextReply::OrderCreated { order, rails }) => {
                let rails: Vec<String> = rails.iter().map(ToString::to_string).collect();
                write!(f, "created {}, pay by {}", Summary(order), rails.join(" or "))
            }
            Reply::Text(TextReply::EvidenceExpected { order_id }) => {
                write!(f, "send payment screenshot for #{order_id}")
            }
            Reply::CardInstructions(order) => {
                write!(f, "transfer {} by card for #{}", order.amount, order.id)
            }
            Reply::Checkout(checkout) => write!(
                f,
                "pay {} USDT for #{} at {}",
                checkout.settlement, checkout.order.id, checkout.invoice.pay_url
            ),
            Reply::AwaitingEvidence(order) => write!(f, "send payment screenshot for #{}", order.id),
            Reply::EvidenceReceived(order) => write!(f, "screenshot received, {}", Summary(order)),
            Reply::Payment(PaymentCheck::Confirmed(order)) => {
                write!(f, "payment received, {}", Summary(order))
            }
            Reply::Payment(PaymentCheck::Pending(order)) => {
                write!(f, "payment not received yet, {}", Summary(order))
            }
            Reply::Payment(PaymentCheck::Expired(order)) => {
                write!(f, "invoice expired, {}", Summary(order))
            }
            Reply::Payment(PaymentCheck::AlreadySettled(order)) => {
                write!(f, "already paid, {}", Summary(order))
            }
            Reply::UploadCancelled(order_id) => write!(f, "upload for #{order_id} cancelled"),
            Reply::Order(order) => write!(f, "{}", Summary(order)),
            Reply::Invoice { order, status } => {
                write!(f, "invoice of #{} is {status}", order.id)
            }
            Reply::Orders(orders) => {
                write!(f, "{} orders", orders.len())?;
                for order in orders {
                    write!(f, "; {}", Summary(order))?;
                }
                Ok(())
            }
            Reply::Statistics(stats) => write!(
                f,
                "customers {}, completed {}, revenue {}, pending {}",
                stats.customers, stats.completed_orders, stats.revenue, stats.pending_orders
            ),
        }
    }
}

/// Routes parsed chat actions to the engine and the session tracker.
///
/// Operator actions are checked against the allow-list before anything is
/// read or written.
pub struct Dispatcher {
    engine: Arc<OrderEngine>,
    sessions: SessionTracker,
    access: OperatorAccess,
}

impl Dispatcher {
    pub fn new(engine: Arc<OrderEngine>, sessions: SessionTracker, access: OperatorAccess) -> Self {
        Self {
            engine,
            sessions,
            access,
        }
    }

    pub fn engine(&self) -> &OrderEngine {
        &self.engine
    }

    pub async fn dispatch(&self, actor: CustomerId, action: Action) -> Result<Reply> {
        if action.requires_operator() {
            let operator = self.access.authorize(actor)?;
            self.operator_action(&operator, action).await
        } else {
            self.customer_action(actor, action).await
        }
    }

    async fn operator_action(&self, operator: &Operator, action: Action) -> Result<Reply> {
        let engine = &self.engine;
        Ok(match action {
            Action::Inspect(id) => Reply::Order(engine.inspect(operator, id).await?),
            Action::Confirm(id) => Reply::Order(engine.confirm(operator, id).await?),
            Action::Reject(id) => Reply::Order(engine.reject(operator, id).await?),
            Action::Complete(id) => Reply::Order(engine.complete(operator, id).await?),
            Action::Cancel(id) => Reply::Order(engine.cancel(operator, id).await?),
            Action::InvoiceStatus(id) => {
                let (order, status) = engine.invoice_status(operator, id).await?;
                Reply::Invoice { order, status }
            }
            Action::List(filter) => Reply::Orders(engine.list(operator, filter).await?),
            Action::Statistics => Reply::Statistics(engine.statistics(operator).await?),
            other => return self.customer_action(operator.id(), other).await,
        })
    }

    async fn customer_action(&self, actor: CustomerId, action: Action) -> Result<Reply> {
        let engine = &self.engine;
        Ok(match action {
            Action::Start { display_name } => {
                let name = if display_name.trim().is_empty() {
                    actor.to_string()
                } else {
                    display_name.trim().to_string()
                };
                engine.register_customer(actor, &name).await?;
                self.sessions.cancel(actor).await?;
                Reply::Welcome
            }
            Action::MainMenu => {
                self.sessions.cancel(actor).await?;
                Reply::Menu
            }
            Action::Begin(start) => Reply::FlowStarted(self.sessions.start(actor, start).await?),
            Action::Text(text) => Reply::Text(self.sessions.handle_text(actor, &text).await?),
            Action::Photo(media) => {
                Reply::EvidenceReceived(self.sessions.handle_evidence(actor, media).await?)
            }
            Action::PayByCard(id) => {
                Reply::CardInstructions(engine.begin_card_payment(actor, id).await?)
            }
            Action::PayByCrypto(id) => Reply::Checkout(engine.begin_crypto_payment(actor, id).await?),
            Action::CardPaid(id) => {
                Reply::AwaitingEvidence(self.sessions.expect_evidence(actor, id).await?)
            }
            Action::CheckCrypto(id) => Reply::Payment(engine.check_crypto_payment(actor, id).await?),
            Action::CancelUpload(id) => {
                self.sessions.cancel(actor).await?;
                Reply::UploadCancelled(id)
            }
            Action::Inspect(_)
            | Action::Confirm(_)
            | Action::Reject(_)
            | Action::Complete(_)
            | Action::Cancel(_)
            | Action::InvoiceStatus(_)
            | Action::List(_)
            | Action::Statistics => return Err(ShopError::PermissionDenied(actor)),
        })
    }
}
