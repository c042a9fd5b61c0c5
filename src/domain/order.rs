use super::customer::CustomerId;
use super::invoice::Invoice;
use super::money::Amount;
use crate::error::ShopError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Document key holding the customer's payment screenshot reference.
pub const EVIDENCE_KEY: &str = "payment_photo";
/// Document key holding the provider checkout link of a crypto invoice.
pub const PAY_URL_KEY: &str = "pay_url";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .trim_start_matches('#')
            .parse::<u64>()
            .map(OrderId)
            .map_err(|_| ShopError::ValidationError(format!("Invalid order number: {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Stars,
    Premium,
    Exchange,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderKind::Stars => "stars",
            OrderKind::Premium => "premium",
            OrderKind::Exchange => "exchange",
        })
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rail {
    /// Manual bank-card transfer, proven by a screenshot an operator reviews.
    Card,
    /// Invoice issued by the crypto provider and polled for settlement.
    Crypto,
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rail::Card => "card",
            Rail::Crypto => "crypto",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    WaitingPayment,
    WaitingConfirmation,
    WaitingCrypto,
    Confirmed,
    Completed,
    Cancelled,
}

/// Every operation that can move an order between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    BeginCardPayment,
    BeginCryptoPayment,
    AttachEvidence,
    InvoicePaid,
    InvoiceExpired,
    Confirm,
    Reject,
    Complete,
    Cancel,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderAction::BeginCardPayment => "begin card payment",
            OrderAction::BeginCryptoPayment => "begin crypto payment",
            OrderAction::AttachEvidence => "attach payment evidence",
            OrderAction::InvoicePaid => "settle invoice",
            OrderAction::InvoiceExpired => "expire invoice",
            OrderAction::Confirm => "confirm",
            OrderAction::Reject => "reject",
            OrderAction::Complete => "complete",
            OrderAction::Cancel => "cancel",
        })
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::WaitingPayment,
        OrderStatus::WaitingConfirmation,
        OrderStatus::WaitingCrypto,
        OrderStatus::Confirmed,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// The lifecycle table. `None` means `action` is not legal from `self`.
    pub fn apply(self, action: OrderAction) -> Option<OrderStatus> {
        use OrderAction as A;
        use OrderStatus as S;

        match (self, action) {
            (S::Pending | S::WaitingPayment, A::BeginCardPayment) => Some(S::WaitingPayment),
            (S::Pending, A::BeginCryptoPayment) => Some(S::WaitingCrypto),
            (S::WaitingPayment, A::AttachEvidence) => Some(S::WaitingConfirmation),
            (S::WaitingCrypto, A::InvoicePaid) => Some(S::Confirmed),
            (S::WaitingCrypto, A::InvoiceExpired) => Some(S::Cancelled),
            (S::WaitingConfirmation | S::WaitingCrypto, A::Confirm) => Some(S::Confirmed),
            (S::WaitingConfirmation, A::Reject) => Some(S::Cancelled),
            (S::Confirmed, A::Complete) => Some(S::Completed),
            (status, A::Cancel) if !status.is_terminal() => Some(S::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::WaitingPayment => "waiting_payment",
            OrderStatus::WaitingConfirmation => "waiting_confirmation",
            OrderStatus::WaitingCrypto => "waiting_crypto",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ShopError::ValidationError(format!("Unknown order status: {s:?}")))
    }
}

/// Subscription period keys of the premium price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PremiumPeriod {
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl PremiumPeriod {
    pub fn key(self) -> &'static str {
        match self {
            PremiumPeriod::ThreeMonths => "3m",
            PremiumPeriod::SixMonths => "6m",
            PremiumPeriod::OneYear => "1y",
        }
    }
}

impl fmt::Display for PremiumPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PremiumPeriod {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3m" => Ok(PremiumPeriod::ThreeMonths),
            "6m" => Ok(PremiumPeriod::SixMonths),
            "1y" => Ok(PremiumPeriod::OneYear),
            other => Err(ShopError::ValidationError(format!(
                "Unknown premium period: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarsDetails {
    pub stars: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumDetails {
    pub period: PremiumPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDetails {
    /// Base-currency amount the customer pays.
    pub amount_rub: Decimal,
    /// Target-currency amount the customer receives.
    pub amount_usd: Decimal,
}

/// Kind-specific order data.
///
/// Storage keeps this as an open JSON document; see [`Order::payload_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDetails {
    Stars(StarsDetails),
    Premium(PremiumDetails),
    Exchange(ExchangeDetails),
}

impl OrderDetails {
    pub fn kind(&self) -> OrderKind {
        match self {
            OrderDetails::Stars(_) => OrderKind::Stars,
            OrderDetails::Premium(_) => OrderKind::Premium,
            OrderDetails::Exchange(_) => OrderKind::Exchange,
        }
    }

    fn to_value(self) -> Result<Value, serde_json::Error> {
        match self {
            OrderDetails::Stars(details) => serde_json::to_value(details),
            OrderDetails::Premium(details) => serde_json::to_value(details),
            OrderDetails::Exchange(details) => serde_json::to_value(details),
        }
    }

    fn from_value(kind: OrderKind, document: &Value) -> Result<Self, serde_json::Error> {
        let document = document.clone();
        Ok(match kind {
            OrderKind::Stars => OrderDetails::Stars(serde_json::from_value(document)?),
            OrderKind::Premium => OrderDetails::Premium(serde_json::from_value(document)?),
            OrderKind::Exchange => OrderDetails::Exchange(serde_json::from_value(document)?),
        })
    }
}

/// Reference to media the customer submitted as proof of payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

/// Everything needed to persist a new order; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub owner: CustomerId,
    pub recipient: String,
    pub details: OrderDetails,
    pub amount: Amount,
    pub rail: Rail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub owner: CustomerId,
    pub recipient: String,
    pub details: OrderDetails,
    pub amount: Amount,
    pub rail: Rail,
    pub status: OrderStatus,
    pub invoice: Option<Invoice>,
    pub evidence: Option<MediaRef>,
    pub created_at: DateTime<Utc>,
}

/// The mutable part of an order, written together with a status change.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPatch {
    pub status: OrderStatus,
    pub rail: Option<Rail>,
    pub invoice: Option<Invoice>,
    pub evidence: Option<MediaRef>,
}

impl OrderPatch {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            rail: None,
            invoice: None,
            evidence: None,
        }
    }

    pub fn with_rail(mut self, rail: Rail) -> Self {
        self.rail = Some(rail);
        self
    }

    pub fn with_invoice(mut self, invoice: Invoice) -> Self {
        self.invoice = Some(invoice);
        self
    }

    pub fn with_evidence(mut self, evidence: MediaRef) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

impl Order {
    pub fn from_new(id: OrderId, new: NewOrder) -> Self {
        Self {
            id,
            owner: new.owner,
            recipient: new.recipient,
            details: new.details,
            amount: new.amount,
            rail: new.rail,
            status: OrderStatus::Pending,
            invoice: None,
            evidence: None,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> OrderKind {
        self.details.kind()
    }

    /// Compare-and-set: applies `patch` only while the order is still in
    /// `expected`. An invoice reference is write-once.
    ///
    /// On refusal returns the status that blocked the write.
    pub fn try_apply(&mut self, expected: OrderStatus, patch: OrderPatch) -> Result<(), OrderStatus> {
        if self.status != expected || (patch.invoice.is_some() && self.invoice.is_some()) {
            return Err(self.status);
        }
        self.status = patch.status;
        if let Some(rail) = patch.rail {
            self.rail = rail;
        }
        if let Some(invoice) = patch.invoice {
            self.invoice = Some(invoice);
        }
        if let Some(evidence) = patch.evidence {
            self.evidence = Some(evidence);
        }
        Ok(())
    }

    /// The open payload document as persisted: kind fields plus reserved slots.
    pub fn payload_document(&self) -> Result<Value, ShopError> {
        let mut document = match self.details.to_value() {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(ShopError::InternalError(
                    format!("order details serialized to non-object {other}").into(),
                ));
            }
            Err(e) => return Err(ShopError::InternalError(Box::new(e))),
        };
        if let Some(evidence) = &self.evidence {
            document.insert(EVIDENCE_KEY.to_string(), Value::String(evidence.0.clone()));
        }
        if let Some(invoice) = &self.invoice {
            document.insert(PAY_URL_KEY.to_string(), Value::String(invoice.pay_url.clone()));
        }
        Ok(Value::Object(document))
    }

    /// Inverse of [`Order::payload_document`] for a given kind.
    pub fn details_from_document(
        kind: OrderKind,
        document: &Value,
    ) -> Result<(OrderDetails, Option<MediaRef>, Option<String>), ShopError> {
        let details = OrderDetails::from_value(kind, document)
            .map_err(|e| ShopError::InternalError(Box::new(e)))?;
        let slot = |key: &str| {
            document
                .as_object()
                .and_then(|map: &Map<String, Value>| map.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Ok((details, slot(EVIDENCE_KEY).map(MediaRef), slot(PAY_URL_KEY)))
    }
}
