#![allow(dead_code)]

use async_trait::async_trait;
use digistore::application::access::{Operator, OperatorAccess};
use digistore::application::engine::{OrderEngine, OrderRequest};
use digistore::domain::customer::CustomerId;
use digistore::domain::invoice::{Invoice, InvoiceId, InvoiceRequest, InvoiceStatus};
use digistore::domain::notification::Notification;
use digistore::domain::order::{OrderDetails, Rail, StarsDetails};
use digistore::domain::ports::{InvoiceGateway, Notifier, SessionStore};
use digistore::domain::pricing::PriceList;
use digistore::domain::session::Flow;
use digistore::error::{GatewayError, Result as ShopResult};
use digistore::infrastructure::in_memory::{
    InMemoryCustomerStore, InMemoryOrderStore, InMemorySessionStore,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const CUSTOMER: CustomerId = CustomerId(1);
pub const OPERATOR: CustomerId = CustomerId(900);

#[derive(Default)]
struct Script {
    statuses: VecDeque<Result<InvoiceStatus, GatewayError>>,
    fallback: Option<InvoiceStatus>,
    create_failure: Option<GatewayError>,
    created: Vec<InvoiceRequest>,
    status_calls: usize,
}

/// Invoice gateway that replays scripted answers.
///
/// Status polls pop the queue first, then repeat the fallback status
/// (`active` unless set).
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_status(&self, status: InvoiceStatus) -> &Self {
        self.script.lock().unwrap().statuses.push_back(Ok(status));
        self
    }

    pub fn then_error(&self, error: GatewayError) -> &Self {
        self.script.lock().unwrap().statuses.push_back(Err(error));
        self
    }

    pub fn always(&self, status: InvoiceStatus) -> &Self {
        self.script.lock().unwrap().fallback = Some(status);
        self
    }

    pub fn fail_next_create(&self, error: GatewayError) {
        self.script.lock().unwrap().create_failure = Some(error);
    }

    pub fn created(&self) -> Vec<InvoiceRequest> {
        self.script.lock().unwrap().created.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.script.lock().unwrap().status_calls
    }
}

#[async_trait]
impl InvoiceGateway for ScriptedGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError> {
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.create_failure.take() {
            return Err(error);
        }
        script.created.push(request.clone());
        let n = script.created.len();
        Ok(Invoice {
            id: InvoiceId(format!("inv-{n}")),
            pay_url: format!("https://pay.example/inv-{n}"),
        })
    }

    async fn invoice_status(&self, _id: &InvoiceId) -> Result<InvoiceStatus, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.status_calls += 1;
        match script.statuses.pop_front() {
            Some(answer) => answer,
            None => Ok(script.fallback.unwrap_or(InvoiceStatus::Active)),
        }
    }
}

/// Session store that suspends after every read, the way a networked
/// key-value store would, so concurrent handlers see the same snapshot.
#[derive(Clone, Default)]
pub struct YieldingSessionStore {
    inner: InMemorySessionStore,
}

#[async_trait]
impl SessionStore for YieldingSessionStore {
    async fn get(&self, customer: CustomerId) -> ShopResult<Option<Flow>> {
        let flow = self.inner.get(customer).await?;
        tokio::task::yield_now().await;
        Ok(flow)
    }

    async fn set(&self, customer: CustomerId, flow: Flow) -> ShopResult<()> {
        self.inner.set(customer, flow).await
    }

    async fn clear(&self, customer: CustomerId) -> ShopResult<Option<Flow>> {
        self.inner.clear(customer).await
    }

    async fn swap_if(
        &self,
        customer: CustomerId,
        expected: Option<&Flow>,
        next: Option<Flow>,
    ) -> ShopResult<bool> {
        self.inner.swap_if(customer, expected, next).await
    }
}

/// Notifier that keeps every notification for later assertions.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub fn engine(gateway: Option<&ScriptedGateway>, notifier: &RecordingNotifier) -> OrderEngine {
    let engine = OrderEngine::new(
        Box::new(InMemoryCustomerStore::new()),
        Box::new(InMemoryOrderStore::new()),
        Box::new(notifier.clone()),
        PriceList::default(),
    );
    match gateway {
        Some(gateway) => engine.with_gateway(Box::new(gateway.clone())),
        None => engine,
    }
}

pub fn operator() -> Operator {
    OperatorAccess::new([OPERATOR]).authorize(OPERATOR).unwrap()
}

pub fn stars_request(stars: u64) -> OrderRequest {
    OrderRequest {
        owner: CUSTOMER,
        recipient: "@alice".to_string(),
        details: OrderDetails::Stars(StarsDetails { stars }),
        rail: Rail::Card,
    }
}
