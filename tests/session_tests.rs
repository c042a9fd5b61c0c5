mod common;

use common::{CUSTOMER, OPERATOR, RecordingNotifier, engine};
use digistore::application::access::OperatorAccess;
use digistore::application::session::{SessionTracker, TextReply};
use digistore::domain::customer::CustomerId;
use digistore::domain::order::{MediaRef, OrderDetails, OrderId, OrderStatus, PremiumPeriod};
use digistore::domain::session::{Flow, FlowStart, QuantityFor};
use digistore::error::ShopError;
use digistore::infrastructure::in_memory::InMemorySessionStore;
use digistore::interfaces::commands::Action;
use digistore::interfaces::dispatcher::{Dispatcher, Reply};
use std::sync::Arc;

fn dispatcher(notifier: &RecordingNotifier) -> Dispatcher {
    let engine = Arc::new(engine(None, notifier));
    let sessions = SessionTracker::new(engine.clone(), Box::new(InMemorySessionStore::new()));
    Dispatcher::new(engine, sessions, OperatorAccess::new([OPERATOR]))
}

#[tokio::test]
async fn test_new_flow_discards_partial_fields() {
    let engine = Arc::new(engine(None, &RecordingNotifier::new()));
    let tracker = SessionTracker::new(engine, Box::new(InMemorySessionStore::new()));

    tracker.start(CUSTOMER, FlowStart::Stars).await.unwrap();
    tracker.handle_text(CUSTOMER, "@mallory").await.unwrap();
    assert!(matches!(
        tracker.current(CUSTOMER).await.unwrap(),
        Some(Flow::AwaitingQuantity(QuantityFor::Stars { .. }))
    ));

    tracker
        .start(CUSTOMER, FlowStart::Premium(PremiumPeriod::SixMonths))
        .await
        .unwrap();
    let TextReply::OrderCreated { order, .. } =
        tracker.handle_text(CUSTOMER, "trent").await.unwrap()
    else {
        panic!("expected an order");
    };

    assert_eq!(order.recipient, "trent");
    assert!(matches!(order.details, OrderDetails::Premium(_)));
    assert_eq!(order.amount.to_string(), "1498.81");
}

#[tokio::test]
async fn test_exchange_flow_replaces_stars_flow() {
    let engine = Arc::new(engine(None, &RecordingNotifier::new()));
    let tracker = SessionTracker::new(engine, Box::new(InMemorySessionStore::new()));

    tracker.start(CUSTOMER, FlowStart::Stars).await.unwrap();
    tracker.handle_text(CUSTOMER, "mallory").await.unwrap();
    tracker.start(CUSTOMER, FlowStart::Exchange).await.unwrap();

    let TextReply::OrderCreated { order, .. } =
        tracker.handle_text(CUSTOMER, "850").await.unwrap()
    else {
        panic!("expected an order");
    };
    assert_eq!(order.recipient, "");
    assert!(matches!(order.details, OrderDetails::Exchange(_)));
}

#[tokio::test]
async fn test_operator_actions_need_allow_list() {
    let notifier = RecordingNotifier::new();
    let d = dispatcher(&notifier);

    d.dispatch(CUSTOMER, Action::Begin(FlowStart::Stars)).await.unwrap();
    d.dispatch(CUSTOMER, Action::Text("bob".into())).await.unwrap();
    let Reply::Text(TextReply::OrderCreated { order, .. }) =
        d.dispatch(CUSTOMER, Action::Text("100".into())).await.unwrap()
    else {
        panic!("expected an order");
    };

    let intruder = CustomerId(13);
    for action in [
        Action::Cancel(order.id),
        Action::Confirm(order.id),
        Action::Statistics,
        Action::parse_text("/check_1").unwrap(),
    ] {
        assert!(matches!(
            d.dispatch(intruder, action).await,
            Err(ShopError::PermissionDenied(id)) if id == intruder
        ));
    }
    assert_eq!(
        d.engine().order(order.id).await.unwrap().status,
        OrderStatus::Pending
    );

    let reply = d.dispatch(OPERATOR, Action::Cancel(order.id)).await.unwrap();
    assert!(matches!(reply, Reply::Order(ref o) if o.status == OrderStatus::Cancelled));
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let d = dispatcher(&RecordingNotifier::new());
    assert!(matches!(
        d.dispatch(OPERATOR, Action::Inspect(OrderId(404))).await,
        Err(ShopError::NotFound(OrderId(404)))
    ));
    assert!(matches!(
        d.dispatch(CUSTOMER, Action::PayByCard(OrderId(404))).await,
        Err(ShopError::NotFound(OrderId(404)))
    ));
}

#[tokio::test]
async fn test_stray_photo_is_rejected() {
    let notifier = RecordingNotifier::new();
    let d = dispatcher(&notifier);

    d.dispatch(CUSTOMER, Action::Begin(FlowStart::Stars)).await.unwrap();
    d.dispatch(CUSTOMER, Action::Text("bob".into())).await.unwrap();
    let Reply::Text(TextReply::OrderCreated { order, .. }) =
        d.dispatch(CUSTOMER, Action::Text("100".into())).await.unwrap()
    else {
        panic!("expected an order");
    };
    d.dispatch(CUSTOMER, Action::PayByCard(order.id)).await.unwrap();

    // Card rail chosen but "I paid" not pressed: no evidence window yet.
    assert!(matches!(
        d.dispatch(CUSTOMER, Action::Photo(MediaRef("x".into()))).await,
        Err(ShopError::NoActiveFlow)
    ));

    d.dispatch(CUSTOMER, Action::CardPaid(order.id)).await.unwrap();
    d.dispatch(CUSTOMER, Action::CancelUpload(order.id)).await.unwrap();
    assert!(matches!(
        d.dispatch(CUSTOMER, Action::Photo(MediaRef("x".into()))).await,
        Err(ShopError::NoActiveFlow)
    ));
    assert!(notifier.sent().is_empty());
}
