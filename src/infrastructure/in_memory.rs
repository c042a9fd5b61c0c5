use crate::domain::customer::{Customer, CustomerId};
use crate::domain::order::{NewOrder, Order, OrderId, OrderPatch, OrderStatus};
use crate::domain::ports::{
    CustomerStore, OrderFilter, OrderStore, OrderTotals, SessionStore, StatusUpdate,
};
use crate::domain::session::Flow;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for customers.
///
/// Uses `Arc<RwLock<HashMap<CustomerId, Customer>>>` to allow shared concurrent access.
#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn upsert(&self, id: CustomerId, display_name: &str) -> Result<Customer> {
        let mut customers = self.customers.write().await;
        let customer = customers
            .entry(id)
            .and_modify(|c| c.display_name = display_name.to_string())
            .or_insert_with(|| Customer::new(id, display_name));
        Ok(customer.clone())
    }

    async fn count(&self) -> Result<u64> {
        let customers = self.customers.read().await;
        Ok(customers.len() as u64)
    }
}

#[derive(Default)]
struct OrderTable {
    last_id: u64,
    orders: BTreeMap<OrderId, Order>,
}

/// A thread-safe in-memory order table.
///
/// Every guarded update runs under the write lock, which makes the
/// compare-and-set on status atomic.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let id = OrderId(table.last_id);
        let order = Order::from_new(id, order);
        table.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.orders.get(&id).cloned())
    }

    async fn update(
        &self,
        id: OrderId,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> Result<StatusUpdate> {
        let mut table = self.table.write().await;
        let Some(order) = table.orders.get_mut(&id) else {
            return Ok(StatusUpdate::Missing);
        };
        Ok(match order.try_apply(expected, patch) {
            Ok(()) => StatusUpdate::Applied(order.clone()),
            Err(actual) => StatusUpdate::Conflict(actual),
        })
    }

    async fn list(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        // Ids grow with creation time, so reverse id order is newest first.
        Ok(table
            .orders
            .values()
            .rev()
            .filter(|order| filter.matches(order.status))
            .cloned()
            .collect())
    }

    async fn totals(&self) -> Result<OrderTotals> {
        let table = self.table.read().await;
        let mut totals = OrderTotals::default();
        for order in table.orders.values() {
            totals.record(order)?;
        }
        Ok(totals)
    }
}

/// Process-local session map. Entries vanish on restart.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    flows: Arc<RwLock<HashMap<CustomerId, Flow>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, customer: CustomerId) -> Result<Option<Flow>> {
        let flows = self.flows.read().await;
        Ok(flows.get(&customer).cloned())
    }

    async fn set(&self, customer: CustomerId, flow: Flow) -> Result<()> {
        let mut flows = self.flows.write().await;
        flows.insert(customer, flow);
        Ok(())
    }

    async fn clear(&self, customer: CustomerId) -> Result<Option<Flow>> {
        let mut flows = self.flows.write().await;
        Ok(flows.remove(&customer))
    }

    async fn swap_if(
        &self,
        customer: CustomerId,
        expected: Option<&Flow>,
        next: Option<Flow>,
    ) -> Result<bool> {
        let mut flows = self.flows.write().await;
        if flows.get(&customer) != expected {
            return Ok(false);
        }
        match next {
            Some(flow) => flows.insert(customer, flow),
            None => flows.remove(&customer),
        };
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::order::{OrderDetails, Rail, StarsDetails};
    use crate::domain::session::RecipientFor;
    use rust_decimal_macros::dec;

    fn new_order(owner: i64, stars: u64) -> NewOrder {
        NewOrder {
            owner: CustomerId(owner),
            recipient: "alice".to_string(),
            details: OrderDetails::Stars(StarsDetails { stars }),
            amount: Amount::new(dec!(1.5) * rust_decimal::Decimal::from(stars)).unwrap(),
            rail: Rail::Card,
        }
    }

    #[tokio::test]
    async fn test_in_memory_customer_store() {
        let store = InMemoryCustomerStore::new();
        let first = store.upsert(CustomerId(1), "Alice").await.unwrap();
        let renamed = store.upsert(CustomerId(1), "Alice B").await.unwrap();

        assert_eq!(renamed.display_name, "Alice B");
        assert_eq!(renamed.first_seen, first.first_seen);
        assert_eq!(store.count().await.unwrap(), 1);
        store.upsert(CustomerId(2), "Bob").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(new_order(1, 50)).await.unwrap();
        let b = store.insert(new_order(1, 60)).await.unwrap();

        assert_eq!(a.id, OrderId(1));
        assert_eq!(b.id, OrderId(2));
        assert_eq!(a.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_is_compare_and_set() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(new_order(1, 50)).await.unwrap();

        let applied = store
            .update(
                order.id,
                OrderStatus::Pending,
                OrderPatch::to(OrderStatus::WaitingPayment),
            )
            .await
            .unwrap();
        assert!(matches!(applied, StatusUpdate::Applied(ref o) if o.status == OrderStatus::WaitingPayment));

        let stale = store
            .update(
                order.id,
                OrderStatus::Pending,
                OrderPatch::to(OrderStatus::Cancelled),
            )
            .await
            .unwrap();
        assert_eq!(stale, StatusUpdate::Conflict(OrderStatus::WaitingPayment));

        let missing = store
            .update(
                OrderId(99),
                OrderStatus::Pending,
                OrderPatch::to(OrderStatus::Cancelled),
            )
            .await
            .unwrap();
        assert_eq!(missing, StatusUpdate::Missing);
    }

    #[tokio::test]
    async fn test_concurrent_updates_apply_once() {
        let store = InMemoryOrderStore::new();
        let id = store.insert(new_order(1, 50)).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(
                        id,
                        OrderStatus::Pending,
                        OrderPatch::to(OrderStatus::Cancelled),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), StatusUpdate::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_list_and_totals() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(new_order(1, 50)).await.unwrap();
        let b = store.insert(new_order(2, 100)).await.unwrap();
        store.insert(new_order(3, 200)).await.unwrap();

        for (from, to) in [
            (OrderStatus::Pending, OrderStatus::WaitingPayment),
            (OrderStatus::WaitingPayment, OrderStatus::WaitingConfirmation),
            (OrderStatus::WaitingConfirmation, OrderStatus::Confirmed),
            (OrderStatus::Confirmed, OrderStatus::Completed),
        ] {
            store.update(a.id, from, OrderPatch::to(to)).await.unwrap();
        }
        store
            .update(b.id, OrderStatus::Pending, OrderPatch::to(OrderStatus::Cancelled))
            .await
            .unwrap();

        let active = store.list(OrderFilter::Active).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, OrderId(3));

        let all = store.list(OrderFilter::All).await.unwrap();
        let ids: Vec<_> = all.iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let totals = store.totals().await.unwrap();
        assert_eq!(totals.completed_orders, 1);
        assert_eq!(totals.completed_revenue, dec!(75.0));
        assert_eq!(totals.pending_orders, 1);
    }

    #[tokio::test]
    async fn test_totals_report_revenue_overflow() {
        let store = InMemoryOrderStore::new();
        for _ in 0..2 {
            let mut order = new_order(1, 50);
            order.amount = Amount::new(rust_decimal::Decimal::MAX).unwrap();
            let order = store.insert(order).await.unwrap();
            for (from, to) in [
                (OrderStatus::Pending, OrderStatus::WaitingPayment),
                (OrderStatus::WaitingPayment, OrderStatus::WaitingConfirmation),
                (OrderStatus::WaitingConfirmation, OrderStatus::Confirmed),
                (OrderStatus::Confirmed, OrderStatus::Completed),
            ] {
                store.update(order.id, from, OrderPatch::to(to)).await.unwrap();
            }
        }

        assert!(matches!(
            store.totals().await,
            Err(crate::error::ShopError::InternalError(_))
        ));
    }

    #[tokio::test]
    async fn test_session_store_last_write_wins() {
        let store = InMemorySessionStore::new();
        let customer = CustomerId(5);
        store
            .set(customer, Flow::AwaitingRecipient(RecipientFor::Stars))
            .await
            .unwrap();
        store
            .set(customer, Flow::AwaitingEvidence { order_id: OrderId(3) })
            .await
            .unwrap();

        assert_eq!(
            store.get(customer).await.unwrap(),
            Some(Flow::AwaitingEvidence { order_id: OrderId(3) })
        );
        assert!(store.clear(customer).await.unwrap().is_some());
        assert!(store.get(customer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_swap_if_compares_current_flow() {
        let store = InMemorySessionStore::new();
        let customer = CustomerId(5);
        let stars = Flow::AwaitingRecipient(RecipientFor::Stars);
        let evidence = Flow::AwaitingEvidence { order_id: OrderId(3) };

        assert!(store.swap_if(customer, None, Some(stars.clone())).await.unwrap());
        assert!(!store.swap_if(customer, None, Some(evidence.clone())).await.unwrap());
        assert!(!store.swap_if(customer, Some(&evidence), None).await.unwrap());
        assert_eq!(store.get(customer).await.unwrap(), Some(stars.clone()));

        assert!(store.swap_if(customer, Some(&stars), None).await.unwrap());
        assert!(store.get(customer).await.unwrap().is_none());
    }
}
