use crate::domain::customer::{Customer, CustomerId};
use crate::domain::invoice::{Invoice, InvoiceId};
use crate::domain::money::Amount;
use crate::domain::order::{
    NewOrder, Order, OrderId, OrderKind, OrderPatch, OrderStatus, Rail,
};
use crate::domain::ports::{CustomerStore, OrderFilter, OrderStore, OrderTotals, StatusUpdate};
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing customers.
pub const CF_CUSTOMERS: &str = "customers";
/// Column Family for storing orders, keyed by big-endian id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const LAST_ORDER_ID_KEY: &[u8] = b"last_order_id";

/// Order row as persisted. The payload stays an open document.
#[derive(Debug, Serialize, Deserialize)]
struct OrderRecord {
    id: OrderId,
    owner: CustomerId,
    kind: OrderKind,
    recipient: String,
    details: serde_json::Value,
    amount: Amount,
    rail: Rail,
    status: OrderStatus,
    invoice_id: Option<InvoiceId>,
    created_at: DateTime<Utc>,
}

impl OrderRecord {
    fn from_order(order: &Order) -> Result<Self> {
        Ok(Self {
            id: order.id,
            owner: order.owner,
            kind: order.kind(),
            recipient: order.recipient.clone(),
            details: order.payload_document()?,
            amount: order.amount,
            rail: order.rail,
            status: order.status,
            invoice_id: order.invoice.as_ref().map(|invoice| invoice.id.clone()),
            created_at: order.created_at,
        })
    }

    fn into_order(self) -> Result<Order> {
        let (details, evidence, pay_url) = Order::details_from_document(self.kind, &self.details)?;
        Ok(Order {
            id: self.id,
            owner: self.owner,
            recipient: self.recipient,
            details,
            amount: self.amount,
            rail: self.rail,
            status: self.status,
            invoice: self.invoice_id.map(|id| Invoice {
                id,
                pay_url: pay_url.unwrap_or_default(),
            }),
            evidence,
            created_at: self.created_at,
        })
    }
}

/// A persistent store implementation using RocksDB.
///
/// Customers and orders live in separate Column Families. RocksDB has no
/// compare-and-set, so every read-modify-write runs under `write_lock`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ShopError::InternalError(Box::new(e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ShopError::InternalError(Box::new(e)))
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// the column families on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_CUSTOMERS, CF_ORDERS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ShopError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn load_order(&self, id: OrderId) -> Result<Option<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => decode::<OrderRecord>(&bytes)?.into_order().map(Some),
            None => Ok(None),
        }
    }

    fn save_order(&self, batch: &mut WriteBatch, order: &Order) -> Result<()> {
        let cf = self.cf(CF_ORDERS)?;
        batch.put_cf(cf, order.id.0.to_be_bytes(), encode(&OrderRecord::from_order(order)?)?);
        Ok(())
    }

    fn scan_orders(&self) -> Result<Vec<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            let (_key, value) = item?;
            orders.push(decode::<OrderRecord>(&value)?.into_order()?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl CustomerStore for RocksDBStore {
    async fn upsert(&self, id: CustomerId, display_name: &str) -> Result<Customer> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_CUSTOMERS)?;
        let key = id.0.to_be_bytes();
        let customer = match self.db.get_cf(cf, key)? {
            Some(bytes) => Customer {
                display_name: display_name.to_string(),
                ..decode(&bytes)?
            },
            None => Customer::new(id, display_name),
        };
        self.db.put_cf(cf, key, encode(&customer)?)?;
        Ok(customer)
    }

    async fn count(&self) -> Result<u64> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let meta = self.cf(CF_META)?;
        let last_id = match self.db.get_cf(meta, LAST_ORDER_ID_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    ShopError::InternalError("corrupt order id counter".into())
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let order = Order::from_new(OrderId(last_id + 1), order);

        let mut batch = WriteBatch::default();
        self.save_order(&mut batch, &order)?;
        batch.put_cf(meta, LAST_ORDER_ID_KEY, order.id.0.to_be_bytes());
        self.db.write(batch)?;
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.load_order(id)
    }

    async fn update(
        &self,
        id: OrderId,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> Result<StatusUpdate> {
        let _guard = self.write_lock.lock().await;
        let Some(mut order) = self.load_order(id)? else {
            return Ok(StatusUpdate::Missing);
        };
        if let Err(actual) = order.try_apply(expected, patch) {
            return Ok(StatusUpdate::Conflict(actual));
        }
        let mut batch = WriteBatch::default();
        self.save_order(&mut batch, &order)?;
        self.db.write(batch)?;
        Ok(StatusUpdate::Applied(order))
    }

    async fn list(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        Ok(self
            .scan_orders()?
            .into_iter()
            .filter(|order| filter.matches(order.status))
            .collect())
    }

    async fn totals(&self) -> Result<OrderTotals> {
        let mut totals = OrderTotals::default();
        for order in self.scan_orders()? {
            totals.record(&order)?;
        }
        Ok(totals)
    }
}
