use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRow<'a> {
    id: u64,
    owner: i64,
    kind: String,
    recipient: &'a str,
    amount: String,
    rail: String,
    status: &'static str,
    invoice: Option<&'a str>,
}

/// Writes the final order table as CSV.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        for order in orders {
            self.writer.serialize(OrderRow {
                id: order.id.0,
                owner: order.owner.0,
                kind: order.kind().to_string(),
                recipient: &order.recipient,
                amount: order.amount.to_string(),
                rail: order.rail.to_string(),
                status: order.status.as_str(),
                invoice: order.invoice.as_ref().map(|invoice| invoice.id.0.as_str()),
            })?;
        }
        if orders.is_empty() {
            self.writer.write_record([
                "id", "owner", "kind", "recipient", "amount", "rail", "status", "invoice",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
