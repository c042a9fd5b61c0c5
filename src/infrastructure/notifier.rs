use crate::domain::customer::CustomerId;
use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;
use async_trait::async_trait;
use tracing::info;

/// Delivers notifications as structured log events.
///
/// Stands in for the chat transport, which would send the same
/// notifications as messages to the customer and every operator.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    operators: Vec<CustomerId>,
}

impl LogNotifier {
    pub fn new(operators: Vec<CustomerId>) -> Self {
        Self { operators }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        let Notification {
            order_id,
            customer,
            event,
        } = notification;
        if event.notifies_customer() {
            info!(%order_id, recipient = %customer, %event, "Notify customer");
        }
        if event.notifies_operators() {
            for operator in &self.operators {
                info!(%order_id, recipient = %operator, %customer, %event, "Notify operator");
            }
        }
    }
}
