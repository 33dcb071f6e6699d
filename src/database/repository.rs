use crate::database::error::DbResult;
use crate::database::webhook_repository::WebhookEvent;
use crate::payments::providers::epayco::EpaycoAcquirer;
use crate::payments::types::{OrderTotals, PaymentTransaction, TransactionUpdate};
use async_trait::async_trait;
use uuid::Uuid;

/// Access to payment transactions and the acquirers they belong to.
///
/// Implementations rely on the backing store for isolation between concurrent
/// notifications; no locking happens above this trait.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// All transactions whose reference equals `reference`
    async fn find_by_reference(&self, reference: &str) -> DbResult<Vec<PaymentTransaction>>;

    /// Acquirer configuration attached to a transaction
    async fn find_acquirer(&self, acquirer_id: Uuid) -> DbResult<Option<EpaycoAcquirer>>;

    /// Persist the gateway reference and timestamp, then the new state, as one unit
    async fn apply_reconciliation(
        &self,
        update: &TransactionUpdate,
    ) -> DbResult<PaymentTransaction>;
}

/// Read side of the order collaborator used by the checkout page
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order_totals(&self, order_key: &str) -> DbResult<Option<OrderTotals>>;
}

/// Append-only audit trail of inbound gateway notifications
#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn log_event(
        &self,
        event_type: &str,
        source: &str,
        payload: serde_json::Value,
    ) -> DbResult<WebhookEvent>;

    /// Mark an event handled. `note` keeps non-blocking findings such as
    /// identity mismatches.
    async fn mark_processed(&self, event_id: &str, note: Option<&str>)
        -> DbResult<WebhookEvent>;

    async fn record_failure(&self, event_id: &str, error: &str) -> DbResult<WebhookEvent>;
}
