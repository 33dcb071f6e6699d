//! In-memory store for tests and local runs without Postgres

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::repository::{NotificationLog, OrderStore, TransactionStore};
use crate::database::webhook_repository::WebhookEvent;
use crate::payments::providers::epayco::EpaycoAcquirer;
use crate::payments::types::{OrderTotals, PaymentTransaction, TransactionUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    transactions: Vec<PaymentTransaction>,
    acquirers: HashMap<Uuid, EpaycoAcquirer>,
    orders: HashMap<String, OrderTotals>,
    events: Vec<WebhookEvent>,
    writes: usize,
}

/// Implements every store trait over a single mutex
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| {
            DatabaseError::new(DatabaseErrorKind::ConnectionError {
                message: "in-memory store poisoned".to_string(),
            })
        })
    }

    pub fn insert_acquirer(&self, acquirer: EpaycoAcquirer) -> DbResult<()> {
        self.lock()?.acquirers.insert(acquirer.id, acquirer);
        Ok(())
    }

    pub fn insert_transaction(&self, transaction: PaymentTransaction) -> DbResult<()> {
        self.lock()?.transactions.push(transaction);
        Ok(())
    }

    pub fn insert_order(&self, order_key: &str, totals: OrderTotals) -> DbResult<()> {
        self.lock()?.orders.insert(order_key.to_string(), totals);
        Ok(())
    }

    pub fn transaction(&self, id: Uuid) -> DbResult<Option<PaymentTransaction>> {
        Ok(self.lock()?.transactions.iter().find(|t| t.id == id).cloned())
    }

    pub fn events(&self) -> DbResult<Vec<WebhookEvent>> {
        Ok(self.lock()?.events.clone())
    }

    /// Number of reconciliation writes applied so far
    pub fn write_count(&self) -> DbResult<usize> {
        Ok(self.lock()?.writes)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn find_by_reference(&self, reference: &str) -> DbResult<Vec<PaymentTransaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.reference == reference)
            .cloned()
            .collect())
    }

    async fn find_acquirer(&self, acquirer_id: Uuid) -> DbResult<Option<EpaycoAcquirer>> {
        Ok(self.lock()?.acquirers.get(&acquirer_id).cloned())
    }

    async fn apply_reconciliation(
        &self,
        update: &TransactionUpdate,
    ) -> DbResult<PaymentTransaction> {
        let mut inner = self.lock()?;
        let transaction = inner
            .transactions
            .iter_mut()
            .find(|t| t.id == update.transaction_id)
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "PaymentTransaction".to_string(),
                    id: update.transaction_id.to_string(),
                })
            })?;

        transaction.acquirer_reference = update.acquirer_reference.clone();
        transaction.date = update.date;
        transaction.state = update.state;
        let updated = transaction.clone();
        inner.writes += 1;
        Ok(updated)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_order_totals(&self, order_key: &str) -> DbResult<Option<OrderTotals>> {
        Ok(self.lock()?.orders.get(order_key).cloned())
    }
}

#[async_trait]
impl NotificationLog for InMemoryStore {
    async fn log_event(
        &self,
        event_type: &str,
        source: &str,
        payload: serde_json::Value,
    ) -> DbResult<WebhookEvent> {
        let event = WebhookEvent {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            payload,
            processed: false,
            attempts: 0,
            last_error: None,
            created_at: chrono::Utc::now(),
            processed_at: None,
        };
        self.lock()?.events.push(event.clone());
        Ok(event)
    }

    async fn mark_processed(&self, event_id: &str, note: Option<&str>) -> DbResult<WebhookEvent> {
        self.update_event(event_id, |event| {
            event.processed = true;
            event.processed_at = Some(chrono::Utc::now());
            event.last_error = note.map(str::to_string);
        })
    }

    async fn record_failure(&self, event_id: &str, error: &str) -> DbResult<WebhookEvent> {
        self.update_event(event_id, |event| {
            event.attempts += 1;
            event.last_error = Some(error.to_string());
        })
    }
}

impl InMemoryStore {
    fn update_event<F>(&self, event_id: &str, apply: F) -> DbResult<WebhookEvent>
    where
        F: FnOnce(&mut WebhookEvent),
    {
        let mut inner = self.lock()?;
        let event = inner
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "WebhookEvent".to_string(),
                    id: event_id.to_string(),
                })
            })?;
        apply(event);
        Ok(event.clone())
    }
}
