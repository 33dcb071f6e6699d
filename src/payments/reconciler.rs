//! Notification reconciliation
//!
//! Applies a verified ePayco notification to its transaction. Both inbound
//! paths (buyer redirect and server-to-server confirmation) end up in
//! [`NotificationReconciler::process`].

use crate::database::repository::{NotificationLog, TransactionStore};
use crate::error::{AppResult, ValidationError};
use crate::payments::locator::{find_transaction, LocatedTransaction};
use crate::payments::providers::epayco::{EpaycoAcquirer, PROVIDER};
use crate::payments::types::{
    InvalidParameter, Notification, PaymentTransaction, TransactionState, TransactionUpdate,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which endpoint a notification arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSource {
    /// Buyer redirect, payload fetched from the lookup API
    Response,
    /// Server-to-server confirmation post
    Confirmation,
}

impl NotificationSource {
    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationSource::Response => "epayco.response",
            NotificationSource::Confirmation => "epayco.confirmation",
        }
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub transaction: PaymentTransaction,
    pub previous_state: TransactionState,
    /// Identity mismatches found in the notification. Reported, not enforced.
    pub invalid_parameters: Vec<InvalidParameter>,
}

/// Compare the identity echoed by the gateway against the acquirer.
///
/// Customer ids are compared as integers when both sides parse, so `0123`
/// matches `123`. An absent id is a mismatch.
pub fn invalid_parameters(
    acquirer: &EpaycoAcquirer,
    notification: &Notification,
) -> Vec<InvalidParameter> {
    let mut invalid = Vec::new();

    let received = notification.x_cust_id_cliente.as_deref();
    let matches = match received {
        Some(received) => match (
            received.trim().parse::<i64>(),
            acquirer.customer_id.trim().parse::<i64>(),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => received.trim() == acquirer.customer_id.trim(),
        },
        None => false,
    };

    if !matches {
        invalid.push(InvalidParameter {
            field: "Customer ID".to_string(),
            received: received.unwrap_or("None").to_string(),
            expected: acquirer.customer_id.clone(),
        });
    }

    invalid
}

/// Apply `notification` to an already located and signature-checked transaction.
///
/// The gateway reference and timestamp are written on every call, together
/// with the state derived from `x_transaction_state`. There is no guard against
/// repeated or out-of-order delivery: the last notification wins.
pub async fn reconcile(
    store: &dyn TransactionStore,
    located: &LocatedTransaction,
    notification: &Notification,
) -> AppResult<Reconciliation> {
    let invalid = invalid_parameters(&located.acquirer, notification);
    if !invalid.is_empty() {
        warn!(
            "Epayco: incorrect tx data for reference {}: {:?}",
            located.transaction.reference, invalid
        );
    }

    let previous_state = located.transaction.state;
    let update = TransactionUpdate {
        transaction_id: located.transaction.id,
        acquirer_reference: notification.x_ref_payco.clone(),
        date: chrono::Utc::now(),
        state: TransactionState::from_gateway_status(notification.x_transaction_state.as_deref()),
    };

    let transaction = store.apply_reconciliation(&update).await?;

    info!(
        "Epayco: transaction {} moved {} -> {} (status={:?}, ref_payco={:?})",
        transaction.reference,
        previous_state,
        transaction.state,
        notification.x_transaction_state,
        notification.x_ref_payco
    );

    Ok(Reconciliation {
        transaction,
        previous_state,
        invalid_parameters: invalid,
    })
}

/// Entry point shared by both notification paths
#[derive(Clone)]
pub struct NotificationReconciler {
    store: Arc<dyn TransactionStore>,
    log: Arc<dyn NotificationLog>,
    reject_invalid_parameters: bool,
}

impl NotificationReconciler {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        log: Arc<dyn NotificationLog>,
        reject_invalid_parameters: bool,
    ) -> Self {
        Self {
            store,
            log,
            reject_invalid_parameters,
        }
    }

    /// Locate, verify and reconcile one notification, recording it in the
    /// notification log.
    pub async fn process(
        &self,
        source: NotificationSource,
        notification: Notification,
    ) -> AppResult<Reconciliation> {
        info!(
            "Epayco: received {} for reference {:?} (ref_payco={:?})",
            source.event_type(),
            notification.x_extra4,
            notification.x_ref_payco
        );

        let event_id = self.log_received(source, &notification).await;
        let result = self.locate_and_reconcile(&notification).await;

        if let Some(event_id) = event_id {
            let logged = match &result {
                Ok(reconciliation) => {
                    let note = (!reconciliation.invalid_parameters.is_empty()).then(|| {
                        format!("invalid parameters: {:?}", reconciliation.invalid_parameters)
                    });
                    self.log.mark_processed(&event_id, note.as_deref()).await
                }
                Err(e) => self.log.record_failure(&event_id, &e.to_string()).await,
            };
            if let Err(e) = logged {
                warn!("Failed to update notification log entry {}: {}", event_id, e);
            }
        }

        result
    }

    async fn locate_and_reconcile(&self, notification: &Notification) -> AppResult<Reconciliation> {
        let located = find_transaction(self.store.as_ref(), notification).await?;

        if self.reject_invalid_parameters {
            let invalid = invalid_parameters(&located.acquirer, notification);
            if !invalid.is_empty() {
                error!(
                    "Epayco: rejecting notification for reference {}: {:?}",
                    located.transaction.reference, invalid
                );
                return Err(ValidationError::InvalidParameters {
                    reference: located.transaction.reference.clone(),
                    parameters: invalid.into_iter().map(InvalidParameter::into_triple).collect(),
                }
                .into());
            }
        }

        reconcile(self.store.as_ref(), &located, notification).await
    }

    async fn log_received(
        &self,
        source: NotificationSource,
        notification: &Notification,
    ) -> Option<String> {
        let payload = match serde_json::to_value(notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize notification for logging: {}", e);
                return None;
            }
        };

        match self.log.log_event(source.event_type(), PROVIDER, payload).await {
            Ok(event) => Some(event.id),
            Err(e) => {
                warn!("Failed to record notification: {}", e);
                None
            }
        }
    }
}
