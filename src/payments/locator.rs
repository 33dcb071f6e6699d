//! Transaction lookup for inbound gateway notifications
//!
//! A notification must name exactly one local transaction and carry the
//! signature its acquirer would have produced. Nothing is written here.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::TransactionStore;
use crate::error::{AppResult, ValidationError};
use crate::payments::providers::epayco::EpaycoAcquirer;
use crate::payments::signature::signatures_match;
use crate::payments::traits::PaymentAcquirer;
use crate::payments::types::{Notification, PaymentTransaction};
use tracing::{error, warn};

/// A transaction together with the acquirer it belongs to
#[derive(Debug, Clone)]
pub struct LocatedTransaction {
    pub transaction: PaymentTransaction,
    pub acquirer: EpaycoAcquirer,
}

/// Find the transaction a notification refers to and verify its signature.
pub async fn find_transaction(
    store: &dyn TransactionStore,
    notification: &Notification,
) -> AppResult<LocatedTransaction> {
    let (reference, signature) = match (notification.reference(), notification.signature()) {
        (Some(reference), Some(signature)) => (reference, signature),
        (reference, _) => {
            let field = if reference.is_none() { "reference" } else { "signature" };
            warn!(
                "Epayco: received data with missing reference ({:?}) or signature ({:?})",
                notification.x_extra4, notification.x_signature
            );
            return Err(ValidationError::MissingField {
                field: field.to_string(),
            }
            .into());
        }
    };

    let located = resolve_reference(store, reference).await?;

    let expected = located
        .acquirer
        .generate_signature(&notification.signature_fields());
    if !signatures_match(&expected, signature) {
        error!(
            "Epayco: invalid signature for reference {}, received {}",
            reference, signature
        );
        return Err(ValidationError::SignatureInvalid {
            reference: reference.to_string(),
        }
        .into());
    }

    Ok(located)
}

/// Resolve a reference to exactly one transaction and load its acquirer.
pub async fn resolve_reference(
    store: &dyn TransactionStore,
    reference: &str,
) -> AppResult<LocatedTransaction> {
    let mut matches = store.find_by_reference(reference).await?;

    let transaction = match matches.len() {
        0 => {
            error!("Epayco: received data for reference {}; no order found", reference);
            return Err(ValidationError::NotFound {
                reference: reference.to_string(),
            }
            .into());
        }
        1 => matches.remove(0),
        count => {
            error!(
                "Epayco: received data for reference {}; multiple orders found ({})",
                reference, count
            );
            return Err(ValidationError::AmbiguousMatch {
                reference: reference.to_string(),
                count,
            }
            .into());
        }
    };

    let acquirer = store
        .find_acquirer(transaction.acquirer_id)
        .await?
        .ok_or_else(|| {
            error!(
                "Epayco: transaction {} points at missing acquirer {}",
                transaction.id, transaction.acquirer_id
            );
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "PaymentAcquirer".to_string(),
                id: transaction.acquirer_id.to_string(),
            })
        })?;

    Ok(LocatedTransaction {
        transaction,
        acquirer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;
    use crate::payments::providers::epayco::{AcquirerEnvironment, CheckoutMode};
    use crate::payments::types::TransactionState;
    use uuid::Uuid;

    const VALID_SIGNATURE: &str =
        "6387435cb586da10b6ce6e4403d832089b82d319368534d38a32ff6d3e75bd36";

    fn seeded_store(reference: &str, copies: usize) -> InMemoryStore {
        let store = InMemoryStore::new();
        let acquirer = EpaycoAcquirer {
            id: Uuid::new_v4(),
            customer_id: "123".to_string(),
            private_key: "secret".to_string(),
            public_key: "pub_key".to_string(),
            checkout_mode: CheckoutMode::OnePage,
            environment: AcquirerEnvironment::Test,
        };
        for _ in 0..copies {
            store
                .insert_transaction(PaymentTransaction {
                    id: Uuid::new_v4(),
                    reference: reference.to_string(),
                    acquirer_id: acquirer.id,
                    amount: "100.00".to_string(),
                    currency: Some("COP".to_string()),
                    state: TransactionState::Draft,
                    acquirer_reference: None,
                    date: chrono::Utc::now(),
                })
                .unwrap();
        }
        store.insert_acquirer(acquirer).unwrap();
        store
    }

    fn notification() -> Notification {
        Notification {
            x_ref_payco: Some("R1".to_string()),
            x_transaction_id: Some("T1".to_string()),
            x_amount: Some("100.00".to_string()),
            x_currency_code: Some("COP".to_string()),
            x_cust_id_cliente: Some("123".to_string()),
            x_extra4: Some("ORDER-1".to_string()),
            x_signature: Some(VALID_SIGNATURE.to_string()),
            x_transaction_state: Some("Aceptada".to_string()),
            x_response_reason_text: None,
        }
    }

    fn validation(err: crate::error::AppError) -> ValidationError {
        err.as_validation().cloned().expect("validation error")
    }

    #[tokio::test]
    async fn test_finds_unique_signed_transaction() {
        let store = seeded_store("ORDER-1", 1);
        let located = find_transaction(&store, &notification()).await.unwrap();
        assert_eq!(located.transaction.reference, "ORDER-1");
        assert_eq!(located.acquirer.customer_id, "123");
    }

    #[tokio::test]
    async fn test_missing_reference() {
        let store = seeded_store("ORDER-1", 1);
        let mut n = notification();
        n.x_extra4 = None;
        let err = find_transaction(&store, &n).await.unwrap_err();
        assert_eq!(
            validation(err),
            ValidationError::MissingField {
                field: "reference".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_signature() {
        let store = seeded_store("ORDER-1", 1);
        let mut n = notification();
        n.x_signature = Some(String::new());
        let err = find_transaction(&store, &n).await.unwrap_err();
        assert_eq!(
            validation(err),
            ValidationError::MissingField {
                field: "signature".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = seeded_store("ORDER-2", 1);
        let err = find_transaction(&store, &notification()).await.unwrap_err();
        assert_eq!(
            validation(err),
            ValidationError::NotFound {
                reference: "ORDER-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ambiguous_match() {
        let store = seeded_store("ORDER-1", 2);
        let err = find_transaction(&store, &notification()).await.unwrap_err();
        assert_eq!(
            validation(err),
            ValidationError::AmbiguousMatch {
                reference: "ORDER-1".to_string(),
                count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_signature_mismatch() {
        let store = seeded_store("ORDER-1", 1);
        let mut n = notification();
        n.x_signature = Some(VALID_SIGNATURE.replace('6', "7"));
        let err = find_transaction(&store, &n).await.unwrap_err();
        assert_eq!(
            validation(err),
            ValidationError::SignatureInvalid {
                reference: "ORDER-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_tampered_amount_fails_signature() {
        let store = seeded_store("ORDER-1", 1);
        let mut n = notification();
        n.x_amount = Some("1.00".to_string());
        let err = find_transaction(&store, &n).await.unwrap_err();
        assert_eq!(err.code(), "signature_invalid");
    }

    #[tokio::test]
    async fn test_missing_acquirer_is_infrastructure_error() {
        let store = InMemoryStore::new();
        store
            .insert_transaction(PaymentTransaction {
                id: Uuid::new_v4(),
                reference: "ORDER-1".to_string(),
                acquirer_id: Uuid::new_v4(),
                amount: "100.00".to_string(),
                currency: None,
                state: TransactionState::Draft,
                acquirer_reference: None,
                date: chrono::Utc::now(),
            })
            .unwrap();
        let err = find_transaction(&store, &notification()).await.unwrap_err();
        assert_eq!(err.code(), "database_error");
    }
}
