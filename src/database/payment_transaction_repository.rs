use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::repository::{OrderStore, TransactionStore};
use crate::database::transaction::DatabaseTransaction;
use crate::payments::providers::epayco::{AcquirerEnvironment, EpaycoAcquirer, EpaycoSettings, PROVIDER};
use crate::payments::types::{OrderTotals, PaymentTransaction, TransactionUpdate};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

/// Row shape of `payment_transactions`
#[derive(Debug, Clone, FromRow)]
struct PaymentTransactionRow {
    id: Uuid,
    reference: String,
    acquirer_id: Uuid,
    amount: String,
    currency: Option<String>,
    state: String,
    acquirer_reference: Option<String>,
    date: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PaymentTransactionRow> for PaymentTransaction {
    type Error = DatabaseError;

    fn try_from(row: PaymentTransactionRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse()
            .map_err(|e: String| DatabaseError::decode("state", e).with_context(row.id.to_string()))?;

        Ok(PaymentTransaction {
            id: row.id,
            reference: row.reference,
            acquirer_id: row.acquirer_id,
            amount: row.amount,
            currency: row.currency,
            state,
            acquirer_reference: row.acquirer_reference,
            date: row.date,
        })
    }
}

/// Row shape of `payment_acquirers`
#[derive(Debug, Clone, FromRow)]
struct AcquirerRow {
    id: Uuid,
    provider: String,
    environment: String,
    settings: serde_json::Value,
}

impl TryFrom<AcquirerRow> for EpaycoAcquirer {
    type Error = DatabaseError;

    fn try_from(row: AcquirerRow) -> Result<Self, Self::Error> {
        if row.provider != PROVIDER {
            return Err(DatabaseError::decode(
                "provider",
                format!("acquirer {} is a '{}' acquirer", row.id, row.provider),
            ));
        }
        let environment: AcquirerEnvironment = row
            .environment
            .parse()
            .map_err(|e: String| DatabaseError::decode("environment", e))?;
        let settings: EpaycoSettings = serde_json::from_value(row.settings)
            .map_err(|e| DatabaseError::decode("settings", e))?;

        Ok(EpaycoAcquirer::from_settings(row.id, environment, settings))
    }
}

#[derive(Debug, Clone, FromRow)]
struct OrderTotalsRow {
    amount_tax: String,
    amount_untaxed: String,
}

const TRANSACTION_COLUMNS: &str =
    "id, reference, acquirer_id, amount, currency, state, acquirer_reference, date";

/// Postgres-backed payment transaction and order lookups
pub struct PaymentTransactionRepository {
    pool: PgPool,
}

impl PaymentTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PaymentTransactionRepository {
    async fn find_by_reference(&self, reference: &str) -> DbResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, PaymentTransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(PaymentTransaction::try_from).collect()
    }

    async fn find_acquirer(&self, acquirer_id: Uuid) -> DbResult<Option<EpaycoAcquirer>> {
        let row = sqlx::query_as::<_, AcquirerRow>(
            "SELECT id, provider, environment, settings FROM payment_acquirers WHERE id = $1",
        )
        .bind(acquirer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(EpaycoAcquirer::try_from).transpose()
    }

    async fn apply_reconciliation(
        &self,
        update: &TransactionUpdate,
    ) -> DbResult<PaymentTransaction> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        sqlx::query(
            "UPDATE payment_transactions SET acquirer_reference = $1, date = $2 WHERE id = $3",
        )
        .bind(&update.acquirer_reference)
        .bind(update.date)
        .bind(update.transaction_id)
        .execute(&mut **tx.tx_mut()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let row = sqlx::query_as::<_, PaymentTransactionRow>(&format!(
            "UPDATE payment_transactions SET state = $1 WHERE id = $2
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(update.state.as_str())
        .bind(update.transaction_id)
        .fetch_optional(&mut **tx.tx_mut()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "PaymentTransaction".to_string(),
                id: update.transaction_id.to_string(),
            }));
        };

        tx.commit().await?;
        debug!(
            "Reconciliation persisted: transaction_id={}, state={}",
            update.transaction_id, update.state
        );

        PaymentTransaction::try_from(row)
    }
}

#[async_trait]
impl OrderStore for PaymentTransactionRepository {
    async fn find_order_totals(&self, order_key: &str) -> DbResult<Option<OrderTotals>> {
        let row = sqlx::query_as::<_, OrderTotalsRow>(
            "SELECT amount_tax, amount_untaxed FROM sale_orders WHERE name = $1",
        )
        .bind(order_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|row| OrderTotals {
            amount_tax: row.amount_tax,
            amount_untaxed: row.amount_untaxed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::TransactionState;

    fn row(state: &str) -> PaymentTransactionRow {
        PaymentTransactionRow {
            id: Uuid::new_v4(),
            reference: "SO042-1".to_string(),
            acquirer_id: Uuid::new_v4(),
            amount: "100.00".to_string(),
            currency: Some("COP".to_string()),
            state: state.to_string(),
            acquirer_reference: None,
            date: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_row_converts_to_transaction() {
        let tx = PaymentTransaction::try_from(row("pending")).unwrap();
        assert_eq!(tx.state, TransactionState::Pending);
        assert_eq!(tx.order_key(), "SO042");
    }

    #[test]
    fn test_unknown_state_is_decode_error() {
        let err = PaymentTransaction::try_from(row("authorized")).unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::DecodeError { .. }));
    }

    #[test]
    fn test_acquirer_row_decodes_settings() {
        let acquirer = EpaycoAcquirer::try_from(AcquirerRow {
            id: Uuid::new_v4(),
            provider: "epayco".to_string(),
            environment: "prod".to_string(),
            settings: serde_json::json!({
                "customer_id": "123",
                "private_key": "secret",
                "public_key": "pub_key"
            }),
        })
        .unwrap();
        assert_eq!(acquirer.customer_id, "123");
        assert_eq!(acquirer.environment, AcquirerEnvironment::Production);
    }

    #[test]
    fn test_acquirer_row_rejects_other_provider() {
        let err = EpaycoAcquirer::try_from(AcquirerRow {
            id: Uuid::new_v4(),
            provider: "paypal".to_string(),
            environment: "test".to_string(),
            settings: serde_json::json!({}),
        })
        .unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::DecodeError { .. }));
    }

    #[tokio::test]
    #[ignore] // Requires database running
    async fn test_find_by_reference_against_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::database::init_pool(&url, None).await.unwrap();
        let repo = PaymentTransactionRepository::new(pool);
        let found = repo.find_by_reference("does-not-exist").await.unwrap();
        assert!(found.is_empty());
    }
}
