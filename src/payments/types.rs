//! Payment domain types
//!
//! The transaction record is owned by the checkout flow; this crate only reads
//! it, verifies notifications against it and moves its state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a payment transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Draft,
    Pending,
    Done,
    Cancelled,
    Error,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Draft => "draft",
            TransactionState::Pending => "pending",
            TransactionState::Done => "done",
            TransactionState::Cancelled => "cancelled",
            TransactionState::Error => "error",
        }
    }

    /// Map an ePayco `x_transaction_state` to the state it drives.
    ///
    /// Matching is exact and case-sensitive. Anything that is not an explicit
    /// acceptance or pending marker cancels the transaction.
    pub fn from_gateway_status(status: Option<&str>) -> Self {
        match status {
            Some("Aceptada") => TransactionState::Done,
            Some("Pendiente") => TransactionState::Pending,
            _ => TransactionState::Cancelled,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TransactionState::Draft),
            "pending" => Ok(TransactionState::Pending),
            "done" => Ok(TransactionState::Done),
            "cancelled" => Ok(TransactionState::Cancelled),
            "error" => Ok(TransactionState::Error),
            other => Err(format!("unknown transaction state '{}'", other)),
        }
    }
}

/// A checkout attempt as persisted by the host application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    /// Merchant-side reference, e.g. `SO042-1`
    pub reference: String,
    pub acquirer_id: Uuid,
    pub amount: String,
    pub currency: Option<String>,
    pub state: TransactionState,
    /// Gateway-assigned reference (`x_ref_payco`)
    pub acquirer_reference: Option<String>,
    pub date: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Order key used for gateway bookkeeping: the reference up to the first `-`.
    pub fn order_key(&self) -> &str {
        order_key(&self.reference)
    }
}

pub fn order_key(reference: &str) -> &str {
    reference.split('-').next().unwrap_or(reference)
}

/// Write produced by one reconciliation, applied atomically by the store
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub transaction_id: Uuid,
    pub acquirer_reference: Option<String>,
    pub date: DateTime<Utc>,
    pub state: TransactionState,
}

/// Identity check failure: (field, received, expected)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidParameter {
    pub field: String,
    pub received: String,
    pub expected: String,
}

impl InvalidParameter {
    pub fn into_triple(self) -> (String, String, String) {
        (self.field, self.received, self.expected)
    }
}

/// Order totals shown on the checkout page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub amount_tax: String,
    pub amount_untaxed: String,
}

/// Notification payload sent by ePayco, either posted to the confirmation
/// endpoint or returned under `data` by the reference-lookup API.
///
/// Values are kept in their string form. The lookup API returns JSON numbers
/// for amounts and ids, so every field is decoded leniently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_ref_payco: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_transaction_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_currency_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_cust_id_cliente: Option<String>,
    /// Local transaction reference echoed back by the widget
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_extra4: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_signature: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_transaction_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub x_response_reason_text: Option<String>,
}

impl Notification {
    /// Non-empty local reference, if any
    pub fn reference(&self) -> Option<&str> {
        non_empty(self.x_extra4.as_deref())
    }

    /// Non-empty gateway signature, if any
    pub fn signature(&self) -> Option<&str> {
        non_empty(self.x_signature.as_deref())
    }

    pub fn signature_fields(&self) -> SignatureFields {
        SignatureFields {
            ref_payco: self.x_ref_payco.clone(),
            transaction_id: self.x_transaction_id.clone(),
            amount: self.x_amount.clone(),
            currency_code: self.x_currency_code.clone(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Gateway-supplied half of the signed tuple. The merchant half
/// (`customer_id`, `private_key`) always comes from the acquirer record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureFields {
    pub ref_payco: Option<String>,
    pub transaction_id: Option<String>,
    pub amount: Option<String>,
    pub currency_code: Option<String>,
}

/// Buyer and order data needed to open the ePayco checkout widget
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutRequest {
    pub reference: String,
    pub amount: String,
    pub currency: Option<String>,
    pub partner_name: Option<String>,
    pub partner_email: Option<String>,
    pub partner_phone: Option<String>,
    pub partner_lang: Option<String>,
    pub partner_country: Option<String>,
    /// Public base URL of this service, used for callback URLs
    pub base_url: String,
}

/// Values handed to the ePayco checkout widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutPayload {
    pub public_key: String,
    pub txnid: String,
    pub amount: String,
    pub productinfo: String,
    pub firstname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub currency_code: String,
    pub country_code: String,
    pub epayco_checkout_external: String,
    pub epayco_env_test: String,
    pub epayco_lang: String,
    pub response_url: String,
    pub url_confirmation: String,
    pub extra1: String,
    pub extra2: String,
    pub extra3: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        // Rendered the way the gateway renders them when it signs
        Some(serde_json::Value::Bool(true)) => Some("True".to_string()),
        Some(serde_json::Value::Bool(false)) => Some("False".to_string()),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_status_mapping() {
        assert_eq!(
            TransactionState::from_gateway_status(Some("Aceptada")),
            TransactionState::Done
        );
        assert_eq!(
            TransactionState::from_gateway_status(Some("Pendiente")),
            TransactionState::Pending
        );
        for status in ["Rechazada", "Fallida", "aceptada", "ACEPTADA", "", " Aceptada"] {
            assert_eq!(
                TransactionState::from_gateway_status(Some(status)),
                TransactionState::Cancelled,
                "status {:?} must cancel",
                status
            );
        }
        assert_eq!(
            TransactionState::from_gateway_status(None),
            TransactionState::Cancelled
        );
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            TransactionState::Draft,
            TransactionState::Pending,
            TransactionState::Done,
            TransactionState::Cancelled,
            TransactionState::Error,
        ] {
            assert_eq!(state.as_str().parse::<TransactionState>(), Ok(state));
        }
        assert!("authorized".parse::<TransactionState>().is_err());
    }

    #[test]
    fn test_order_key() {
        assert_eq!(order_key("SO042-1"), "SO042");
        assert_eq!(order_key("SO042-1-2"), "SO042");
        assert_eq!(order_key("SO042"), "SO042");
    }

    #[test]
    fn test_notification_from_lookup_json_stringifies_numbers() {
        let data = serde_json::json!({
            "x_ref_payco": 8471264,
            "x_transaction_id": "T1",
            "x_amount": 100.5,
            "x_currency_code": "COP",
            "x_cust_id_cliente": 123,
            "x_extra4": "SO042-1",
            "x_signature": "abc",
            "x_transaction_state": "Aceptada",
            "x_test_request": true,
            "x_franchise": null
        });

        let notification: Notification = serde_json::from_value(data).unwrap();
        assert_eq!(notification.x_ref_payco.as_deref(), Some("8471264"));
        assert_eq!(notification.x_amount.as_deref(), Some("100.5"));
        assert_eq!(notification.x_cust_id_cliente.as_deref(), Some("123"));
        assert_eq!(notification.reference(), Some("SO042-1"));
        assert_eq!(notification.x_response_reason_text, None);
    }

    #[test]
    fn test_empty_reference_and_signature_are_absent() {
        let notification = Notification {
            x_extra4: Some(String::new()),
            x_signature: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(notification.reference(), None);
        assert_eq!(notification.signature(), None);
    }
}
