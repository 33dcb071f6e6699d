//! Payment provider trait definitions
//!
//! Provider-specific behavior is reached through these capabilities instead of
//! being bolted onto the transaction record.

use crate::error::AppResult;
use crate::payments::types::{CheckoutPayload, CheckoutRequest, Notification, SignatureFields};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Capabilities of a configured payment acquirer
pub trait PaymentAcquirer: Send + Sync {
    /// Provider code, e.g. `epayco`
    fn provider(&self) -> &'static str;

    /// Expected signature for a notification carrying `fields`
    fn generate_signature(&self, fields: &SignatureFields) -> String;

    /// Values the checkout widget needs to start a payment
    fn build_checkout_payload(&self, request: &CheckoutRequest) -> CheckoutPayload;

    /// Route the checkout form posts to
    fn form_action_url(&self) -> &'static str;

    /// Non-secret values exposed to the payment processing page
    fn processing_info(&self) -> BTreeMap<String, String>;
}

/// Out-of-band lookup of a gateway reference
///
/// Used when the buyer is redirected back with only `ref_payco`.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// Fetch the notification payload ePayco holds for `ref_payco`
    async fn lookup_reference(&self, ref_payco: &str) -> AppResult<Notification>;
}
