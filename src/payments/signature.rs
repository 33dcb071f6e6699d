//! ePayco notification signature
//!
//! `sha256(p_cust_id ^ p_key ^ x_ref_payco ^ x_transaction_id ^ x_amount ^ x_currency_code)`
//! rendered as lowercase hex. ePayco hashes absent values as the literal
//! `None`, so they are reproduced byte-for-byte here.

use crate::payments::providers::epayco::EpaycoAcquirer;
use crate::payments::types::SignatureFields;
use sha2::{Digest, Sha256};

const SEPARATOR: &str = "^";
const ABSENT: &str = "None";

/// Compute the signature ePayco is expected to send for `fields`.
pub fn compute_signature(acquirer: &EpaycoAcquirer, fields: &SignatureFields) -> String {
    let parts = [
        Some(acquirer.customer_id.as_str()),
        Some(acquirer.private_key.as_str()),
        fields.ref_payco.as_deref(),
        fields.transaction_id.as_deref(),
        fields.amount.as_deref(),
        fields.currency_code.as_deref(),
    ];

    let message = parts
        .iter()
        .map(|part| part.unwrap_or(ABSENT))
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Exact comparison of two signatures in constant time.
pub fn signatures_match(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() {
        return false;
    }

    expected
        .as_bytes()
        .iter()
        .zip(provided.as_bytes().iter())
        .fold(0, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::epayco::{AcquirerEnvironment, CheckoutMode};
    use uuid::Uuid;

    fn acquirer() -> EpaycoAcquirer {
        EpaycoAcquirer {
            id: Uuid::new_v4(),
            customer_id: "123".to_string(),
            private_key: "secret".to_string(),
            public_key: "pub_key".to_string(),
            checkout_mode: CheckoutMode::OnePage,
            environment: AcquirerEnvironment::Test,
        }
    }

    fn fields() -> SignatureFields {
        SignatureFields {
            ref_payco: Some("R1".to_string()),
            transaction_id: Some("T1".to_string()),
            amount: Some("100.00".to_string()),
            currency_code: Some("COP".to_string()),
        }
    }

    #[test]
    fn test_known_vector() {
        // sha256("123^secret^R1^T1^100.00^COP")
        assert_eq!(
            compute_signature(&acquirer(), &fields()),
            "6387435cb586da10b6ce6e4403d832089b82d319368534d38a32ff6d3e75bd36"
        );
    }

    #[test]
    fn test_deterministic() {
        let acquirer = acquirer();
        let first = compute_signature(&acquirer, &fields());
        for _ in 0..10 {
            assert_eq!(compute_signature(&acquirer, &fields()), first);
        }
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_absent_field_hashes_as_none() {
        let mut fields = fields();
        fields.ref_payco = None;
        // sha256("123^secret^None^T1^100.00^COP")
        assert_eq!(
            compute_signature(&acquirer(), &fields),
            "ecc3612158b2ab6ecd4f9b5217312979cf79762d4ba38eabcdaefe6142fbbaef"
        );
    }

    #[test]
    fn test_amount_is_signed_verbatim() {
        let mut fields = fields();
        fields.amount = Some("100.0".to_string());
        assert_eq!(
            compute_signature(&acquirer(), &fields),
            "f8d91bd2a77464ef3863dfdae4694fe23b6af64ca3322684c9298cad402264fe"
        );
    }

    #[test]
    fn test_private_key_changes_signature() {
        let mut other = acquirer();
        other.private_key = "another".to_string();
        assert_ne!(
            compute_signature(&acquirer(), &fields()),
            compute_signature(&other, &fields())
        );
    }

    #[test]
    fn test_signatures_match() {
        assert!(signatures_match("abc", "abc"));
        assert!(!signatures_match("abc", "abd"));
        assert!(!signatures_match("abc", "abcd"));
        assert!(!signatures_match("abc", "ABC"));
    }
}
