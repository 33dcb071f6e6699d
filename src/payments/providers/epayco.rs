//! ePayco payment provider implementation
//!
//! Two halves: the per-acquirer credentials record, which signs notifications
//! and builds the checkout widget payload, and the HTTP client used to look up
//! a gateway reference when the buyer is redirected back without a signed
//! payload.

use crate::error::{AppError, AppErrorKind, AppResult, ExternalError, InfrastructureError};
use crate::payments::signature::compute_signature;
use crate::payments::traits::{PaymentAcquirer, ReferenceLookup};
use crate::payments::types::{
    order_key, CheckoutPayload, CheckoutRequest, Notification, SignatureFields,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

pub const PROVIDER: &str = "epayco";
pub const CHECKOUT_PATH: &str = "/payment/epayco/checkout/";
pub const RESPONSE_PATH: &str = "/payment/epayco/response/";
pub const CONFIRMATION_PATH: &str = "/payment/epayco/confirmation/";

/// Which checkout widget variant is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckoutMode {
    /// Widget opens on top of the shop page
    #[default]
    #[serde(rename = "onpage")]
    OnePage,
    /// Buyer is sent to the ePayco hosted page
    #[serde(rename = "standard")]
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquirerEnvironment {
    #[default]
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "prod", alias = "production")]
    Production,
}

impl std::str::FromStr for AcquirerEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(AcquirerEnvironment::Test),
            "prod" | "production" => Ok(AcquirerEnvironment::Production),
            other => Err(format!("unknown acquirer environment '{}'", other)),
        }
    }
}

/// Provider-specific settings stored with the acquirer record
#[derive(Clone, Serialize, Deserialize)]
pub struct EpaycoSettings {
    #[serde(alias = "epayco_p_cust_id")]
    pub customer_id: String,
    #[serde(alias = "epayco_p_key")]
    pub private_key: String,
    #[serde(alias = "epayco_public_key")]
    pub public_key: String,
    #[serde(default, alias = "epayco_checkout_type")]
    pub checkout_mode: CheckoutMode,
}

/// ePayco credentials of one configured acquirer
#[derive(Clone, PartialEq)]
pub struct EpaycoAcquirer {
    pub id: uuid::Uuid,
    /// `P_CUST_ID_CLIENTE`
    pub customer_id: String,
    /// `P_KEY`, shared secret used in notification signatures
    pub private_key: String,
    /// Public key for the checkout widget
    pub public_key: String,
    pub checkout_mode: CheckoutMode,
    pub environment: AcquirerEnvironment,
}

impl EpaycoAcquirer {
    pub fn from_settings(
        id: uuid::Uuid,
        environment: AcquirerEnvironment,
        settings: EpaycoSettings,
    ) -> Self {
        Self {
            id,
            customer_id: settings.customer_id,
            private_key: settings.private_key,
            public_key: settings.public_key,
            checkout_mode: settings.checkout_mode,
            environment,
        }
    }
}

// Keeps the private key out of logs
impl fmt::Debug for EpaycoAcquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpaycoAcquirer")
            .field("id", &self.id)
            .field("customer_id", &self.customer_id)
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("checkout_mode", &self.checkout_mode)
            .field("environment", &self.environment)
            .finish()
    }
}

impl fmt::Debug for EpaycoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpaycoSettings")
            .field("customer_id", &self.customer_id)
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("checkout_mode", &self.checkout_mode)
            .finish()
    }
}

impl PaymentAcquirer for EpaycoAcquirer {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn generate_signature(&self, fields: &SignatureFields) -> String {
        compute_signature(self, fields)
    }

    fn build_checkout_payload(&self, request: &CheckoutRequest) -> CheckoutPayload {
        let base_url = request.base_url.trim_end_matches('/');
        let lang = match request.partner_lang.as_deref() {
            Some(lang) if lang.contains("es") => "es",
            _ => "en",
        };
        let external = match self.checkout_mode {
            CheckoutMode::OnePage => "false",
            CheckoutMode::Standard => "true",
        };
        let env_test = match self.environment {
            AcquirerEnvironment::Production => "false",
            AcquirerEnvironment::Test => "true",
        };

        CheckoutPayload {
            public_key: self.public_key.clone(),
            txnid: request.reference.clone(),
            amount: request.amount.clone(),
            productinfo: request.reference.clone(),
            firstname: request.partner_name.clone(),
            email: request.partner_email.clone(),
            phone: request.partner_phone.clone(),
            currency_code: request.currency.clone().unwrap_or_default(),
            country_code: request
                .partner_country
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
            epayco_checkout_external: external.to_string(),
            epayco_env_test: env_test.to_string(),
            epayco_lang: lang.to_string(),
            response_url: format!("{}{}", base_url, RESPONSE_PATH),
            url_confirmation: format!("{}{}", base_url, CONFIRMATION_PATH),
            extra1: order_key(&request.reference).to_string(),
            extra2: request.reference.clone(),
            extra3: request.reference.clone(),
        }
    }

    fn form_action_url(&self) -> &'static str {
        CHECKOUT_PATH
    }

    fn processing_info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("epayco_p_cust_id".to_string(), self.customer_id.clone());
        info
    }
}

/// ePayco API client configuration
#[derive(Debug, Clone)]
pub struct EpaycoConfig {
    /// ePayco API base URL (defaults to https://secure.epayco.co)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for failed lookups
    pub max_retries: u32,
}

impl Default for EpaycoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://secure.epayco.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Reference-lookup client for the ePayco validation API
pub struct EpaycoClient {
    config: EpaycoConfig,
    client: Client,
}

impl EpaycoClient {
    pub fn new(config: EpaycoConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| configuration_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// `{base}/validation/v1/reference/{ref_payco}`, with the reference
    /// encoded as a single path segment.
    pub fn reference_url(&self, ref_payco: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| configuration_error(format!("Invalid ePayco base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| configuration_error("ePayco base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["validation", "v1", "reference", ref_payco]);
        Ok(url)
    }

    async fn get_with_retries(&self, url: Url) -> AppResult<String> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let backoff = Duration::from_secs(2_u64.pow(attempt));

            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        return Ok(body);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt < self.config.max_retries {
                            warn!(
                                "ePayco rate limited, retrying after {:?} (attempt {})",
                                backoff,
                                attempt + 1
                            );
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        return Err(AppError::from(ExternalError::RateLimit {
                            service: "ePayco".to_string(),
                            retry_after: Some(60),
                        }));
                    }

                    if status.is_server_error() && attempt < self.config.max_retries {
                        warn!(
                            "ePayco server error {}, retrying after {:?} (attempt {})",
                            status,
                            backoff,
                            attempt + 1
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    let message = format!("HTTP {}: {}", status, body);
                    error!("ePayco reference lookup failed: {}", message);
                    return Err(provider_error(message, status.is_server_error()));
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        warn!(
                            "ePayco request error, retrying after {:?} (attempt {}): {}",
                            backoff,
                            attempt + 1,
                            e
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let message = format!(
            "Request failed after {} retries: {}",
            self.config.max_retries,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        );
        error!("ePayco reference lookup failed: {}", message);
        Err(provider_error(message, true))
    }
}

#[async_trait]
impl ReferenceLookup for EpaycoClient {
    async fn lookup_reference(&self, ref_payco: &str) -> AppResult<Notification> {
        info!("Looking up ePayco reference: ref_payco={}", ref_payco);

        let url = self.reference_url(ref_payco)?;
        let body = self.get_with_retries(url).await?;
        let notification = parse_lookup_body(&body)?;

        info!(
            "ePayco reference resolved: ref_payco={}, state={:?}",
            ref_payco, notification.x_transaction_state
        );
        Ok(notification)
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Extract the notification carried under `data` in a lookup response body.
pub fn parse_lookup_body(body: &str) -> AppResult<Notification> {
    let response: LookupResponse = serde_json::from_str(body)
        .map_err(|e| provider_error(format!("Invalid response format: {}", e), false))?;

    match response.data {
        Some(data @ serde_json::Value::Object(_)) => serde_json::from_value(data)
            .map_err(|e| provider_error(format!("Invalid response data: {}", e), false)),
        _ => Err(provider_error(
            "Response carries no data object".to_string(),
            false,
        )),
    }
}

fn provider_error(message: String, is_retryable: bool) -> AppError {
    AppError::from(ExternalError::PaymentProvider {
        provider: "ePayco".to_string(),
        message,
        is_retryable,
    })
}

fn configuration_error(message: String) -> AppError {
    AppError::new(AppErrorKind::Infrastructure(
        InfrastructureError::Configuration { message },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn acquirer(mode: CheckoutMode, environment: AcquirerEnvironment) -> EpaycoAcquirer {
        EpaycoAcquirer {
            id: Uuid::new_v4(),
            customer_id: "123".to_string(),
            private_key: "secret".to_string(),
            public_key: "pub_key".to_string(),
            checkout_mode: mode,
            environment,
        }
    }

    fn checkout_request() -> CheckoutRequest {
        CheckoutRequest {
            reference: "SO042-1".to_string(),
            amount: "119000.00".to_string(),
            currency: Some("COP".to_string()),
            partner_name: Some("Ana".to_string()),
            partner_email: Some("ana@example.com".to_string()),
            partner_phone: None,
            partner_lang: Some("es_CO".to_string()),
            partner_country: Some("CO".to_string()),
            base_url: "https://shop.example.com/".to_string(),
        }
    }

    #[test]
    fn test_checkout_payload_onepage_test_env() {
        let acquirer = acquirer(CheckoutMode::OnePage, AcquirerEnvironment::Test);
        let payload = acquirer.build_checkout_payload(&checkout_request());

        assert_eq!(payload.public_key, "pub_key");
        assert_eq!(payload.txnid, "SO042-1");
        assert_eq!(payload.productinfo, "SO042-1");
        assert_eq!(payload.currency_code, "COP");
        assert_eq!(payload.country_code, "co");
        assert_eq!(payload.epayco_checkout_external, "false");
        assert_eq!(payload.epayco_env_test, "true");
        assert_eq!(payload.epayco_lang, "es");
        assert_eq!(
            payload.response_url,
            "https://shop.example.com/payment/epayco/response/"
        );
        assert_eq!(
            payload.url_confirmation,
            "https://shop.example.com/payment/epayco/confirmation/"
        );
        assert_eq!(payload.extra1, "SO042");
        assert_eq!(payload.extra2, "SO042-1");
        assert_eq!(payload.extra3, "SO042-1");
    }

    #[test]
    fn test_checkout_payload_standard_production() {
        let acquirer = acquirer(CheckoutMode::Standard, AcquirerEnvironment::Production);
        let mut request = checkout_request();
        request.partner_lang = Some("en_US".to_string());
        request.currency = None;

        let payload = acquirer.build_checkout_payload(&request);
        assert_eq!(payload.epayco_checkout_external, "true");
        assert_eq!(payload.epayco_env_test, "false");
        assert_eq!(payload.epayco_lang, "en");
        assert_eq!(payload.currency_code, "");
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let acquirer = acquirer(CheckoutMode::OnePage, AcquirerEnvironment::Test);
        let rendered = format!("{:?}", acquirer);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_processing_info_exposes_customer_id_only() {
        let acquirer = acquirer(CheckoutMode::OnePage, AcquirerEnvironment::Test);
        let info = acquirer.processing_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info.get("epayco_p_cust_id").map(String::as_str), Some("123"));
        assert_eq!(acquirer.form_action_url(), "/payment/epayco/checkout/");
        assert_eq!(acquirer.provider(), "epayco");
    }

    #[test]
    fn test_settings_accept_legacy_field_names() {
        let settings: EpaycoSettings = serde_json::from_value(serde_json::json!({
            "epayco_p_cust_id": "123",
            "epayco_p_key": "secret",
            "epayco_public_key": "pub_key",
            "epayco_checkout_type": "standard"
        }))
        .unwrap();
        assert_eq!(settings.customer_id, "123");
        assert_eq!(settings.checkout_mode, CheckoutMode::Standard);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "prod".parse::<AcquirerEnvironment>(),
            Ok(AcquirerEnvironment::Production)
        );
        assert_eq!(
            "production".parse::<AcquirerEnvironment>(),
            Ok(AcquirerEnvironment::Production)
        );
        assert_eq!(
            "test".parse::<AcquirerEnvironment>(),
            Ok(AcquirerEnvironment::Test)
        );
        assert!("staging".parse::<AcquirerEnvironment>().is_err());
    }

    #[test]
    fn test_epayco_config_default() {
        let config = EpaycoConfig::default();
        assert_eq!(config.base_url, "https://secure.epayco.co");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_reference_url_encodes_segment() {
        let client = EpaycoClient::new(EpaycoConfig::default()).unwrap();
        assert_eq!(
            client.reference_url("8471264").unwrap().as_str(),
            "https://secure.epayco.co/validation/v1/reference/8471264"
        );
        assert_eq!(
            client.reference_url("../admin").unwrap().as_str(),
            "https://secure.epayco.co/validation/v1/reference/..%2Fadmin"
        );
    }

    #[test]
    fn test_parse_lookup_body() {
        let body = r#"{"success":true,"data":{"x_ref_payco":8471264,"x_extra4":"SO042-1","x_signature":"abc","x_transaction_state":"Aceptada"}}"#;
        let notification = parse_lookup_body(body).unwrap();
        assert_eq!(notification.x_ref_payco.as_deref(), Some("8471264"));
        assert_eq!(notification.reference(), Some("SO042-1"));
    }

    #[test]
    fn test_parse_lookup_body_without_data_fails() {
        let err = parse_lookup_body(r#"{"success":false,"text_response":"not found"}"#)
            .unwrap_err();
        assert_eq!(err.code(), "provider_error");
        assert!(parse_lookup_body("not json").is_err());
        assert!(parse_lookup_body(r#"{"data":"oops"}"#).is_err());
    }
}
