//! ePayco HTTP endpoints
//!
//! - `/payment/epayco/checkout`: checkout view model for the widget
//! - `/payment/epayco/response/`: buyer redirect carrying only `ref_payco`
//! - `/payment/epayco/confirmation/`: signed server-to-server notification
//!
//! Both notification paths end in [`NotificationReconciler::process`].
//!
//! [`NotificationReconciler::process`]: crate::payments::reconciler::NotificationReconciler::process

use crate::api::AppState;
use crate::error::{AppResult, ValidationError};
use crate::payments::locator::resolve_reference;
use crate::payments::reconciler::NotificationSource;
use crate::payments::traits::PaymentAcquirer;
use crate::payments::types::{CheckoutPayload, CheckoutRequest, Notification};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Where the buyer goes when the gateway sends them back without a reference
pub const CHECKOUT_RETRY_PATH: &str = "/shop/payment";
/// Where the buyer goes once their payment has been reconciled
pub const PAYMENT_PROCESS_PATH: &str = "/payment/process";

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutForm {
    pub reference: Option<String>,
    pub partner_name: Option<String>,
    pub partner_email: Option<String>,
    pub partner_phone: Option<String>,
    pub partner_lang: Option<String>,
    pub partner_country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutView {
    #[serde(flatten)]
    pub payload: CheckoutPayload,
    pub amount_tax: String,
    pub amount_untaxed: String,
    pub form_action_url: String,
    pub processing_info: BTreeMap<String, String>,
}

pub async fn checkout(
    State(state): State<AppState>,
    Form(form): Form<CheckoutForm>,
) -> AppResult<Json<CheckoutView>> {
    let reference = form
        .reference
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ValidationError::MissingField {
            field: "reference".to_string(),
        })?;

    let located = resolve_reference(state.transactions.as_ref(), &reference).await?;
    let order_key = located.transaction.order_key().to_string();
    let totals = state
        .orders
        .find_order_totals(&order_key)
        .await?
        .ok_or(ValidationError::NotFound {
            reference: order_key,
        })?;

    let request = CheckoutRequest {
        reference: located.transaction.reference.clone(),
        amount: located.transaction.amount.clone(),
        currency: located.transaction.currency.clone(),
        partner_name: form.partner_name,
        partner_email: form.partner_email,
        partner_phone: form.partner_phone,
        partner_lang: form.partner_lang,
        partner_country: form.partner_country,
        base_url: state.base_url.clone(),
    };

    let acquirer = &located.acquirer;
    debug!("Rendering ePayco checkout for reference {}", reference);

    Ok(Json(CheckoutView {
        payload: acquirer.build_checkout_payload(&request),
        amount_tax: totals.amount_tax,
        amount_untaxed: totals.amount_untaxed,
        form_action_url: acquirer.form_action_url().to_string(),
        processing_info: acquirer.processing_info(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseParams {
    pub ref_payco: Option<String>,
}

/// Buyer redirect. The gateway only sends `ref_payco` here, so the signed
/// payload is fetched from the lookup API before reconciling.
pub async fn response(
    State(state): State<AppState>,
    Form(params): Form<ResponseParams>,
) -> AppResult<Redirect> {
    let Some(ref_payco) = params.ref_payco.filter(|r| !r.is_empty()) else {
        debug!("User error in ePayco checkout: missing ref_payco");
        return Ok(Redirect::to(CHECKOUT_RETRY_PATH));
    };

    let notification = state
        .lookup
        .lookup_reference(&ref_payco)
        .await
        .map_err(|e| e.with_context(format!("reference lookup for {}", ref_payco)))?;

    state
        .reconciler
        .process(NotificationSource::Response, notification)
        .await?;

    Ok(Redirect::to(PAYMENT_PROCESS_PATH))
}

/// Server-to-server confirmation from ePayco
pub async fn confirmation(
    State(state): State<AppState>,
    Form(notification): Form<Notification>,
) -> AppResult<StatusCode> {
    let reconciliation = state
        .reconciler
        .process(NotificationSource::Confirmation, notification)
        .await?;

    info!(
        "Epayco confirmation applied: reference={}, state={}",
        reconciliation.transaction.reference, reconciliation.transaction.state
    );
    Ok(StatusCode::OK)
}
