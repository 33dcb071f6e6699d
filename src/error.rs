//! Application error taxonomy
//!
//! Validation failures are raised by the locator and reconciler and are never
//! retried. External failures come from the ePayco lookup API. Infrastructure
//! failures wrap the database and configuration layers.

use crate::database::error::DatabaseError;
use std::fmt;
use thiserror::Error;

/// Result type for application operations
pub type AppResult<T> = Result<T, AppError>;

/// Malformed or untrustworthy gateway data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("received data with missing {field}")]
    MissingField { field: String },

    #[error("received data for reference {reference}; no order found")]
    NotFound { reference: String },

    #[error("received data for reference {reference}; multiple orders found ({count})")]
    AmbiguousMatch { reference: String, count: usize },

    #[error("invalid signature for reference {reference}")]
    SignatureInvalid { reference: String },

    #[error("incorrect transaction data for reference {reference}: {}", format_invalid(.parameters))]
    InvalidParameters {
        reference: String,
        parameters: Vec<(String, String, String)>,
    },
}

fn format_invalid(parameters: &[(String, String, String)]) -> String {
    parameters
        .iter()
        .map(|(field, received, expected)| {
            format!("{}: received {} instead of {}", field, received, expected)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures talking to the payment provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    #[error("{service} rate limit exceeded")]
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
}

#[derive(Debug, Clone, Error)]
pub enum InfrastructureError {
    #[error("{0}")]
    Database(DatabaseError),

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Validation(ValidationError),
    External(ExternalError),
    Infrastructure(InfrastructureError),
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn validation(error: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(error))
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Stable machine-readable code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match &self.kind {
            AppErrorKind::Validation(ValidationError::MissingField { .. }) => "missing_field",
            AppErrorKind::Validation(ValidationError::NotFound { .. }) => "not_found",
            AppErrorKind::Validation(ValidationError::AmbiguousMatch { .. }) => "ambiguous_match",
            AppErrorKind::Validation(ValidationError::SignatureInvalid { .. }) => {
                "signature_invalid"
            }
            AppErrorKind::Validation(ValidationError::InvalidParameters { .. }) => {
                "invalid_parameters"
            }
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => "provider_error",
            AppErrorKind::External(ExternalError::RateLimit { .. }) => "rate_limited",
            AppErrorKind::Infrastructure(InfrastructureError::Database(_)) => "database_error",
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. }) => {
                "configuration_error"
            }
        }
    }

    pub fn as_validation(&self) -> Option<&ValidationError> {
        match &self.kind {
            AppErrorKind::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Validation(_) => false,
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::RateLimit { .. }) => true,
            AppErrorKind::Infrastructure(InfrastructureError::Database(e)) => e.is_retryable(),
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. }) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match &self.kind {
            AppErrorKind::Validation(e) => format!("Epayco: {}", e),
            AppErrorKind::External(e) => e.to_string(),
            AppErrorKind::Infrastructure(e) => e.to_string(),
        };

        if let Some(context) = &self.context {
            write!(f, "{} ({})", message, context)
        } else {
            write!(f, "{}", message)
        }
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(error: ValidationError) -> Self {
        Self::validation(error)
    }
}

impl From<ExternalError> for AppError {
    fn from(error: ExternalError) -> Self {
        Self::new(AppErrorKind::External(error))
    }
}

impl From<DatabaseError> for AppError {
    fn from(error: DatabaseError) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Database(
            error,
        )))
    }
}
