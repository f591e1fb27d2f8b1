//! Backend seams for the payment engine.
//!
//! Concrete storage backends (SQLite today) implement these traits; every public API in the
//! engine is generic over them, which is also what lets the server's endpoint tests run against
//! mocks instead of a live database.
mod callback_audit;
mod cert_management;
mod data_objects;
mod payment_gateway_database;

pub use callback_audit::CallbackAudit;
pub use cert_management::{CertManagement, CertSource};
pub use data_objects::{EventQueryFilter, Pagination, PaidTransition, VerifiedNotification, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CertApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Could not pull certificates from the provider. {0}")]
    SourceError(String),
    #[error("Invalid certificate material. {0}")]
    InvalidCertificate(String),
}

impl From<sqlx::Error> for CertApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
