use std::fmt::Display;

use chrono::{DateTime, Utc};
use lexpay_engine::{
    db_types::{OrderNo, PaymentProvider, PlatformCert},
    traits::{EventQueryFilter, Pagination, DEFAULT_PAGE_SIZE},
    RefreshPolicy,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Query string for the callback event listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventListQuery {
    pub provider: Option<PaymentProvider>,
    pub order_no: Option<String>,
    pub trade_no: Option<String>,
    pub verified: Option<bool>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl EventListQuery {
    pub fn filter(&self) -> EventQueryFilter {
        EventQueryFilter {
            provider: self.provider,
            order_no: self.order_no.clone().map(OrderNo::from),
            trade_no: self.trade_no.clone(),
            verified: self.verified,
        }
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page.unwrap_or(0), self.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderQuery {
    pub provider: PaymentProvider,
}

/// Body of `POST /admin/certs/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshCertsRequest {
    pub provider: PaymentProvider,
    pub policy: Option<RefreshPolicy>,
}

/// Body of `POST /admin/certs/import`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportCertRequest {
    pub provider: PaymentProvider,
    pub pem: String,
    pub serial_no: Option<String>,
    pub expire_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merge: bool,
}

/// What the cert listing endpoint exposes. Serials and expiry only; the PEM blocks are public
/// material but there is no operator use case for them over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertSummary {
    pub serial_no: String,
    pub expire_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&PlatformCert> for CertSummary {
    fn from(cert: &PlatformCert) -> Self {
        Self { serial_no: cert.serial_no.clone(), expire_time: cert.expire_time, created_at: cert.created_at }
    }
}

/// One row of the channel status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub provider: PaymentProvider,
    /// Whether verification credentials were configured for the provider.
    pub configured: bool,
    /// Stored platform cert count, for providers that verify against rotating certs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certs_stored: Option<i64>,
}
