use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewPlatformCert, PlatformCert, PaymentProvider},
    traits::CertApiError,
};

/// Storage contract for provider-issued platform certificates.
///
/// Certificates are never deleted automatically except by explicit replacement; expired certs
/// remain available (late notifications may have been signed before expiry) until an operator
/// purges them.
#[allow(async_fn_in_trait)]
pub trait CertManagement: Clone {
    /// All stored certs for the provider, including expired ones still awaiting purge.
    async fn fetch_active_certs(&self, provider: PaymentProvider) -> Result<Vec<PlatformCert>, CertApiError>;

    async fn fetch_cert_by_serial(
        &self,
        provider: PaymentProvider,
        serial_no: &str,
    ) -> Result<Option<PlatformCert>, CertApiError>;

    /// Replace the provider's full cert set with the given one (last-writer-wins).
    async fn replace_certs(
        &self,
        provider: PaymentProvider,
        certs: &[NewPlatformCert],
    ) -> Result<usize, CertApiError>;

    /// Additively merge the given certs into the stored set, upserting on serial.
    async fn merge_certs(&self, provider: PaymentProvider, certs: &[NewPlatformCert]) -> Result<usize, CertApiError>;

    /// Delete certs whose expiry is known and earlier than the cutoff. Explicit operator action.
    async fn purge_expired_certs(&self, provider: PaymentProvider, cutoff: DateTime<Utc>) -> Result<u64, CertApiError>;

    async fn count_certs(&self, provider: PaymentProvider) -> Result<i64, CertApiError>;
}

/// An injected source of fresh certificate material, typically an authenticated HTTPS pull from
/// the provider. Implementations must bound the call with a network timeout and must not retry
/// internally; the refresh scheduler owns the retry cadence.
#[allow(async_fn_in_trait)]
pub trait CertSource {
    fn provider(&self) -> PaymentProvider;

    async fn fetch_certs(&self) -> Result<Vec<NewPlatformCert>, CertApiError>;
}
