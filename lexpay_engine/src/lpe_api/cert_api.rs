use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::extract_verifying_key,
    db_types::{NewPlatformCert, PaymentProvider, PlatformCert},
    helpers::payload_digest,
    traits::{CertApiError, CertManagement, CertSource},
};

/// What a refresh does with the certificates it pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Replace the stored set wholesale. The normal mode: the provider's response is the full
    /// currently-valid set.
    Replace,
    /// Keep existing certs and upsert the pulled ones on top. Useful while a rotation is in
    /// flight and late notifications are still signed with the outgoing cert.
    Merge,
}

/// `CertApi` manages the platform certificate store for providers that verify against rotating
/// certificates. There is no hidden in-process cache; the stored set is the single source of
/// truth and every instance sees the same certificates.
pub struct CertApi<B> {
    db: B,
}

impl<B> Debug for CertApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CertApi")
    }
}

impl<B> CertApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CertApi<B>
where B: CertManagement
{
    pub async fn active_certs(&self, provider: PaymentProvider) -> Result<Vec<PlatformCert>, CertApiError> {
        self.db.fetch_active_certs(provider).await
    }

    pub async fn cert_count(&self, provider: PaymentProvider) -> Result<i64, CertApiError> {
        self.db.count_certs(provider).await
    }

    /// Pull the current certificate set from the injected source and store it per `policy`.
    /// Returns the number of certificates stored.
    pub async fn refresh<S: CertSource>(&self, source: &S, policy: RefreshPolicy) -> Result<usize, CertApiError> {
        let provider = source.provider();
        let certs = source.fetch_certs().await?;
        for cert in &certs {
            // Reject undecodable material before it can poison the store.
            extract_verifying_key(&cert.pem).map_err(|e| CertApiError::InvalidCertificate(e.to_string()))?;
        }
        let count = match policy {
            RefreshPolicy::Replace => self.db.replace_certs(provider, &certs).await?,
            RefreshPolicy::Merge => self.db.merge_certs(provider, &certs).await?,
        };
        info!("🔑️ Stored {count} certs for {provider} ({policy:?})");
        Ok(count)
    }

    /// Manually import one certificate. When the operator does not know the serial, a stable one
    /// is derived from a digest of the PEM, so a re-import of the same material upserts rather
    /// than duplicates.
    pub async fn import_cert(
        &self,
        provider: PaymentProvider,
        pem: &str,
        serial_no: Option<String>,
        expire_time: Option<DateTime<Utc>>,
        merge: bool,
    ) -> Result<usize, CertApiError> {
        extract_verifying_key(pem).map_err(|e| CertApiError::InvalidCertificate(e.to_string()))?;
        let serial_no = serial_no.unwrap_or_else(|| format!("digest:{}", payload_digest(pem.as_bytes())));
        let cert = NewPlatformCert { serial_no: serial_no.clone(), pem: pem.to_string(), expire_time };
        let count = if merge {
            self.db.merge_certs(provider, std::slice::from_ref(&cert)).await?
        } else {
            self.db.replace_certs(provider, std::slice::from_ref(&cert)).await?
        };
        info!("🔑️ Imported cert {serial_no} for {provider}");
        Ok(count)
    }

    /// Delete certs for the provider whose expiry has passed. Explicit operator action; the
    /// pipeline itself never deletes certificates.
    pub async fn purge_expired(&self, provider: PaymentProvider) -> Result<u64, CertApiError> {
        let purged = self.db.purge_expired_certs(provider, Utc::now()).await?;
        if purged > 0 {
            info!("🔑️ Purged {purged} expired certs for {provider}");
        }
        Ok(purged)
    }
}
