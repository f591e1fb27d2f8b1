//! Authenticated certificate download from the WeChat merchant API.
//!
//! `GET /v3/certificates` with a signed `Authorization` header returns the currently valid
//! platform certificate set, each entry AEAD-encrypted under the merchant's APIv3 key.
use std::time::Duration;

use chrono::{DateTime, Utc};
use lexpay_common::Secret;
use lexpay_engine::{
    crypto::{build_authorization_header, build_sign_message, decrypt_aes_256_gcm, sign_rsa_sha256},
    db_types::{NewPlatformCert, PaymentProvider},
    traits::{CertApiError, CertSource},
};
use log::*;
use rand::{distributions::Alphanumeric, Rng};
use rsa::{pkcs1v15::SigningKey, pkcs8::DecodePrivateKey, sha2::Sha256, RsaPrivateKey};
use serde::Deserialize;

use crate::{config::WechatConfig, errors::ServerError};

const CERTIFICATES_PATH: &str = "/v3/certificates";
/// One bounded attempt per call. The refresh scheduler owns the retry cadence.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WechatCertSource {
    client: reqwest::Client,
    base_url: String,
    mch_id: String,
    mch_serial_no: String,
    signing_key: SigningKey<Sha256>,
    api_v3_key: Secret<String>,
}

impl WechatCertSource {
    pub fn new(config: &WechatConfig) -> Result<Self, ServerError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(config.private_key_pem.reveal())
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid merchant private key: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            mch_id: config.mch_id.clone(),
            mch_serial_no: config.mch_serial_no.clone(),
            signing_key: SigningKey::new(private_key),
            api_v3_key: config.api_v3_key.clone(),
        })
    }

    fn authorization(&self, method: &str, path: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
        let message = build_sign_message(method, path, timestamp, &nonce, "");
        let signature = sign_rsa_sha256(&self.signing_key, &message);
        build_authorization_header(&self.mch_id, &self.mch_serial_no, timestamp, &nonce, &signature)
    }
}

#[derive(Debug, Deserialize)]
struct CertificatesResponse {
    data: Vec<CertEntry>,
}

#[derive(Debug, Deserialize)]
struct CertEntry {
    serial_no: String,
    expire_time: Option<String>,
    encrypt_certificate: EncryptedCert,
}

#[derive(Debug, Deserialize)]
struct EncryptedCert {
    #[serde(default)]
    associated_data: String,
    nonce: String,
    ciphertext: String,
}

impl CertSource for WechatCertSource {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Wechat
    }

    async fn fetch_certs(&self) -> Result<Vec<NewPlatformCert>, CertApiError> {
        let url = format!("{}{CERTIFICATES_PATH}", self.base_url);
        debug!("🔑️ Pulling platform certificates from {url}");
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.authorization("GET", CERTIFICATES_PATH))
            .header("Accept", "application/json")
            .header("User-Agent", "lexpay-server")
            .send()
            .await
            .map_err(|e| CertApiError::SourceError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CertApiError::SourceError(format!("Certificate download returned {}", response.status())));
        }
        let body: CertificatesResponse =
            response.json().await.map_err(|e| CertApiError::SourceError(e.to_string()))?;
        debug!("🔑️ Received {} certificate entries", body.data.len());
        body.data
            .into_iter()
            .map(|entry| {
                let enc = &entry.encrypt_certificate;
                let pem = decrypt_aes_256_gcm(self.api_v3_key.reveal(), &enc.nonce, &enc.associated_data, &enc.ciphertext)
                    .map_err(|e| {
                        CertApiError::InvalidCertificate(format!("Could not decrypt cert {}: {e}", entry.serial_no))
                    })?;
                let expire_time = entry.expire_time.as_deref().and_then(parse_timestamp);
                Ok(NewPlatformCert { serial_no: entry.serial_no, pem, expire_time })
            })
            .collect()
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}
