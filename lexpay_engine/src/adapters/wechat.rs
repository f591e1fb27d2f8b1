use lexpay_common::{Money, Secret};
use log::debug;
use serde::Deserialize;

use super::{CallbackHeaders, ProviderAdapter, VerificationFailure};
use crate::{
    crypto::{build_verify_message, decrypt_aes_256_gcm, extract_verifying_key, verify_rsa_sha256},
    db_types::{OrderNo, PaymentProvider, PlatformCert},
    traits::VerifiedNotification,
};

/// Notification envelope as it arrives on the wire. The interesting part is encrypted inside
/// `resource`.
#[derive(Debug, Deserialize)]
struct NotifyEnvelope {
    resource: NotifyResource,
}

#[derive(Debug, Deserialize)]
struct NotifyResource {
    ciphertext: String,
    nonce: String,
    #[serde(default)]
    associated_data: String,
}

/// The decrypted transaction resource.
#[derive(Debug, Deserialize)]
struct TransactionResource {
    out_trade_no: String,
    transaction_id: String,
    trade_state: String,
    amount: TransactionAmount,
}

#[derive(Debug, Deserialize)]
struct TransactionAmount {
    /// Minor currency units.
    total: i64,
}

/// WeChat-Pay-style adapter. Signatures rotate with platform certificates, selected per
/// notification by the serial the provider advertises in its headers; payload details ride inside
/// an AES-256-GCM envelope keyed by the merchant's APIv3 secret.
pub struct WechatAdapter {
    api_v3_key: Secret<String>,
}

impl WechatAdapter {
    pub fn new(api_v3_key: Secret<String>) -> Self {
        Self { api_v3_key }
    }
}

impl ProviderAdapter for WechatAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Wechat
    }

    fn verify(
        &self,
        raw: &str,
        headers: &CallbackHeaders,
        certs: &[PlatformCert],
    ) -> Result<VerifiedNotification, VerificationFailure> {
        let signature =
            headers.signature.as_deref().ok_or_else(|| VerificationFailure::signature("missing signature header"))?;
        let serial_no =
            headers.serial_no.as_deref().ok_or_else(|| VerificationFailure::signature("missing serial header"))?;
        let timestamp =
            headers.timestamp.as_deref().ok_or_else(|| VerificationFailure::signature("missing timestamp header"))?;
        let nonce = headers.nonce.as_deref().ok_or_else(|| VerificationFailure::signature("missing nonce header"))?;

        let cert = certs
            .iter()
            .find(|c| c.serial_no == serial_no)
            .ok_or_else(|| VerificationFailure::signature(format!("unknown platform certificate serial {serial_no}")))?;
        let key = extract_verifying_key(&cert.pem).map_err(|e| VerificationFailure::signature(e.to_string()))?;

        let message = build_verify_message(timestamp, nonce, raw);
        let valid = verify_rsa_sha256(&key, &message, signature)
            .map_err(|e| VerificationFailure::signature(e.to_string()))?;
        if !valid {
            return Err(VerificationFailure::signature("signature does not match body"));
        }

        let envelope: NotifyEnvelope =
            serde_json::from_str(raw).map_err(|e| VerificationFailure::malformed(format!("envelope: {e}")))?;
        let plaintext = decrypt_aes_256_gcm(
            self.api_v3_key.reveal(),
            &envelope.resource.nonce,
            &envelope.resource.associated_data,
            &envelope.resource.ciphertext,
        )
        .map_err(|e| VerificationFailure::decrypt(e.to_string()))?;
        let resource: TransactionResource = serde_json::from_str(&plaintext)
            .map_err(|e| VerificationFailure::malformed(format!("transaction resource: {e}")))?;
        if resource.amount.total < 0 {
            return Err(VerificationFailure::malformed(format!("negative amount: {}", resource.amount.total)));
        }

        let paid = resource.trade_state == "SUCCESS";
        debug!("🔐️ Verified notification for order {} ({})", resource.out_trade_no, resource.trade_state);
        Ok(VerifiedNotification {
            provider: PaymentProvider::Wechat,
            order_no: Some(OrderNo(resource.out_trade_no)),
            trade_no: Some(resource.transaction_id),
            amount: Money::from(resource.amount.total),
            paid,
            raw_payload: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use aes_gcm::{
        aead::{Aead, Payload},
        Aes256Gcm,
        KeyInit,
        Nonce,
    };
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use rsa::{
        pkcs1v15::SigningKey,
        pkcs8::{EncodePublicKey, LineEnding},
        sha2::Sha256,
        RsaPrivateKey,
        RsaPublicKey,
    };

    use super::*;
    use crate::{adapters::FailureKind, crypto::sign_rsa_sha256};

    const API_KEY: &str = "0123456789abcdef0123456789abcdef";
    const AEAD_NONCE: &str = "0123456789ab";

    struct Fixture {
        signing_key: SigningKey<Sha256>,
        cert: PlatformCert,
        adapter: WechatAdapter,
    }

    fn fixture() -> Fixture {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = RsaPublicKey::from(&private_key).to_public_key_pem(LineEnding::LF).unwrap();
        let cert = PlatformCert {
            id: 1,
            provider: PaymentProvider::Wechat,
            serial_no: "SERIAL_A".to_string(),
            pem,
            expire_time: None,
            created_at: chrono::Utc::now(),
        };
        Fixture {
            signing_key: SigningKey::<Sha256>::new(private_key),
            cert,
            adapter: WechatAdapter::new(Secret::new(API_KEY.to_string())),
        }
    }

    fn encrypt_resource(plaintext: &str) -> String {
        let cipher = Aes256Gcm::new_from_slice(API_KEY.as_bytes()).unwrap();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(AEAD_NONCE.as_bytes()), Payload {
                msg: plaintext.as_bytes(),
                aad: b"transaction",
            })
            .unwrap();
        BASE64.encode(ciphertext)
    }

    fn notification(f: &Fixture, plaintext: &str) -> (String, CallbackHeaders) {
        let body = serde_json::json!({
            "resource": {
                "ciphertext": encrypt_resource(plaintext),
                "nonce": AEAD_NONCE,
                "associated_data": "transaction",
            }
        })
        .to_string();
        let timestamp = "1554208460";
        let nonce = "header_nonce";
        let sig = sign_rsa_sha256(&f.signing_key, &build_verify_message(timestamp, nonce, &body));
        let headers = CallbackHeaders {
            signature: Some(sig),
            serial_no: Some("SERIAL_A".to_string()),
            timestamp: Some(timestamp.to_string()),
            nonce: Some(nonce.to_string()),
        };
        (body, headers)
    }

    const PLAINTEXT: &str = r#"{
        "out_trade_no": "ORD-1001",
        "transaction_id": "T1",
        "trade_state": "SUCCESS",
        "amount": {"total": 5000}
    }"#;

    #[test]
    fn valid_notification_verifies() {
        let f = fixture();
        let (body, headers) = notification(&f, PLAINTEXT);
        let n = f.adapter.verify(&body, &headers, std::slice::from_ref(&f.cert)).unwrap();
        assert_eq!(n.order_no.unwrap().as_str(), "ORD-1001");
        assert_eq!(n.trade_no.as_deref(), Some("T1"));
        assert_eq!(n.amount, Money::from(5000));
        assert!(n.paid);
    }

    #[test]
    fn tampered_body_is_a_signature_failure() {
        let f = fixture();
        let (body, headers) = notification(&f, PLAINTEXT);
        let tampered = body.replace("transaction", "transactiom");
        let err = f.adapter.verify(&tampered, &headers, std::slice::from_ref(&f.cert)).unwrap_err();
        assert_eq!(err.kind, FailureKind::SignatureFailed);
    }

    #[test]
    fn unknown_serial_is_a_signature_failure() {
        let f = fixture();
        let (body, mut headers) = notification(&f, PLAINTEXT);
        headers.serial_no = Some("SERIAL_B".to_string());
        let err = f.adapter.verify(&body, &headers, std::slice::from_ref(&f.cert)).unwrap_err();
        assert_eq!(err.kind, FailureKind::SignatureFailed);
    }

    #[test]
    fn wrong_aead_key_is_a_decrypt_failure() {
        let f = fixture();
        let (body, headers) = notification(&f, PLAINTEXT);
        let adapter = WechatAdapter::new(Secret::new("ffffffffffffffffffffffffffffffff".to_string()));
        let err = adapter.verify(&body, &headers, std::slice::from_ref(&f.cert)).unwrap_err();
        assert_eq!(err.kind, FailureKind::DecryptFailed);
    }

    #[test]
    fn unpaid_trade_state_is_verified_but_not_paid() {
        let f = fixture();
        let plaintext = PLAINTEXT.replace("SUCCESS", "PAYERROR");
        let (body, headers) = notification(&f, &plaintext);
        let n = f.adapter.verify(&body, &headers, std::slice::from_ref(&f.cert)).unwrap();
        assert!(!n.paid);
    }

    #[test]
    fn negative_amount_is_malformed() {
        let f = fixture();
        let plaintext = PLAINTEXT.replace("5000", "-5000");
        let (body, headers) = notification(&f, &plaintext);
        let err = f.adapter.verify(&body, &headers, std::slice::from_ref(&f.cert)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);
    }
}
