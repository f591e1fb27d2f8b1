use std::collections::BTreeMap;

use lexpay_common::Money;
use log::debug;
use rsa::{pkcs1v15::VerifyingKey, sha2::Sha256};

use super::{CallbackHeaders, ProviderAdapter, VerificationFailure};
use crate::{
    crypto::{extract_verifying_key, verify_rsa_sha256, CryptoError},
    db_types::{OrderNo, PaymentProvider, PlatformCert},
    traits::VerifiedNotification,
};

/// Alipay-style adapter. The body is a form-encoded parameter set carrying its own `sign` field:
/// a base64 RSA-SHA256 signature over the canonical string of the remaining parameters, sorted by
/// key, checked against one fixed provider public key.
pub struct AlipayAdapter {
    public_key: VerifyingKey<Sha256>,
}

impl AlipayAdapter {
    /// Builds the adapter from the provider's public key PEM.
    pub fn new(public_key_pem: &str) -> Result<Self, CryptoError> {
        Ok(Self { public_key: extract_verifying_key(public_key_pem)? })
    }
}

/// The `k=v&...` string the provider signed: all parameters except `sign` and `sign_type`,
/// empty values dropped, sorted by key.
fn canonical_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && k.as_str() != "sign_type" && !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

impl ProviderAdapter for AlipayAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Alipay
    }

    fn verify(
        &self,
        raw: &str,
        _headers: &CallbackHeaders,
        _certs: &[PlatformCert],
    ) -> Result<VerifiedNotification, VerificationFailure> {
        let params: BTreeMap<String, String> =
            serde_urlencoded::from_str(raw).map_err(|e| VerificationFailure::malformed(format!("form body: {e}")))?;
        let sign = params.get("sign").ok_or_else(|| VerificationFailure::signature("missing sign parameter"))?;

        // Attribution for failed notifications comes from the (unverified) parameters. Good
        // enough to point an operator at the right order, never trusted beyond that.
        let claimed_order = params.get("out_trade_no").map(|o| OrderNo(o.clone()));
        let claimed_trade = params.get("trade_no").cloned();

        let message = canonical_string(&params);
        let valid = verify_rsa_sha256(&self.public_key, &message, sign)
            .map_err(|e| VerificationFailure::signature(e.to_string()).attributed_to(claimed_order.clone(), claimed_trade.clone()))?;
        if !valid {
            return Err(VerificationFailure::signature("signature does not match parameters")
                .attributed_to(claimed_order, claimed_trade));
        }

        let out_trade_no =
            params.get("out_trade_no").ok_or_else(|| VerificationFailure::malformed("missing out_trade_no"))?;
        let amount: Money = params
            .get("total_amount")
            .ok_or_else(|| VerificationFailure::malformed("missing total_amount"))?
            .parse()
            .map_err(|e| VerificationFailure::malformed(format!("total_amount: {e}")))?;
        if amount.is_negative() {
            return Err(VerificationFailure::malformed(format!("negative amount: {amount}")));
        }
        let trade_status =
            params.get("trade_status").ok_or_else(|| VerificationFailure::malformed("missing trade_status"))?;
        let paid = match trade_status.as_str() {
            "TRADE_SUCCESS" | "TRADE_FINISHED" => true,
            "TRADE_CLOSED" => false,
            // Non-final statuses carry no outcome; record them without touching any order.
            other => return Err(VerificationFailure::malformed(format!("non-final trade status: {other}"))),
        };

        debug!("🔐️ Verified notification for order {out_trade_no} ({trade_status})");
        Ok(VerifiedNotification {
            provider: PaymentProvider::Alipay,
            order_no: Some(OrderNo(out_trade_no.clone())),
            trade_no: params.get("trade_no").cloned(),
            amount,
            paid,
            raw_payload: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use rsa::{
        pkcs1v15::SigningKey,
        pkcs8::{EncodePublicKey, LineEnding},
        RsaPrivateKey,
        RsaPublicKey,
    };

    use super::*;
    use crate::{adapters::FailureKind, crypto::sign_rsa_sha256};

    struct Fixture {
        signing_key: SigningKey<Sha256>,
        adapter: AlipayAdapter,
    }

    fn fixture() -> Fixture {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = RsaPublicKey::from(&private_key).to_public_key_pem(LineEnding::LF).unwrap();
        Fixture { signing_key: SigningKey::<Sha256>::new(private_key), adapter: AlipayAdapter::new(&pem).unwrap() }
    }

    fn signed_body(f: &Fixture, params: &[(&str, &str)]) -> String {
        let map: BTreeMap<String, String> =
            params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let sign = sign_rsa_sha256(&f.signing_key, &canonical_string(&map));
        let mut all: Vec<(String, String)> = map.into_iter().collect();
        all.push(("sign".to_string(), sign));
        all.push(("sign_type".to_string(), "RSA2".to_string()));
        serde_urlencoded::to_string(all).unwrap()
    }

    const PARAMS: &[(&str, &str)] = &[
        ("out_trade_no", "ORD-1001"),
        ("trade_no", "T1"),
        ("total_amount", "50.00"),
        ("trade_status", "TRADE_SUCCESS"),
        ("buyer_id", "2088000000000001"),
    ];

    #[test]
    fn valid_notification_verifies() {
        let f = fixture();
        let body = signed_body(&f, PARAMS);
        let n = f.adapter.verify(&body, &CallbackHeaders::default(), &[]).unwrap();
        assert_eq!(n.order_no.unwrap().as_str(), "ORD-1001");
        assert_eq!(n.trade_no.as_deref(), Some("T1"));
        assert_eq!(n.amount, Money::from(5000));
        assert!(n.paid);
    }

    #[test]
    fn tampered_amount_is_a_signature_failure() {
        let f = fixture();
        let body = signed_body(&f, PARAMS).replace("50.00", "49.99");
        let err = f.adapter.verify(&body, &CallbackHeaders::default(), &[]).unwrap_err();
        assert_eq!(err.kind, FailureKind::SignatureFailed);
    }

    #[test]
    fn closed_trade_is_verified_but_not_paid() {
        let f = fixture();
        let params: Vec<(&str, &str)> =
            PARAMS.iter().map(|&(k, v)| (k, if k == "trade_status" { "TRADE_CLOSED" } else { v })).collect();
        let body = signed_body(&f, &params);
        let n = f.adapter.verify(&body, &CallbackHeaders::default(), &[]).unwrap();
        assert!(!n.paid);
    }

    #[test]
    fn non_final_status_is_malformed() {
        let f = fixture();
        let params: Vec<(&str, &str)> =
            PARAMS.iter().map(|&(k, v)| (k, if k == "trade_status" { "WAIT_BUYER_PAY" } else { v })).collect();
        let body = signed_body(&f, &params);
        let err = f.adapter.verify(&body, &CallbackHeaders::default(), &[]).unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);
    }

    #[test]
    fn missing_sign_is_a_signature_failure() {
        let f = fixture();
        let body = "out_trade_no=ORD-1001&total_amount=50.00&trade_status=TRADE_SUCCESS";
        let err = f.adapter.verify(body, &CallbackHeaders::default(), &[]).unwrap_err();
        assert_eq!(err.kind, FailureKind::SignatureFailed);
    }
}
