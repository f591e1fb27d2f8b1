//! Cryptographic primitives shared by the provider adapters and the certificate refresh path.
//!
//! Everything here is pure CPU with a bounded budget. No I/O, no retries.
use aes_gcm::{
    aead::{Aead, Payload},
    Aes256Gcm,
    KeyInit,
    Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::{
    pkcs1::DecodeRsaPublicKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::DecodePublicKey,
    sha2::Sha256,
    signature::{RandomizedSigner, SignatureEncoding, Verifier},
    RsaPublicKey,
};
use thiserror::Error;
use x509_cert::der::DecodePem;

#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    #[error("Signature verification error: {0}")]
    Verify(String),
    #[error("Decryption error: {0}")]
    Decrypt(String),
    #[error("Certificate error: {0}")]
    Cert(String),
}

/// The notification verification message: `"{timestamp}\n{nonce}\n{body}\n"`.
pub fn build_verify_message(timestamp: &str, nonce: &str, body: &str) -> String {
    format!("{timestamp}\n{nonce}\n{body}\n")
}

/// The outbound request signing message: `"{method}\n{url_path}\n{timestamp}\n{nonce}\n{body}\n"`.
pub fn build_sign_message(method: &str, url_path: &str, timestamp: i64, nonce: &str, body: &str) -> String {
    format!("{method}\n{url_path}\n{timestamp}\n{nonce}\n{body}\n")
}

/// Checks a base64 SHA256-with-RSA (PKCS#1 v1.5) signature over `message`.
///
/// An undecodable signature is an error; a well-formed signature that does not match is `Ok(false)`.
pub fn verify_rsa_sha256(key: &VerifyingKey<Sha256>, message: &str, signature_base64: &str) -> Result<bool, CryptoError> {
    let sig_bytes = BASE64.decode(signature_base64).map_err(|e| CryptoError::Verify(format!("base64 decode: {e}")))?;
    let signature =
        Signature::try_from(sig_bytes.as_slice()).map_err(|e| CryptoError::Verify(format!("invalid signature: {e}")))?;
    Ok(key.verify(message.as_bytes(), &signature).is_ok())
}

/// Signs `message` with SHA256-with-RSA and returns the base64 signature.
pub fn sign_rsa_sha256(key: &SigningKey<Sha256>, message: &str) -> String {
    let mut rng = rand::thread_rng();
    let signature = key.sign_with_rng(&mut rng, message.as_bytes());
    BASE64.encode(signature.to_bytes())
}

/// The `Authorization` header for signed outbound calls to a cert-based provider.
pub fn build_authorization_header(
    mch_id: &str,
    serial_no: &str,
    timestamp: i64,
    nonce: &str,
    signature: &str,
) -> String {
    format!(
        r#"WECHATPAY2-SHA256-RSA2048 mchid="{mch_id}",nonce_str="{nonce}",timestamp="{timestamp}",serial_no="{serial_no}",signature="{signature}""#
    )
}

/// AES-256-GCM decryption of a provider resource envelope.
///
/// The key is the provider's 32-byte APIv3 secret used directly as key material; the nonce is the
/// 12-byte string from the envelope; `associated_data` is authenticated but not encrypted.
pub fn decrypt_aes_256_gcm(
    key: &str,
    nonce: &str,
    associated_data: &str,
    ciphertext_base64: &str,
) -> Result<String, CryptoError> {
    let key_bytes = key.as_bytes();
    if key_bytes.len() != 32 {
        return Err(CryptoError::Decrypt(format!("key must be 32 bytes, got {}", key_bytes.len())));
    }
    let nonce_bytes = nonce.as_bytes();
    if nonce_bytes.len() != 12 {
        return Err(CryptoError::Decrypt(format!("nonce must be 12 bytes, got {}", nonce_bytes.len())));
    }
    let ciphertext = BASE64.decode(ciphertext_base64).map_err(|e| CryptoError::Decrypt(format!("base64 decode: {e}")))?;
    let cipher = Aes256Gcm::new_from_slice(key_bytes).map_err(|e| CryptoError::Decrypt(format!("create cipher: {e}")))?;
    let gcm_nonce = Nonce::from_slice(nonce_bytes);
    let payload = Payload { msg: &ciphertext, aad: associated_data.as_bytes() };
    let plaintext = cipher.decrypt(gcm_nonce, payload).map_err(|e| CryptoError::Decrypt(format!("decrypt: {e}")))?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Decrypt(format!("utf8 decode: {e}")))
}

/// Extracts an RSA verifying key from stored PEM material.
///
/// Accepts a full X.509 certificate (the form providers deliver) or a bare SPKI public key block
/// (the form operators tend to have at hand for manual imports).
pub fn extract_verifying_key(pem: &str) -> Result<VerifyingKey<Sha256>, CryptoError> {
    let public_key = if pem.contains("BEGIN CERTIFICATE") {
        let cert = x509_cert::Certificate::from_pem(pem)
            .map_err(|e| CryptoError::Cert(format!("parse X.509 certificate: {e}")))?;
        let spki_der = cert.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes();
        RsaPublicKey::from_pkcs1_der(spki_der).map_err(|e| CryptoError::Cert(format!("parse RSA public key: {e}")))?
    } else {
        RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::Cert(format!("parse public key: {e}")))?
    };
    Ok(VerifyingKey::<Sha256>::new(public_key))
}
