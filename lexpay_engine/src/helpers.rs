//! Small helpers shared across the engine.
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use blake2::{digest::consts::U16, Blake2b, Digest};

use crate::{db_types::PaymentProvider, traits::VerifiedNotification};

type Blake2b128 = Blake2b<U16>;

/// A short, url-safe digest of arbitrary bytes. Used wherever a payload needs a stable fingerprint
/// rather than its full content.
pub fn payload_digest(data: &[u8]) -> String {
    let mut hasher = Blake2b128::new();
    hasher.update(data);
    let hash = hasher.finalize();
    STANDARD_NO_PAD.encode(hash)
}

/// The idempotency key for a verified notification.
///
/// The provider transaction id is globally unique on the provider side, so `provider:trade_no`
/// identifies one logical notification across any number of redeliveries. Notifications without a
/// transaction id fall back to the order number plus a digest of the payload body, which still
/// collapses byte-identical redeliveries.
pub fn idempotency_key(provider: PaymentProvider, notification: &VerifiedNotification) -> String {
    match (&notification.trade_no, &notification.order_no) {
        (Some(trade_no), _) => format!("{provider}:{trade_no}"),
        (None, Some(order_no)) => {
            format!("{provider}:{}:{}", order_no.as_str(), payload_digest(notification.raw_payload.as_bytes()))
        },
        (None, None) => format!("{provider}:-:{}", payload_digest(notification.raw_payload.as_bytes())),
    }
}
