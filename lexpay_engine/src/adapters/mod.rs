//! # Provider adapters
//!
//! One adapter per payment provider. Each adapter takes the raw notification body and the
//! signature headers the server extracted, checks the provider's cryptographic scheme, and
//! normalizes the result into a [`VerifiedNotification`] or a typed [`VerificationFailure`].
//!
//! The set of providers is closed. Dispatch is a static `match` on [`PaymentProvider`] in the
//! [`AdapterRegistry`]; there is no runtime plugin mechanism.
mod alipay;
mod bank;
mod wechat;

pub use alipay::AlipayAdapter;
pub use bank::BankAdapter;
use thiserror::Error;
pub use wechat::WechatAdapter;

use crate::{
    db_types::{event_errors, OrderNo, PaymentProvider, PlatformCert},
    traits::VerifiedNotification,
};

/// The signature-bearing headers of an inbound notification, as extracted by the HTTP layer.
/// Not every provider uses every field.
#[derive(Debug, Clone, Default)]
pub struct CallbackHeaders {
    pub signature: Option<String>,
    pub serial_no: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
}

impl CallbackHeaders {
    pub fn with_signature(signature: impl Into<String>) -> Self {
        Self { signature: Some(signature.into()), ..Default::default() }
    }
}

/// How a notification failed verification. The kind drives both the audit annotation and the
/// ack-vs-retry decision, so adapters must be precise about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The signature does not check out against the credential on file.
    SignatureFailed,
    /// The payload envelope would not decrypt. Distinct from a bad signature because it points at
    /// key rotation rather than tampering.
    DecryptFailed,
    /// The body could not be parsed, or carried values no genuine notification would carry.
    Malformed,
}

impl FailureKind {
    /// The stable audit annotation for this kind.
    pub fn as_error_message(&self) -> &'static str {
        match self {
            Self::SignatureFailed => event_errors::SIGNATURE_FAILED,
            Self::DecryptFailed => event_errors::DECRYPT_FAILED,
            Self::Malformed => event_errors::MALFORMED,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{} ({reason})", kind.as_error_message())]
pub struct VerificationFailure {
    pub kind: FailureKind,
    pub reason: String,
    /// Best-effort attribution salvaged from the (untrusted) payload, so reconciliation can tie
    /// the failure back to an order. Never used for business decisions.
    pub order_no: Option<OrderNo>,
    pub trade_no: Option<String>,
}

impl VerificationFailure {
    pub fn signature(reason: impl Into<String>) -> Self {
        Self { kind: FailureKind::SignatureFailed, reason: reason.into(), order_no: None, trade_no: None }
    }

    pub fn decrypt(reason: impl Into<String>) -> Self {
        Self { kind: FailureKind::DecryptFailed, reason: reason.into(), order_no: None, trade_no: None }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self { kind: FailureKind::Malformed, reason: reason.into(), order_no: None, trade_no: None }
    }

    pub fn attributed_to(mut self, order_no: Option<OrderNo>, trade_no: Option<String>) -> Self {
        self.order_no = order_no;
        self.trade_no = trade_no;
        self
    }
}

/// The common adapter contract. `certs` is the active platform certificate set for the provider;
/// providers with fixed keys ignore it.
pub trait ProviderAdapter {
    fn provider(&self) -> PaymentProvider;

    fn verify(
        &self,
        raw: &str,
        headers: &CallbackHeaders,
        certs: &[PlatformCert],
    ) -> Result<VerifiedNotification, VerificationFailure>;
}

/// The static dispatch table. An adapter is present iff the provider's credentials were
/// configured; notifications for unconfigured providers fail verification rather than panic.
#[derive(Default)]
pub struct AdapterRegistry {
    wechat: Option<WechatAdapter>,
    alipay: Option<AlipayAdapter>,
    bank: Option<BankAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wechat(mut self, adapter: WechatAdapter) -> Self {
        self.wechat = Some(adapter);
        self
    }

    pub fn with_alipay(mut self, adapter: AlipayAdapter) -> Self {
        self.alipay = Some(adapter);
        self
    }

    pub fn with_bank(mut self, adapter: BankAdapter) -> Self {
        self.bank = Some(adapter);
        self
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        match provider {
            PaymentProvider::Wechat => self.wechat.is_some(),
            PaymentProvider::Alipay => self.alipay.is_some(),
            PaymentProvider::Bank => self.bank.is_some(),
        }
    }

    pub fn verify(
        &self,
        provider: PaymentProvider,
        raw: &str,
        headers: &CallbackHeaders,
        certs: &[PlatformCert],
    ) -> Result<VerifiedNotification, VerificationFailure> {
        let adapter: &dyn ProviderAdapter = match provider {
            PaymentProvider::Wechat => self.wechat.as_ref().map(|a| a as _),
            PaymentProvider::Alipay => self.alipay.as_ref().map(|a| a as _),
            PaymentProvider::Bank => self.bank.as_ref().map(|a| a as _),
        }
        .ok_or_else(|| VerificationFailure::signature(format!("no credentials configured for {provider}")))?;
        adapter.verify(raw, headers, certs)
    }
}
