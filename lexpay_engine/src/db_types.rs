use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use lexpay_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// Stable `error_message` annotations written onto callback events by the ingestion pipeline.
/// The reconciliation service matches on these, so they are part of the audit contract.
pub mod event_errors {
    pub const PROCESSING: &str = "processing";
    pub const SIGNATURE_FAILED: &str = "signature_failed";
    pub const DECRYPT_FAILED: &str = "decrypt_failed";
    pub const MALFORMED: &str = "malformed";
    pub const AMOUNT_MISMATCH: &str = "amount_mismatch";
    pub const ORPHANED_ORDER: &str = "orphaned_order";
    pub const DUPLICATE: &str = "duplicate";
    pub const NOT_PAYABLE: &str = "order_not_payable";
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------  PaymentProvider  -----------------------------------------------------------
/// The closed set of payment providers the gateway speaks to. Dispatch is always a static `match`
/// on this enum; adding a provider means adding a variant and an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Wechat,
    Alipay,
    Bank,
}

impl PaymentProvider {
    pub const ALL: [PaymentProvider; 3] = [Self::Wechat, Self::Alipay, Self::Bank];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wechat => "wechat",
            Self::Alipay => "alipay",
            Self::Bank => "bank",
        }
    }

    /// Whether notification signatures are checked against rotating platform certificates
    /// (as opposed to a fixed configured key).
    pub fn uses_platform_certs(&self) -> bool {
        matches!(self, Self::Wechat)
    }
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wechat" => Ok(Self::Wechat),
            "alipay" => Ok(Self::Alipay),
            "bank" => Ok(Self::Bank),
            other => Err(ConversionError(format!("Unknown payment provider: {other}"))),
        }
    }
}

//--------------------------------------  OrderStatusType  -----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order exists but has not been offered for payment yet.
    Created,
    /// The order is awaiting a payment notification.
    Pending,
    /// A verified notification has marked the order paid. Terminal, modulo refund.
    Paid,
    /// The provider reported a definitive non-success outcome. Terminal.
    Failed,
    /// The order was cancelled by the user or an admin. Terminal.
    Cancelled,
    /// A refund was issued against a paid order by an authorized external action. Terminal.
    Refunded,
}

impl OrderStatusType {
    /// Whether the state machine may still move this order on a payment notification.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------      OrderNo      -----------------------------------------------------------
/// The merchant-side order number. Distinct from the provider-assigned `trade_no`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNo(pub String);

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNo {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------    PaymentOrder   -----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentOrder {
    pub id: i64,
    pub order_no: OrderNo,
    pub amount: Money,
    pub status: OrderStatusType,
    pub payment_method: Option<PaymentProvider>,
    pub trade_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub related_id: Option<String>,
    pub related_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new order, as submitted by the order-issuing collaborator. Orders enter the engine in
/// `Pending` status; everything after that is the state machine's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentOrder {
    pub order_no: OrderNo,
    pub amount: Money,
    /// Opaque link to the business entity being paid for (consultation, document bundle, etc.)
    pub related_id: Option<String>,
    pub related_type: Option<String>,
}

impl NewPaymentOrder {
    pub fn new(order_no: OrderNo, amount: Money) -> Self {
        Self { order_no, amount, related_id: None, related_type: None }
    }
}

//--------------------------------------   CallbackEvent   -----------------------------------------------------------
/// One inbound provider notification, recorded before any business logic runs. Append-only:
/// a row is annotated during its own ingestion pass and never touched again.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CallbackEvent {
    pub id: i64,
    pub provider: PaymentProvider,
    pub order_no: Option<OrderNo>,
    pub trade_no: Option<String>,
    pub amount: Option<Money>,
    pub paid: Option<bool>,
    pub verified: bool,
    /// True iff this event drove an order state transition.
    pub applied: bool,
    pub idempotency_key: Option<String>,
    pub error_message: Option<String>,
    pub raw_payload: String,
    pub masked_payload: String,
    pub created_at: DateTime<Utc>,
}

impl CallbackEvent {
    pub fn masked_view(&self) -> MaskedCallbackEvent {
        MaskedCallbackEvent {
            id: self.id,
            provider: self.provider,
            order_no: self.order_no.clone(),
            trade_no: self.trade_no.clone(),
            amount: self.amount,
            paid: self.paid,
            verified: self.verified,
            applied: self.applied,
            error_message: self.error_message.clone(),
            masked_payload: self.masked_payload.clone(),
            created_at: self.created_at,
        }
    }
}

/// The operator-facing view of a callback event. Carries the redacted payload only; the raw
/// payload stays behind the forensic access gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskedCallbackEvent {
    pub id: i64,
    pub provider: PaymentProvider,
    pub order_no: Option<OrderNo>,
    pub trade_no: Option<String>,
    pub amount: Option<Money>,
    pub paid: Option<bool>,
    pub verified: bool,
    pub applied: bool,
    pub error_message: Option<String>,
    pub masked_payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCallbackEvent {
    pub provider: PaymentProvider,
    pub raw_payload: String,
    pub masked_payload: String,
}

//--------------------------------------    PlatformCert   -----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlatformCert {
    pub id: i64,
    pub provider: PaymentProvider,
    pub serial_no: String,
    pub pem: String,
    pub expire_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlatformCert {
    pub serial_no: String,
    pub pem: String,
    pub expire_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn provider_round_trip() {
        for p in PaymentProvider::ALL {
            assert_eq!(p.as_str().parse::<PaymentProvider>().unwrap(), p);
        }
        assert!("paypal".parse::<PaymentProvider>().is_err());
    }

    #[test]
    fn only_pending_is_payable() {
        assert!(OrderStatusType::Pending.is_payable());
        for s in [
            OrderStatusType::Created,
            OrderStatusType::Paid,
            OrderStatusType::Failed,
            OrderStatusType::Cancelled,
            OrderStatusType::Refunded,
        ] {
            assert!(!s.is_payable());
        }
    }

    #[test]
    fn status_round_trip() {
        for s in ["Created", "Pending", "Paid", "Failed", "Cancelled", "Refunded"] {
            assert_eq!(s.parse::<OrderStatusType>().unwrap().to_string(), s);
        }
    }
}
