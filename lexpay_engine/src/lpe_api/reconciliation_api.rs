use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{event_errors, CallbackEvent, MaskedCallbackEvent, OrderNo, OrderStatusType, PaymentOrder},
    traits::{CallbackAudit, PaymentGatewayError},
};

/// How many masked events ride along as evidence in a reconciliation result.
pub const EVIDENCE_LIMIT: usize = 20;
/// How far back the diagnosis itself looks. Deliberately much larger than the evidence window.
const DIAGNOSIS_WINDOW: u32 = 500;

/// The diagnosis codes, in the exact precedence they are evaluated. Earlier codes outrank later
/// ones even when a later event looks healthy: a decrypt failure anywhere in the order's history
/// signals key-rotation risk regardless of eventual success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    NoCallback,
    DecryptFailed,
    SignatureFailed,
    AmountMismatch,
    PaidWithoutSuccessCallback,
    SuccessCallbackButOrderNotPaid,
    Ok,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub order_no: OrderNo,
    pub diagnosis: Diagnosis,
    pub order: Option<PaymentOrder>,
    /// The most recent events for the order, newest first, redacted for operator display.
    pub events: Vec<MaskedCallbackEvent>,
}

/// `ReconciliationApi` is the read-only diagnostic surface. Given an order number it aggregates
/// the order's callback history and current state into a single diagnosis code plus evidence.
/// It never writes; running it has no effect on the pipeline.
pub struct ReconciliationApi<B> {
    db: B,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReconciliationApi<B>
where B: CallbackAudit
{
    pub async fn reconcile(&self, order_no: &OrderNo) -> Result<ReconciliationResult, PaymentGatewayError> {
        let order = self.db.fetch_order_snapshot(order_no).await?;
        let events = self.db.fetch_events_for_order(order_no, DIAGNOSIS_WINDOW).await?;
        let diagnosis = diagnose(order.as_ref(), &events);
        debug!("🧾️ Reconciliation for order {order_no}: {diagnosis:?} over {} events", events.len());
        let evidence = events.iter().take(EVIDENCE_LIMIT).map(CallbackEvent::masked_view).collect();
        Ok(ReconciliationResult { order_no: order_no.clone(), diagnosis, order, events: evidence })
    }
}

fn has_error(events: &[CallbackEvent], message: &str) -> bool {
    events.iter().any(|e| e.error_message.as_deref() == Some(message))
}

fn diagnose(order: Option<&PaymentOrder>, events: &[CallbackEvent]) -> Diagnosis {
    let order_paid = order.map(|o| o.status == OrderStatusType::Paid).unwrap_or(false);
    let any_verified = events.iter().any(|e| e.verified);
    let success_callback = events.iter().any(|e| e.verified && e.paid == Some(true));

    if events.is_empty() {
        return Diagnosis::NoCallback;
    }
    if has_error(events, event_errors::DECRYPT_FAILED) {
        return Diagnosis::DecryptFailed;
    }
    if has_error(events, event_errors::SIGNATURE_FAILED) && !any_verified {
        return Diagnosis::SignatureFailed;
    }
    if let Some(order) = order {
        let mismatched = events.iter().any(|e| e.verified && e.amount.map(|a| a != order.amount).unwrap_or(false));
        if mismatched && !order_paid {
            return Diagnosis::AmountMismatch;
        }
    }
    if order_paid && !success_callback {
        return Diagnosis::PaidWithoutSuccessCallback;
    }
    if success_callback && !order_paid {
        return Diagnosis::SuccessCallbackButOrderNotPaid;
    }
    Diagnosis::Ok
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use lexpay_common::Money;

    use super::*;
    use crate::db_types::PaymentProvider;

    fn order(status: OrderStatusType) -> PaymentOrder {
        PaymentOrder {
            id: 1,
            order_no: OrderNo("ORD-1001".into()),
            amount: Money::from(5000),
            status,
            payment_method: None,
            trade_no: None,
            paid_at: None,
            related_id: None,
            related_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn event(verified: bool, paid: Option<bool>, amount: Option<i64>, error: Option<&str>) -> CallbackEvent {
        CallbackEvent {
            id: 1,
            provider: PaymentProvider::Wechat,
            order_no: Some(OrderNo("ORD-1001".into())),
            trade_no: None,
            amount: amount.map(Money::from),
            paid,
            verified,
            applied: false,
            idempotency_key: None,
            error_message: error.map(String::from),
            raw_payload: "{}".into(),
            masked_payload: "{}".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_events_means_no_callback() {
        assert_eq!(diagnose(Some(&order(OrderStatusType::Pending)), &[]), Diagnosis::NoCallback);
    }

    #[test]
    fn decrypt_failure_outranks_a_later_success() {
        let events = vec![
            event(true, Some(true), Some(5000), None),
            event(false, None, None, Some(event_errors::DECRYPT_FAILED)),
        ];
        assert_eq!(diagnose(Some(&order(OrderStatusType::Paid)), &events), Diagnosis::DecryptFailed);
    }

    #[test]
    fn signature_failure_only_counts_when_nothing_verified() {
        let failed = vec![event(false, None, None, Some(event_errors::SIGNATURE_FAILED))];
        assert_eq!(diagnose(Some(&order(OrderStatusType::Pending)), &failed), Diagnosis::SignatureFailed);

        let mixed = vec![
            event(false, None, None, Some(event_errors::SIGNATURE_FAILED)),
            event(true, Some(true), Some(5000), None),
        ];
        assert_ne!(diagnose(Some(&order(OrderStatusType::Paid)), &mixed), Diagnosis::SignatureFailed);
    }

    #[test]
    fn amount_mismatch_on_unpaid_order() {
        let events = vec![event(true, Some(true), Some(4999), Some(event_errors::AMOUNT_MISMATCH))];
        assert_eq!(diagnose(Some(&order(OrderStatusType::Pending)), &events), Diagnosis::AmountMismatch);
    }

    #[test]
    fn paid_order_without_success_callback_is_flagged() {
        let events = vec![event(false, None, None, Some(event_errors::MALFORMED))];
        assert_eq!(diagnose(Some(&order(OrderStatusType::Paid)), &events), Diagnosis::PaidWithoutSuccessCallback);
    }

    #[test]
    fn success_callback_with_stuck_order_is_flagged() {
        let events = vec![event(true, Some(true), Some(5000), None)];
        assert_eq!(
            diagnose(Some(&order(OrderStatusType::Pending)), &events),
            Diagnosis::SuccessCallbackButOrderNotPaid
        );
    }

    #[test]
    fn healthy_paid_order_is_ok() {
        let events = vec![event(true, Some(true), Some(5000), None)];
        assert_eq!(diagnose(Some(&order(OrderStatusType::Paid)), &events), Diagnosis::Ok);
    }
}
