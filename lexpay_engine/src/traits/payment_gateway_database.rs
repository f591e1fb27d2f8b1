use thiserror::Error;

use crate::{
    db_types::{CallbackEvent, NewCallbackEvent, NewPaymentOrder, OrderNo, PaymentOrder, PaymentProvider},
    traits::data_objects::{PaidTransition, VerifiedNotification},
};

/// The write-side backend contract for the callback ingestion pipeline and order state machine.
///
/// Implementations must guarantee:
/// * [`insert_callback_event`](Self::insert_callback_event) is a single atomic statement, so a
///   crash can never leave a half-written audit row.
/// * [`settle_order`](Self::settle_order) is a conditional update guarded on the current status
///   (`WHERE status = 'Pending'`), effective across all running instances, so two concurrent
///   verified notifications can never both apply a transition.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Insert a new order in `Pending` status. This is the order-issuing collaborator's
    /// interface; the pipeline itself never creates orders.
    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder, PaymentGatewayError>;

    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError>;

    /// Resolve an order from a provider-side transaction id. Checks `orders.trade_no` first
    /// (covers re-delivery after a paid transition), then falls back to the order number recorded
    /// on any earlier callback event that carried the same trade number.
    async fn fetch_order_by_trade_no(
        &self,
        provider: PaymentProvider,
        trade_no: &str,
    ) -> Result<Option<PaymentOrder>, PaymentGatewayError>;

    /// Persist the audit record for an inbound notification, before any verification runs.
    async fn insert_callback_event(&self, event: NewCallbackEvent) -> Result<CallbackEvent, PaymentGatewayError>;

    /// Record a successful verification on the event: canonical fields, paid flag and the
    /// idempotency key, clearing the placeholder error message.
    async fn record_event_verified(
        &self,
        event_id: i64,
        notification: &VerifiedNotification,
        idempotency_key: &str,
    ) -> Result<(), PaymentGatewayError>;

    /// Record a verification failure kind on the event, together with whatever order/trade
    /// attribution could be salvaged from the payload, so reconciliation can tie the failure back
    /// to an order.
    async fn record_event_failure(
        &self,
        event_id: i64,
        error_message: &str,
        order_no: Option<&OrderNo>,
        trade_no: Option<&str>,
    ) -> Result<(), PaymentGatewayError>;

    /// Record a later business annotation (duplicate, amount mismatch, orphan) on the event.
    async fn annotate_event(&self, event_id: i64, error_message: &str) -> Result<(), PaymentGatewayError>;

    /// Mark the event as the one that drove a state transition.
    async fn mark_event_applied(&self, event_id: i64) -> Result<(), PaymentGatewayError>;

    /// Whether a verified event with this idempotency key has already driven a state transition.
    async fn transition_applied_for_key(&self, idempotency_key: &str) -> Result<bool, PaymentGatewayError>;

    /// Attempt the guarded `Pending → Paid` (or `Pending → Failed` for `paid == false`)
    /// transition. `trade_no`, `payment_method` and `paid_at` are set in the same statement
    /// on success.
    async fn settle_order(
        &self,
        order_no: &OrderNo,
        notification: &VerifiedNotification,
    ) -> Result<PaidTransition, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists: {0}")]
    OrderAlreadyExists(OrderNo),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("The requested callback event (id {0}) does not exist")]
    EventNotFound(i64),
    #[error("{0} is not supported")]
    UnsupportedAction(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
