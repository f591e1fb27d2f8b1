use crate::{
    db_types::{CallbackEvent, OrderNo, PaymentOrder},
    traits::{
        data_objects::{EventQueryFilter, Pagination},
        PaymentGatewayError,
    },
};

/// Read-only access to the callback audit trail, for the reconciliation service and the admin
/// listing endpoints. Implementations never take locks; a read racing an in-flight transition
/// sees either the pre- or post-transition state, both of which are real points in time.
#[allow(async_fn_in_trait)]
pub trait CallbackAudit: Clone {
    async fn fetch_event(&self, id: i64) -> Result<Option<CallbackEvent>, PaymentGatewayError>;

    /// The most recent `limit` events recorded against the order, newest first.
    async fn fetch_events_for_order(
        &self,
        order_no: &OrderNo,
        limit: u32,
    ) -> Result<Vec<CallbackEvent>, PaymentGatewayError>;

    /// Paginated audit search, newest first.
    async fn search_events(
        &self,
        filter: EventQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<CallbackEvent>, PaymentGatewayError>;

    async fn fetch_order_snapshot(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError>;
}
