use std::fmt::Debug;

use crate::{
    db_types::{CallbackEvent, MaskedCallbackEvent, OrderNo},
    traits::{CallbackAudit, EventQueryFilter, Pagination, PaymentGatewayError},
};

/// `AuditApi` is the read side of the callback audit trail. Listings only ever expose the masked
/// view; the raw payload is available solely through [`AuditApi::fetch_event_raw`], which the
/// server gates behind the forensic access key.
pub struct AuditApi<B> {
    db: B,
}

impl<B> Debug for AuditApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuditApi")
    }
}

impl<B> AuditApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AuditApi<B>
where B: CallbackAudit
{
    pub async fn fetch_event(&self, id: i64) -> Result<Option<MaskedCallbackEvent>, PaymentGatewayError> {
        Ok(self.db.fetch_event(id).await?.map(|e| e.masked_view()))
    }

    /// The full event including the unredacted payload, for forensic replay.
    pub async fn fetch_event_raw(&self, id: i64) -> Result<Option<CallbackEvent>, PaymentGatewayError> {
        self.db.fetch_event(id).await
    }

    pub async fn search_events(
        &self,
        filter: EventQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<MaskedCallbackEvent>, PaymentGatewayError> {
        let events = self.db.search_events(filter, pagination).await?;
        Ok(events.iter().map(CallbackEvent::masked_view).collect())
    }

    pub async fn events_for_order(
        &self,
        order_no: &OrderNo,
        limit: u32,
    ) -> Result<Vec<MaskedCallbackEvent>, PaymentGatewayError> {
        let events = self.db.fetch_events_for_order(order_no, limit).await?;
        Ok(events.iter().map(CallbackEvent::masked_view).collect())
    }
}
