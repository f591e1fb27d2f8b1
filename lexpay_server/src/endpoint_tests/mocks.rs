use chrono::{DateTime, Utc};
use lexpay_engine::{
    db_types::{
        CallbackEvent,
        NewCallbackEvent,
        NewPaymentOrder,
        NewPlatformCert,
        OrderNo,
        PaymentOrder,
        PaymentProvider,
        PlatformCert,
    },
    traits::{
        CallbackAudit,
        CertApiError,
        CertManagement,
        EventQueryFilter,
        Pagination,
        PaidTransition,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        VerifiedNotification,
    },
};
use mockall::mock;

mock! {
    pub CallbackGateway {}

    impl Clone for CallbackGateway {
        fn clone(&self) -> Self;
    }

    impl PaymentGatewayDatabase for CallbackGateway {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder, PaymentGatewayError>;
        async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError>;
        async fn fetch_order_by_trade_no(&self, provider: PaymentProvider, trade_no: &str) -> Result<Option<PaymentOrder>, PaymentGatewayError>;
        async fn insert_callback_event(&self, event: NewCallbackEvent) -> Result<CallbackEvent, PaymentGatewayError>;
        async fn record_event_verified(&self, event_id: i64, notification: &VerifiedNotification, idempotency_key: &str) -> Result<(), PaymentGatewayError>;
        async fn record_event_failure<'a, 'b>(&self, event_id: i64, error_message: &str, order_no: Option<&'a OrderNo>, trade_no: Option<&'b str>) -> Result<(), PaymentGatewayError>;
        async fn annotate_event(&self, event_id: i64, error_message: &str) -> Result<(), PaymentGatewayError>;
        async fn mark_event_applied(&self, event_id: i64) -> Result<(), PaymentGatewayError>;
        async fn transition_applied_for_key(&self, idempotency_key: &str) -> Result<bool, PaymentGatewayError>;
        async fn settle_order(&self, order_no: &OrderNo, notification: &VerifiedNotification) -> Result<PaidTransition, PaymentGatewayError>;
    }

    impl CertManagement for CallbackGateway {
        async fn fetch_active_certs(&self, provider: PaymentProvider) -> Result<Vec<PlatformCert>, CertApiError>;
        async fn fetch_cert_by_serial(&self, provider: PaymentProvider, serial_no: &str) -> Result<Option<PlatformCert>, CertApiError>;
        async fn replace_certs(&self, provider: PaymentProvider, certs: &[NewPlatformCert]) -> Result<usize, CertApiError>;
        async fn merge_certs(&self, provider: PaymentProvider, certs: &[NewPlatformCert]) -> Result<usize, CertApiError>;
        async fn purge_expired_certs(&self, provider: PaymentProvider, cutoff: DateTime<Utc>) -> Result<u64, CertApiError>;
        async fn count_certs(&self, provider: PaymentProvider) -> Result<i64, CertApiError>;
    }
}

mock! {
    pub Auditor {}

    impl Clone for Auditor {
        fn clone(&self) -> Self;
    }

    impl CallbackAudit for Auditor {
        async fn fetch_event(&self, id: i64) -> Result<Option<CallbackEvent>, PaymentGatewayError>;
        async fn fetch_events_for_order(&self, order_no: &OrderNo, limit: u32) -> Result<Vec<CallbackEvent>, PaymentGatewayError>;
        async fn search_events(&self, filter: EventQueryFilter, pagination: Pagination) -> Result<Vec<CallbackEvent>, PaymentGatewayError>;
        async fn fetch_order_snapshot(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError>;
    }
}
