//! `SqliteDatabase` is a concrete implementation of the LexPay engine backend.
//!
//! It implements all the traits defined in the [`crate::traits`] module over a single connection
//! pool, with embedded migrations applied at construction.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::db::{certs, db_url, events, new_pool, orders, run_migrations};
use crate::{
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

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database connection pool from the `LPG_DATABASE_URL` envar and runs any
    /// pending migrations.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        run_migrations(&pool).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_no(order_no, &mut conn).await?)
    }

    async fn fetch_order_by_trade_no(
        &self,
        provider: PaymentProvider,
        trade_no: &str,
    ) -> Result<Option<PaymentOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(order) = orders::fetch_order_by_trade_no(trade_no, &mut conn).await? {
            return Ok(Some(order));
        }
        // The order may not carry the trade_no yet (it is only written at the paid transition),
        // so fall back to the order number recorded by an earlier event for the same trade.
        match events::order_no_for_trade_no(provider, trade_no, &mut conn).await? {
            Some(order_no) => Ok(orders::fetch_order_by_order_no(&order_no, &mut conn).await?),
            None => Ok(None),
        }
    }

    async fn insert_callback_event(&self, event: NewCallbackEvent) -> Result<CallbackEvent, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        events::insert_event(event, &mut conn).await
    }

    async fn record_event_verified(
        &self,
        event_id: i64,
        notification: &VerifiedNotification,
        idempotency_key: &str,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        events::record_verified(event_id, notification, idempotency_key, &mut conn).await
    }

    async fn record_event_failure(
        &self,
        event_id: i64,
        error_message: &str,
        order_no: Option<&OrderNo>,
        trade_no: Option<&str>,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        events::record_failure(event_id, error_message, order_no, trade_no, &mut conn).await
    }

    async fn annotate_event(&self, event_id: i64, error_message: &str) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        events::annotate(event_id, error_message, &mut conn).await
    }

    async fn mark_event_applied(&self, event_id: i64) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        events::mark_applied(event_id, &mut conn).await
    }

    async fn transition_applied_for_key(&self, idempotency_key: &str) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        events::transition_applied_for_key(idempotency_key, &mut conn).await
    }

    async fn settle_order(
        &self,
        order_no: &OrderNo,
        notification: &VerifiedNotification,
    ) -> Result<PaidTransition, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::settle_order(order_no, notification, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CallbackAudit for SqliteDatabase {
    async fn fetch_event(&self, id: i64) -> Result<Option<CallbackEvent>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_event(id, &mut conn).await?)
    }

    async fn fetch_events_for_order(
        &self,
        order_no: &OrderNo,
        limit: u32,
    ) -> Result<Vec<CallbackEvent>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_events_for_order(order_no, limit, &mut conn).await?)
    }

    async fn search_events(
        &self,
        filter: EventQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<CallbackEvent>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::search_events(filter, pagination, &mut conn).await?)
    }

    async fn fetch_order_snapshot(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_no(order_no, &mut conn).await?)
    }
}

impl CertManagement for SqliteDatabase {
    async fn fetch_active_certs(&self, provider: PaymentProvider) -> Result<Vec<PlatformCert>, CertApiError> {
        let mut conn = self.pool.acquire().await?;
        certs::fetch_certs(provider, &mut conn).await
    }

    async fn fetch_cert_by_serial(
        &self,
        provider: PaymentProvider,
        serial_no: &str,
    ) -> Result<Option<PlatformCert>, CertApiError> {
        let mut conn = self.pool.acquire().await?;
        certs::fetch_cert_by_serial(provider, serial_no, &mut conn).await
    }

    async fn replace_certs(
        &self,
        provider: PaymentProvider,
        new_certs: &[NewPlatformCert],
    ) -> Result<usize, CertApiError> {
        let mut tx = self.pool.begin().await?;
        certs::delete_certs_for_provider(provider, &mut tx).await?;
        for cert in new_certs {
            certs::upsert_cert(provider, cert, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(new_certs.len())
    }

    async fn merge_certs(&self, provider: PaymentProvider, new_certs: &[NewPlatformCert]) -> Result<usize, CertApiError> {
        let mut tx = self.pool.begin().await?;
        for cert in new_certs {
            certs::upsert_cert(provider, cert, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(new_certs.len())
    }

    async fn purge_expired_certs(&self, provider: PaymentProvider, cutoff: DateTime<Utc>) -> Result<u64, CertApiError> {
        let mut conn = self.pool.acquire().await?;
        certs::purge_expired(provider, cutoff, &mut conn).await
    }

    async fn count_certs(&self, provider: PaymentProvider) -> Result<i64, CertApiError> {
        let mut conn = self.pool.acquire().await?;
        certs::count_certs(provider, &mut conn).await
    }
}
