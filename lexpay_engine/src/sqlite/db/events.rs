use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CallbackEvent, NewCallbackEvent, OrderNo},
    traits::{EventQueryFilter, Pagination, PaymentGatewayError, VerifiedNotification},
};

/// Inserts the audit row for an inbound notification. A single statement: either the whole row
/// exists afterwards, or nothing does.
pub async fn insert_event(
    event: NewCallbackEvent,
    conn: &mut SqliteConnection,
) -> Result<CallbackEvent, PaymentGatewayError> {
    let event = sqlx::query_as(
        r#"
            INSERT INTO callback_events (provider, raw_payload, masked_payload, verified, error_message)
            VALUES ($1, $2, $3, 0, 'processing')
            RETURNING *;
        "#,
    )
    .bind(event.provider)
    .bind(event.raw_payload)
    .bind(event.masked_payload)
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn record_verified(
    event_id: i64,
    notification: &VerifiedNotification,
    idempotency_key: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let rows = sqlx::query(
        r#"
            UPDATE callback_events SET
                verified = 1,
                order_no = $1,
                trade_no = $2,
                amount = $3,
                paid = $4,
                idempotency_key = $5,
                error_message = NULL
            WHERE id = $6
        "#,
    )
    .bind(notification.order_no.as_ref().map(|o| o.as_str().to_string()))
    .bind(notification.trade_no.as_deref())
    .bind(notification.amount)
    .bind(notification.paid)
    .bind(idempotency_key)
    .bind(event_id)
    .execute(conn)
    .await?
    .rows_affected();
    if rows == 0 {
        return Err(PaymentGatewayError::EventNotFound(event_id));
    }
    Ok(())
}

pub async fn record_failure(
    event_id: i64,
    error_message: &str,
    order_no: Option<&OrderNo>,
    trade_no: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let rows = sqlx::query(
        "UPDATE callback_events SET error_message = $1, order_no = $2, trade_no = $3 WHERE id = $4",
    )
    .bind(error_message)
    .bind(order_no.map(|o| o.as_str().to_string()))
    .bind(trade_no)
    .bind(event_id)
    .execute(conn)
    .await?
    .rows_affected();
    if rows == 0 {
        return Err(PaymentGatewayError::EventNotFound(event_id));
    }
    Ok(())
}

pub async fn annotate(
    event_id: i64,
    error_message: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let rows = sqlx::query("UPDATE callback_events SET error_message = $1 WHERE id = $2")
        .bind(error_message)
        .bind(event_id)
        .execute(conn)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(PaymentGatewayError::EventNotFound(event_id));
    }
    Ok(())
}

pub async fn mark_applied(event_id: i64, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    let rows = sqlx::query("UPDATE callback_events SET applied = 1 WHERE id = $1")
        .bind(event_id)
        .execute(conn)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(PaymentGatewayError::EventNotFound(event_id));
    }
    Ok(())
}

pub async fn transition_applied_for_key(
    idempotency_key: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let applied: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM callback_events WHERE idempotency_key = $1 AND verified = 1 AND applied = 1)",
    )
    .bind(idempotency_key)
    .fetch_one(conn)
    .await?;
    Ok(applied)
}

pub async fn fetch_event(id: i64, conn: &mut SqliteConnection) -> Result<Option<CallbackEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM callback_events WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// The most recent `limit` events for an order, newest first.
pub async fn fetch_events_for_order(
    order_no: &OrderNo,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<CallbackEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM callback_events WHERE order_no = $1 ORDER BY id DESC LIMIT $2")
        .bind(order_no.as_str())
        .bind(limit)
        .fetch_all(conn)
        .await
}

/// The most recent order number recorded against a trade number, for resolving notifications that
/// omit the merchant order number.
pub async fn order_no_for_trade_no(
    provider: crate::db_types::PaymentProvider,
    trade_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderNo>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT order_no FROM callback_events WHERE provider = $1 AND trade_no = $2 AND order_no IS NOT NULL ORDER \
         BY id DESC LIMIT 1",
    )
    .bind(provider)
    .bind(trade_no)
    .fetch_optional(conn)
    .await
}

/// Fetches events according to criteria specified in the `EventQueryFilter`, newest first.
pub async fn search_events(
    filter: EventQueryFilter,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<CallbackEvent>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM callback_events ");
    if !filter.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(provider) = filter.provider {
        where_clause.push("provider = ");
        where_clause.push_bind_unseparated(provider.as_str());
    }
    if let Some(order_no) = filter.order_no {
        where_clause.push("order_no = ");
        where_clause.push_bind_unseparated(order_no.as_str().to_string());
    }
    if let Some(trade_no) = filter.trade_no {
        where_clause.push("trade_no = ");
        where_clause.push_bind_unseparated(trade_no);
    }
    if let Some(verified) = filter.verified {
        where_clause.push("verified = ");
        where_clause.push_bind_unseparated(verified);
    }
    builder.push(" ORDER BY id DESC LIMIT ");
    builder.push_bind(pagination.page_size);
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("📝️ Executing query: {}", builder.sql());
    let events = builder.build_query_as::<CallbackEvent>().fetch_all(conn).await?;
    Ok(events)
}
