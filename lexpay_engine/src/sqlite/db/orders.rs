use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentOrder, OrderNo, PaymentOrder},
    traits::{PaidTransition, PaymentGatewayError, VerifiedNotification},
};

pub async fn insert_order(
    order: NewPaymentOrder,
    conn: &mut SqliteConnection,
) -> Result<PaymentOrder, PaymentGatewayError> {
    let order_no = order.order_no.clone();
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_no, amount, status, related_id, related_type)
            VALUES ($1, $2, 'Pending', $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order.order_no)
    .bind(order.amount)
    .bind(order.related_id)
    .bind(order.related_type)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => PaymentGatewayError::OrderAlreadyExists(order_no),
        _ => PaymentGatewayError::from(e),
    })?;
    Ok(order)
}

pub async fn fetch_order_by_order_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_no = $1")
        .bind(order_no.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_trade_no(
    trade_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE trade_no = $1").bind(trade_no).fetch_optional(conn).await?;
    Ok(order)
}

/// Applies the guarded state transition for a verified notification.
///
/// The `WHERE status = 'Pending'` clause is the mutual exclusion for the whole system: of any
/// number of concurrent attempts, exactly one statement returns a row. `trade_no`,
/// `payment_method` and `paid_at` are set in the same statement as the paid transition, so they
/// are written exactly once.
pub async fn settle_order(
    order_no: &OrderNo,
    notification: &VerifiedNotification,
    conn: &mut SqliteConnection,
) -> Result<PaidTransition, PaymentGatewayError> {
    let updated: Option<PaymentOrder> = if notification.paid {
        sqlx::query_as(
            r#"
            UPDATE orders SET
                status = 'Paid',
                trade_no = $1,
                payment_method = $2,
                paid_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_no = $3 AND status = 'Pending'
            RETURNING *;
        "#,
        )
        .bind(notification.trade_no.as_deref())
        .bind(notification.provider)
        .bind(order_no.as_str())
        .fetch_optional(&mut *conn)
        .await?
    } else {
        sqlx::query_as(
            r#"
            UPDATE orders SET status = 'Failed', updated_at = CURRENT_TIMESTAMP
            WHERE order_no = $1 AND status = 'Pending'
            RETURNING *;
        "#,
        )
        .bind(order_no.as_str())
        .fetch_optional(&mut *conn)
        .await?
    };
    match updated {
        Some(order) => {
            debug!("🗃️ Order {order_no} settled as {}", order.status);
            Ok(PaidTransition::Applied(order))
        },
        None => {
            // Lost the race, or the order left Pending some other way. Report it as it stands.
            let order = fetch_order_by_order_no(order_no, conn)
                .await?
                .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
            Ok(PaidTransition::AlreadySettled(order))
        },
    }
}
