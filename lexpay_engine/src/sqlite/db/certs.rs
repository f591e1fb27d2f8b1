use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPlatformCert, PlatformCert, PaymentProvider},
    traits::CertApiError,
};

pub async fn fetch_certs(
    provider: PaymentProvider,
    conn: &mut SqliteConnection,
) -> Result<Vec<PlatformCert>, CertApiError> {
    let certs = sqlx::query_as("SELECT * FROM platform_certs WHERE provider = $1 ORDER BY created_at DESC")
        .bind(provider)
        .fetch_all(conn)
        .await?;
    Ok(certs)
}

pub async fn fetch_cert_by_serial(
    provider: PaymentProvider,
    serial_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PlatformCert>, CertApiError> {
    let cert = sqlx::query_as("SELECT * FROM platform_certs WHERE provider = $1 AND serial_no = $2")
        .bind(provider)
        .bind(serial_no)
        .fetch_optional(conn)
        .await?;
    Ok(cert)
}

/// Upserts one cert on `(provider, serial_no)`. Refreshes that re-deliver a known serial update
/// its material in place, so concurrent refreshes from several instances converge rather than
/// conflict.
pub async fn upsert_cert(
    provider: PaymentProvider,
    cert: &NewPlatformCert,
    conn: &mut SqliteConnection,
) -> Result<(), CertApiError> {
    sqlx::query(
        r#"
            INSERT INTO platform_certs (provider, serial_no, pem, expire_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider, serial_no)
            DO UPDATE SET pem = excluded.pem, expire_time = excluded.expire_time
        "#,
    )
    .bind(provider)
    .bind(&cert.serial_no)
    .bind(&cert.pem)
    .bind(cert.expire_time)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_certs_for_provider(
    provider: PaymentProvider,
    conn: &mut SqliteConnection,
) -> Result<u64, CertApiError> {
    let rows =
        sqlx::query("DELETE FROM platform_certs WHERE provider = $1").bind(provider).execute(conn).await?.rows_affected();
    debug!("🔑️ Removed {rows} stored certs for {provider}");
    Ok(rows)
}

pub async fn purge_expired(
    provider: PaymentProvider,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, CertApiError> {
    let rows = sqlx::query("DELETE FROM platform_certs WHERE provider = $1 AND expire_time IS NOT NULL AND expire_time < $2")
        .bind(provider)
        .bind(cutoff)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(rows)
}

pub async fn count_certs(provider: PaymentProvider, conn: &mut SqliteConnection) -> Result<i64, CertApiError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM platform_certs WHERE provider = $1")
        .bind(provider)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
