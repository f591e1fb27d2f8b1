use std::time::Duration;

use lexpay_engine::{CertApi, RefreshPolicy, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

use crate::integrations::WechatCertSource;

/// Starts the certificate refresh worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
///
/// The worker only ever adds or replaces certificates; expired certs are purged by explicit
/// operator action, never here.
pub fn start_cert_refresh_worker(
    db: SqliteDatabase,
    source: WechatCertSource,
    interval: Duration,
    policy: RefreshPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = CertApi::new(db);
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Certificate refresh worker started ({}s cadence)", interval.as_secs());
        loop {
            timer.tick().await;
            info!("🕰️ Running certificate refresh job");
            match api.refresh(&source, policy).await {
                Ok(count) => info!("🕰️ {count} certificates stored"),
                Err(e) => error!("🕰️ Certificate refresh failed, keeping the stored set: {e}"),
            }
        }
    })
}
