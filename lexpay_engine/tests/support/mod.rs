use lexpay_common::{Money, Secret};
use lexpay_engine::{
    adapters::{AdapterRegistry, BankAdapter, CallbackHeaders},
    db_types::{NewPaymentOrder, OrderNo},
    events::EventProducers,
    CallbackFlowApi,
    PipelinePolicies,
    SqliteDatabase,
};
use tempfile::TempDir;

pub const BANK_SECRET: &str = "test-bank-shared-secret";

/// A fresh SQLite database in a temp directory, migrations applied. Hold on to the `TempDir`;
/// dropping it deletes the database file.
pub async fn new_test_db() -> (SqliteDatabase, TempDir) {
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().expect("could not create temp dir");
    let url = format!("sqlite://{}", dir.path().join("lexpay.db").display());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("could not create test database");
    (db, dir)
}

pub fn bank_adapter() -> BankAdapter {
    BankAdapter::new(Secret::new(BANK_SECRET.to_string()))
}

/// A pipeline wired with the bank adapter only, default policies, no hooks.
pub fn bank_pipeline(db: SqliteDatabase) -> CallbackFlowApi<SqliteDatabase> {
    let registry = AdapterRegistry::new().with_bank(bank_adapter());
    CallbackFlowApi::new(db, registry, PipelinePolicies::default(), EventProducers::default())
}

/// A correctly signed bank notification body plus its headers.
pub fn bank_notification(order_no: &str, trade_no: &str, amount_cents: i64, result: &str) -> (String, CallbackHeaders) {
    let body = format!(
        r#"{{"merchant_order_no":"{order_no}","bank_trade_no":"{trade_no}","amount_cents":{amount_cents},"result":"{result}"}}"#
    );
    let headers = CallbackHeaders::with_signature(bank_adapter().sign(&body));
    (body, headers)
}

pub async fn seed_order(api: &CallbackFlowApi<SqliteDatabase>, order_no: &str, amount: i64) {
    api.process_new_order(NewPaymentOrder::new(OrderNo(order_no.into()), Money::from(amount)))
        .await
        .expect("could not seed order");
}
