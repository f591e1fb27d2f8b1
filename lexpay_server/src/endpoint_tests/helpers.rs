use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::Utc;
use lexpay_common::Money;
use lexpay_engine::db_types::{CallbackEvent, OrderNo, OrderStatusType, PaymentOrder, PaymentProvider};
use log::debug;

pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_FORENSIC_KEY: &str = "test-forensic-key";

pub async fn get_request(
    headers: &[(&str, &str)],
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::get().uri(path);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send(req, configure).await
}

pub async fn post_request(
    headers: &[(&str, &str)],
    path: &str,
    body: String,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::post().uri(path).set_payload(body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send(req, configure).await
}

async fn send(req: TestRequest, configure: fn(&mut ServiceConfig)) -> Result<(StatusCode, String), String> {
    let _ = env_logger::try_init();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::try_call_service(&service, req.to_request()).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}

pub fn pending_order(order_no: &str, amount: i64) -> PaymentOrder {
    PaymentOrder {
        id: 1,
        order_no: OrderNo::from(order_no),
        amount: Money::from(amount),
        status: OrderStatusType::Pending,
        payment_method: None,
        trade_no: None,
        paid_at: None,
        related_id: None,
        related_type: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn paid_order(order_no: &str, amount: i64, trade_no: &str) -> PaymentOrder {
    PaymentOrder {
        status: OrderStatusType::Paid,
        payment_method: Some(PaymentProvider::Bank),
        trade_no: Some(trade_no.to_string()),
        paid_at: Some(Utc::now()),
        ..pending_order(order_no, amount)
    }
}

/// A recorded event whose raw payload carries material the masking rules redact.
pub fn sample_event(id: i64) -> CallbackEvent {
    CallbackEvent {
        id,
        provider: PaymentProvider::Bank,
        order_no: Some(OrderNo::from("ORD-1001")),
        trade_no: Some("T1".to_string()),
        amount: Some(Money::from(5000)),
        paid: Some(true),
        verified: true,
        applied: true,
        idempotency_key: Some("bank:T1".to_string()),
        error_message: None,
        raw_payload: r#"{"card_no":"6222020200112233445","result":"SUCCESS"}"#.to_string(),
        masked_payload: r#"{"card_no":"******","result":"SUCCESS"}"#.to_string(),
        created_at: Utc::now(),
    }
}

/// A freshly inserted event row, before verification has run.
pub fn inserted_event(id: i64, provider: PaymentProvider, raw: &str) -> CallbackEvent {
    CallbackEvent {
        id,
        provider,
        order_no: None,
        trade_no: None,
        amount: None,
        paid: None,
        verified: false,
        applied: false,
        idempotency_key: None,
        error_message: Some("processing".to_string()),
        raw_payload: raw.to_string(),
        masked_payload: raw.to_string(),
        created_at: Utc::now(),
    }
}
