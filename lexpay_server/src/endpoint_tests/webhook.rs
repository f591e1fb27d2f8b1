use actix_web::{http::StatusCode, web, web::ServiceConfig};
use lexpay_common::Secret;
use lexpay_engine::{
    adapters::{AdapterRegistry, BankAdapter},
    events::EventProducers,
    traits::PaidTransition,
    AckDecision,
    CallbackFlowApi,
    CertApi,
    PipelinePolicies,
    ProviderPolicy,
};

use super::{
    helpers::{get_request, inserted_event, paid_order, pending_order, post_request},
    mocks::MockCallbackGateway,
};
use crate::routes::{ChannelStatusRoute, WebhookRoute};

const BANK_SECRET: &str = "test-bank-shared-secret";
const BODY: &str = r#"{"merchant_order_no":"ORD-1001","bank_trade_no":"T1","amount_cents":5000,"result":"SUCCESS"}"#;

fn bank_adapter() -> BankAdapter {
    BankAdapter::new(Secret::new(BANK_SECRET.to_string()))
}

fn register_pipeline(cfg: &mut ServiceConfig, gateway: MockCallbackGateway, policies: PipelinePolicies) {
    let registry = AdapterRegistry::new().with_bank(bank_adapter());
    let api = CallbackFlowApi::new(gateway, registry, policies, EventProducers::default());
    cfg.service(WebhookRoute::<MockCallbackGateway>::new()).app_data(web::Data::new(api));
}

#[actix_web::test]
async fn valid_bank_notification_is_acked_and_settled() {
    let signature = bank_adapter().sign(BODY);
    let (status, body) = post_request(&[("X-Bank-Signature", signature.as_str())], "/webhook/bank", BODY.into(), configure_settles)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");
}

fn configure_settles(cfg: &mut ServiceConfig) {
    let mut gateway = MockCallbackGateway::new();
    gateway
        .expect_insert_callback_event()
        .returning(|e| Ok(inserted_event(1, e.provider, &e.raw_payload)));
    gateway.expect_record_event_verified().times(1).returning(|_, _, _| Ok(()));
    gateway.expect_transition_applied_for_key().returning(|_| Ok(false));
    gateway.expect_fetch_order_by_order_no().returning(|_| Ok(Some(pending_order("ORD-1001", 5000))));
    gateway
        .expect_settle_order()
        .times(1)
        .returning(|_, _| Ok(PaidTransition::Applied(paid_order("ORD-1001", 5000, "T1"))));
    gateway.expect_mark_event_applied().times(1).returning(|_| Ok(()));
    register_pipeline(cfg, gateway, PipelinePolicies::default());
}

#[actix_web::test]
async fn tampered_notification_is_recorded_and_acked() {
    let signature = bank_adapter().sign("something else entirely");
    let (status, body) =
        post_request(&[("X-Bank-Signature", signature.as_str())], "/webhook/bank", BODY.into(), configure_records_failure)
            .await
            .unwrap();
    // Default bank policy acks bad signatures; a redelivery of the same bytes cannot succeed.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");
}

fn configure_records_failure(cfg: &mut ServiceConfig) {
    let mut gateway = MockCallbackGateway::new();
    gateway
        .expect_insert_callback_event()
        .returning(|e| Ok(inserted_event(1, e.provider, &e.raw_payload)));
    gateway
        .expect_record_event_failure()
        .times(1)
        .withf(|_, message, _, _| message == "signature_failed")
        .returning(|_, _, _, _| Ok(()));
    register_pipeline(cfg, gateway, PipelinePolicies::default());
}

#[actix_web::test]
async fn retry_policy_turns_into_a_non_2xx_response() {
    let signature = bank_adapter().sign("something else entirely");
    let (status, body) =
        post_request(&[("X-Bank-Signature", signature.as_str())], "/webhook/bank", BODY.into(), configure_retry_policy)
            .await
            .unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "FAIL");
}

fn configure_retry_policy(cfg: &mut ServiceConfig) {
    let mut gateway = MockCallbackGateway::new();
    gateway
        .expect_insert_callback_event()
        .returning(|e| Ok(inserted_event(1, e.provider, &e.raw_payload)));
    gateway.expect_record_event_failure().returning(|_, _, _, _| Ok(()));
    let policies = PipelinePolicies::default().set(
        lexpay_engine::db_types::PaymentProvider::Bank,
        ProviderPolicy { on_signature_failure: AckDecision::Retry, ..Default::default() },
    );
    register_pipeline(cfg, gateway, policies);
}

#[actix_web::test]
async fn channel_status_reports_provider_readiness() {
    let (status, body) = get_request(&[], "/channel-status", configure_channel_status).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""provider":"bank","configured":true"#));
    assert!(body.contains(r#""provider":"wechat","configured":false,"certs_stored":0"#));
    assert!(body.contains(r#""provider":"alipay","configured":false"#));
}

fn configure_channel_status(cfg: &mut ServiceConfig) {
    let registry = AdapterRegistry::new().with_bank(bank_adapter());
    let flow = CallbackFlowApi::new(
        MockCallbackGateway::new(),
        registry,
        PipelinePolicies::default(),
        EventProducers::default(),
    );
    let mut certs = MockCallbackGateway::new();
    certs.expect_count_certs().returning(|_| Ok(0));
    cfg.service(ChannelStatusRoute::<MockCallbackGateway>::new())
        .app_data(web::Data::new(flow))
        .app_data(web::Data::new(CertApi::new(certs)));
}

#[actix_web::test]
async fn unknown_provider_is_rejected() {
    let (status, body) = post_request(&[], "/webhook/paypal", "{}".into(), configure_no_calls).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unknown payment provider"));
}

fn configure_no_calls(cfg: &mut ServiceConfig) {
    register_pipeline(cfg, MockCallbackGateway::new(), PipelinePolicies::default());
}
