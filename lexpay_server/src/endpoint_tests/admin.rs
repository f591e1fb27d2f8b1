use actix_web::{http::StatusCode, web, web::ServiceConfig};
use lexpay_common::Secret;
use lexpay_engine::{AuditApi, ReconciliationApi};

use super::{
    helpers::{get_request, sample_event, TEST_ADMIN_KEY, TEST_FORENSIC_KEY},
    mocks::MockAuditor,
};
use crate::{
    config::ServerOptions,
    middleware::{ApiKeyMiddlewareFactory, API_KEY_HEADER, FORENSIC_KEY_HEADER},
    routes::{CallbackEventRoute, CallbackEventsRoute, ReconcileRoute},
};

fn register_admin(
    cfg: &mut ServiceConfig,
    audit_api: AuditApi<MockAuditor>,
    reconciliation_api: ReconciliationApi<MockAuditor>,
    forensic_key: Option<&str>,
) {
    let options = ServerOptions { forensic_api_key: forensic_key.map(|k| Secret::new(k.to_string())) };
    let scope = web::scope("/admin")
        .wrap(ApiKeyMiddlewareFactory::new(API_KEY_HEADER, Secret::new(TEST_ADMIN_KEY.to_string())))
        .service(CallbackEventsRoute::<MockAuditor>::new())
        .service(CallbackEventRoute::<MockAuditor>::new())
        .service(ReconcileRoute::<MockAuditor>::new());
    cfg.service(scope)
        .app_data(web::Data::new(audit_api))
        .app_data(web::Data::new(reconciliation_api))
        .app_data(web::Data::new(options));
}

#[actix_web::test]
async fn admin_routes_require_the_api_key() {
    let err = get_request(&[], "/admin/callback-events", configure_listing).await.expect_err("Expected error");
    assert_eq!(err, "No API key found.");

    let err = get_request(&[(API_KEY_HEADER, "wrong-key")], "/admin/callback-events", configure_listing)
        .await
        .expect_err("Expected error");
    assert_eq!(err, "Invalid API key.");
}

#[actix_web::test]
async fn event_listing_exposes_masked_payloads_only() {
    let (status, body) =
        get_request(&[(API_KEY_HEADER, TEST_ADMIN_KEY)], "/admin/callback-events?provider=bank", configure_listing)
            .await
            .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("******"));
    assert!(!body.contains("6222020200112233445"));
}

fn configure_listing(cfg: &mut ServiceConfig) {
    let mut auditor = MockAuditor::new();
    auditor.expect_search_events().returning(|_, _| Ok(vec![sample_event(1)]));
    register_admin(cfg, AuditApi::new(auditor), ReconciliationApi::new(MockAuditor::new()), None);
}

#[actix_web::test]
async fn raw_payload_is_gated_behind_the_forensic_key() {
    let (status, body) =
        get_request(&[(API_KEY_HEADER, TEST_ADMIN_KEY)], "/admin/callback-events/1", configure_forensic)
            .await
            .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("6222020200112233445"));

    let (status, body) = get_request(
        &[(API_KEY_HEADER, TEST_ADMIN_KEY), (FORENSIC_KEY_HEADER, TEST_FORENSIC_KEY)],
        "/admin/callback-events/1",
        configure_forensic,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("6222020200112233445"));
}

#[actix_web::test]
async fn wrong_forensic_key_still_yields_the_masked_view() {
    let (status, body) = get_request(
        &[(API_KEY_HEADER, TEST_ADMIN_KEY), (FORENSIC_KEY_HEADER, "wrong-key")],
        "/admin/callback-events/1",
        configure_forensic,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("6222020200112233445"));
}

fn configure_forensic(cfg: &mut ServiceConfig) {
    let mut auditor = MockAuditor::new();
    auditor.expect_fetch_event().returning(|id| Ok(Some(sample_event(id))));
    register_admin(cfg, AuditApi::new(auditor), ReconciliationApi::new(MockAuditor::new()), Some(TEST_FORENSIC_KEY));
}

#[actix_web::test]
async fn missing_event_is_a_404() {
    let (status, _) = get_request(&[(API_KEY_HEADER, TEST_ADMIN_KEY)], "/admin/callback-events/42", configure_no_event)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn configure_no_event(cfg: &mut ServiceConfig) {
    let mut auditor = MockAuditor::new();
    auditor.expect_fetch_event().returning(|_| Ok(None));
    register_admin(cfg, AuditApi::new(auditor), ReconciliationApi::new(MockAuditor::new()), None);
}

#[actix_web::test]
async fn reconcile_reports_no_callback_for_a_silent_order() {
    let (status, body) =
        get_request(&[(API_KEY_HEADER, TEST_ADMIN_KEY)], "/admin/reconcile/ORD-9999", configure_silent_order)
            .await
            .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("no_callback"));
}

fn configure_silent_order(cfg: &mut ServiceConfig) {
    let mut auditor = MockAuditor::new();
    auditor.expect_fetch_order_snapshot().returning(|_| Ok(None));
    auditor.expect_fetch_events_for_order().returning(|_, _| Ok(Vec::new()));
    register_admin(cfg, AuditApi::new(MockAuditor::new()), ReconciliationApi::new(auditor), None);
}
