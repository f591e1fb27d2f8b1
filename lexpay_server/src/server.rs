use std::time::Duration;

use actix_web::{http::KeepAlive, middleware::Logger, web, App, HttpServer};
use actix_web::dev::Server;
use lexpay_engine::{
    adapters::{AdapterRegistry, AlipayAdapter, BankAdapter, WechatAdapter},
    events::{EventHandlers, EventHooks, EventProducers},
    AuditApi,
    CallbackFlowApi,
    CertApi,
    ReconciliationApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    cert_worker::start_cert_refresh_worker,
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    integrations::CertSources,
    middleware::{ApiKeyMiddlewareFactory, API_KEY_HEADER},
    routes::{
        health,
        CallbackEventRoute,
        CallbackEventsRoute,
        CertsRoute,
        ChannelStatusRoute,
        ImportCertRoute,
        PurgeCertsRoute,
        ReconcileRoute,
        RefreshCertsRoute,
        WebhookRoute,
    },
};

pub async fn run_server(config: ServerConfig, hooks: EventHooks) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let sources = CertSources::try_from_config(&config)?;
    if let Some(source) = &sources.wechat {
        start_cert_refresh_worker(db.clone(), source.clone(), config.cert_refresh_interval, config.cert_refresh_policy);
    }
    let srv = create_server_instance(config, db, producers, sources)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    sources: CertSources,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let registry = build_adapter_registry(&config);
        let callback_api = CallbackFlowApi::new(db.clone(), registry, config.policies, producers.clone());
        let audit_api = AuditApi::new(db.clone());
        let reconciliation_api = ReconciliationApi::new(db.clone());
        let cert_api = CertApi::new(db.clone());
        let options = ServerOptions::from_config(&config);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("lpg::access_log"))
            .app_data(web::Data::new(callback_api))
            .app_data(web::Data::new(audit_api))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(cert_api))
            .app_data(web::Data::new(options))
            .app_data(web::Data::new(sources.clone()));
        // Operator routes, all behind the admin API key
        let admin_scope = web::scope("/admin")
            .wrap(ApiKeyMiddlewareFactory::new(API_KEY_HEADER, config.admin_api_key.clone()))
            .service(CallbackEventsRoute::<SqliteDatabase>::new())
            .service(CallbackEventRoute::<SqliteDatabase>::new())
            .service(ReconcileRoute::<SqliteDatabase>::new())
            .service(CertsRoute::<SqliteDatabase>::new())
            .service(RefreshCertsRoute::<SqliteDatabase>::new())
            .service(ImportCertRoute::<SqliteDatabase>::new())
            .service(PurgeCertsRoute::<SqliteDatabase>::new())
            .service(ChannelStatusRoute::<SqliteDatabase>::new());
        app.service(health).service(WebhookRoute::<SqliteDatabase>::new()).service(admin_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Builds the adapter set from whatever credentials the configuration carries. A provider whose
/// credentials are missing or unusable is left out; its notifications fail verification and are
/// handled by policy rather than crashing ingestion.
pub fn build_adapter_registry(config: &ServerConfig) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    if let Some(wechat) = &config.wechat {
        registry = registry.with_wechat(WechatAdapter::new(wechat.api_v3_key.clone()));
    }
    if let Some(alipay) = &config.alipay {
        match AlipayAdapter::new(&alipay.public_key_pem) {
            Ok(adapter) => registry = registry.with_alipay(adapter),
            Err(e) => error!("🚨️ The configured Alipay public key is unusable: {e}"),
        }
    }
    if let Some(bank) = &config.bank {
        registry = registry.with_bank(BankAdapter::new(bank.shared_secret.clone()));
    }
    registry
}
