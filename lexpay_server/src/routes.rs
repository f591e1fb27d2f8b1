//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are async; anything that touches the database goes through the engine APIs, which are
//! handed in as `web::Data`. Blocking work inside a handler stalls the worker thread, so there
//! isn't any.
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use lexpay_engine::{
    db_types::{OrderNo, PaymentProvider},
    traits::{CallbackAudit, CertManagement, PaymentGatewayDatabase},
    AckDecision,
    AuditApi,
    CallbackFlowApi,
    CertApi,
    ReconciliationApi,
    RefreshPolicy,
};
use log::*;
use serde_json::json;

use crate::{
    config::ServerOptions,
    data_objects::{
        CertSummary,
        ChannelStatus,
        EventListQuery,
        ImportCertRequest,
        JsonResponse,
        ProviderQuery,
        RefreshCertsRequest,
    },
    errors::ServerError,
    helpers::extract_callback_headers,
    integrations::CertSources,
    middleware::FORENSIC_KEY_HEADER,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(webhook => Post "/webhook/{provider}" impl PaymentGatewayDatabase, CertManagement);
/// The single ingestion endpoint for all provider notifications.
///
/// The body is taken as raw bytes: the adapters verify signatures over the exact bytes the
/// provider sent, so nothing may re-serialize the payload before verification. The response is
/// whatever the provider's redelivery contract expects for the pipeline's ack decision; a
/// database failure surfaces as a 500, which every provider treats as "redeliver later".
pub async fn webhook<B>(
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<CallbackFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + CertManagement,
{
    let provider =
        PaymentProvider::from_str(&path.into_inner()).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    let raw = String::from_utf8_lossy(&body).into_owned();
    debug!("💻️ Webhook notification from {provider} ({} bytes)", raw.len());
    let headers = extract_callback_headers(provider, &req);
    let decision = api.handle_callback(provider, &raw, &headers).await?;
    trace!("💻️ Webhook from {provider} handled: {decision:?}");
    Ok(ack_response(provider, decision))
}

/// Translates the pipeline's decision into the provider's expected response body and status.
fn ack_response(provider: PaymentProvider, decision: AckDecision) -> HttpResponse {
    match (provider, decision) {
        (PaymentProvider::Wechat, AckDecision::Ack) => HttpResponse::Ok().json(json!({"code": "SUCCESS"})),
        (PaymentProvider::Wechat, AckDecision::Retry) => {
            HttpResponse::ServiceUnavailable().json(json!({"code": "FAIL", "message": "please retry"}))
        },
        (PaymentProvider::Alipay, AckDecision::Ack) => HttpResponse::Ok().body("success"),
        (PaymentProvider::Alipay, AckDecision::Retry) => HttpResponse::ServiceUnavailable().body("fail"),
        (PaymentProvider::Bank, AckDecision::Ack) => HttpResponse::Ok().body("SUCCESS"),
        (PaymentProvider::Bank, AckDecision::Retry) => HttpResponse::ServiceUnavailable().body("FAIL"),
    }
}

//----------------------------------------------   Audit  ----------------------------------------------------
route!(callback_events => Get "/callback-events" impl CallbackAudit);
/// Paginated, filterable listing of the callback audit trail. Masked payloads only.
pub async fn callback_events<B: CallbackAudit>(
    query: web::Query<EventListQuery>,
    api: web::Data<AuditApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let query = query.into_inner();
    debug!("💻️ GET callback events ({query:?})");
    let events = api.search_events(query.filter(), query.pagination()).await?;
    Ok(HttpResponse::Ok().json(events))
}

route!(callback_event => Get "/callback-events/{id}" impl CallbackAudit);
/// A single callback event. The masked view by default; the raw payload only when the caller
/// presents the forensic access key.
pub async fn callback_event<B: CallbackAudit>(
    path: web::Path<i64>,
    req: HttpRequest,
    api: web::Data<AuditApi<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    if forensic_access_granted(&req, &options) {
        warn!("💻️ Raw payload of callback event #{id} accessed with the forensic key");
        let event = api.fetch_event_raw(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Event {id}")))?;
        return Ok(HttpResponse::Ok().json(event));
    }
    debug!("💻️ GET callback event #{id}");
    let event = api.fetch_event(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Event {id}")))?;
    Ok(HttpResponse::Ok().json(event))
}

fn forensic_access_granted(req: &HttpRequest, options: &ServerOptions) -> bool {
    let Some(key) = &options.forensic_api_key else {
        return false;
    };
    req.headers()
        .get(FORENSIC_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == key.reveal().as_str())
        .unwrap_or(false)
}

//----------------------------------------------   Reconciliation  ----------------------------------------------------
route!(reconcile => Get "/reconcile/{order_no}" impl CallbackAudit);
/// On-demand diagnosis of one order's payment state against its callback history.
pub async fn reconcile<B: CallbackAudit>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    debug!("💻️ GET reconcile for order {order_no}");
    let result = api.reconcile(&order_no).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Certificates  ----------------------------------------------------
route!(certs => Get "/certs" impl CertManagement);
pub async fn certs<B: CertManagement>(
    query: web::Query<ProviderQuery>,
    api: web::Data<CertApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let provider = query.provider;
    debug!("💻️ GET certs for {provider}");
    let certs = api.active_certs(provider).await?;
    let summaries = certs.iter().map(CertSummary::from).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(summaries))
}

route!(refresh_certs => Post "/certs/refresh" impl CertManagement);
/// Pulls the current certificate set from the provider and stores it. Only meaningful for
/// providers that rotate platform certificates.
pub async fn refresh_certs<B: CertManagement>(
    body: web::Json<RefreshCertsRequest>,
    api: web::Data<CertApi<B>>,
    sources: web::Data<CertSources>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let policy = request.policy.unwrap_or(RefreshPolicy::Replace);
    info!("💻️ Certificate refresh requested for {} ({policy:?})", request.provider);
    match request.provider {
        PaymentProvider::Wechat => {
            let source = sources.wechat.as_ref().ok_or_else(|| {
                ServerError::ConfigurationError("No WeChat merchant credentials are configured".to_string())
            })?;
            let count = api.refresh(source, policy).await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Stored {count} certificates"))))
        },
        p => Err(ServerError::InvalidRequestBody(format!("{p} does not use platform certificates"))),
    }
}

route!(import_cert => Post "/certs/import" impl CertManagement);
/// Manual certificate import, for bootstrapping or when the provider's cert endpoint is down.
pub async fn import_cert<B: CertManagement>(
    body: web::Json<ImportCertRequest>,
    api: web::Data<CertApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    info!("💻️ Manual certificate import for {}", request.provider);
    let count = api
        .import_cert(request.provider, &request.pem, request.serial_no, request.expire_time, request.merge)
        .await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Stored {count} certificates"))))
}

route!(purge_certs => Post "/certs/purge" impl CertManagement);
/// Deletes certs whose expiry has passed. Deliberately a separate, explicit operator action;
/// nothing in the pipeline or the refresh worker deletes certificates on its own.
pub async fn purge_certs<B: CertManagement>(
    body: web::Json<ProviderQuery>,
    api: web::Data<CertApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let provider = body.into_inner().provider;
    let purged = api.purge_expired(provider).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Purged {purged} expired certificates"))))
}

//----------------------------------------------   Channel status  ----------------------------------------------------
route!(channel_status => Get "/channel-status" impl PaymentGatewayDatabase, CertManagement);
/// One row per provider: whether credentials are configured, and how many platform certs are on
/// file for cert-based providers.
pub async fn channel_status<B>(
    flow: web::Data<CallbackFlowApi<B>>,
    certs: web::Data<CertApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + CertManagement,
{
    let mut report = Vec::with_capacity(PaymentProvider::ALL.len());
    for provider in PaymentProvider::ALL {
        let certs_stored =
            if provider.uses_platform_certs() { Some(certs.cert_count(provider).await?) } else { None };
        report.push(ChannelStatus { provider, configured: flow.is_configured(provider), certs_stored });
    }
    Ok(HttpResponse::Ok().json(report))
}
