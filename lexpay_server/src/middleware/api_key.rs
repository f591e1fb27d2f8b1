//! API key middleware for Actix Web.
//!
//! Every route under the admin scope is wrapped with this middleware. The caller must present the
//! configured key in the request header; there are no user accounts or roles, the key is the sole
//! admin credential.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    Error,
};
use futures::future::LocalBoxFuture;
use lexpay_common::Secret;
use log::{trace, warn};

pub struct ApiKeyMiddlewareFactory {
    header: String,
    key: Secret<String>,
}

impl ApiKeyMiddlewareFactory {
    pub fn new(header: &str, key: Secret<String>) -> Self {
        ApiKeyMiddlewareFactory { header: header.into(), key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = ApiKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyMiddlewareService {
            header: self.header.clone(),
            key: self.key.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct ApiKeyMiddlewareService<S> {
    header: String,
    key: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let key = self.key.reveal().clone();
        let header = self.header.clone();
        Box::pin(async move {
            trace!("🔐️ Checking API key for request");
            let provided = req.headers().get(&header).and_then(|v| v.to_str().ok());
            match provided {
                Some(value) if value == key => {
                    trace!("🔐️ API key check for request ✅️");
                    service.call(req).await
                },
                Some(_) => {
                    warn!("🔐️ Invalid API key presented. Denying access.");
                    Err(ErrorUnauthorized("Invalid API key."))
                },
                None => {
                    warn!("🔐️ No API key found in request. Denying access.");
                    Err(ErrorUnauthorized("No API key found."))
                },
            }
        })
    }
}
