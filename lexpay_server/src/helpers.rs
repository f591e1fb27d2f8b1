use actix_web::HttpRequest;
use lexpay_engine::{adapters::CallbackHeaders, db_types::PaymentProvider};

/// Collects the signature-bearing headers for the provider into the engine's canonical shape.
/// Alipay carries its signature inside the form body, so it has no headers to extract.
pub fn extract_callback_headers(provider: PaymentProvider, req: &HttpRequest) -> CallbackHeaders {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from);
    match provider {
        PaymentProvider::Wechat => CallbackHeaders {
            signature: header("Wechatpay-Signature"),
            serial_no: header("Wechatpay-Serial"),
            timestamp: header("Wechatpay-Timestamp"),
            nonce: header("Wechatpay-Nonce"),
        },
        PaymentProvider::Alipay => CallbackHeaders::default(),
        PaymentProvider::Bank => CallbackHeaders { signature: header("X-Bank-Signature"), ..Default::default() },
    }
}
