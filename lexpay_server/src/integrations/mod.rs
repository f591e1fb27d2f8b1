//! Outbound provider integrations. Today that is one thing: pulling platform certificates from
//! the WeChat merchant API.
mod wechat_certs;

pub use wechat_certs::WechatCertSource;

use crate::{config::ServerConfig, errors::ServerError};

/// The certificate sources the server could build from its configuration, keyed by provider.
/// Alipay and the bank channel verify against fixed keys, so WeChat is the only entry.
#[derive(Clone, Default)]
pub struct CertSources {
    pub wechat: Option<WechatCertSource>,
}

impl CertSources {
    pub fn try_from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let wechat = match &config.wechat {
            Some(wechat) => Some(WechatCertSource::new(wechat)?),
            None => None,
        };
        Ok(Self { wechat })
    }
}
