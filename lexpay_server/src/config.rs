//! Server configuration, read from environment variables.
//!
//! Every variable carries the `LPG_` prefix. Provider credential blocks are optional: a provider
//! with no credentials is simply not configured, and notifications for it fail verification
//! instead of crashing the server.
use std::{env, io::Write, time::Duration};

use lexpay_common::{helpers::parse_boolean_flag, Secret};
use lexpay_engine::{
    db_types::PaymentProvider,
    AckDecision,
    PipelinePolicies,
    ProviderPolicy,
    RefreshPolicy,
};
use log::*;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_LPG_HOST: &str = "127.0.0.1";
const DEFAULT_LPG_PORT: u16 = 8380;
/// Twice a day is ample for provider cert rotations, which happen on a multi-month cadence.
const DEFAULT_CERT_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 3600);
const DEFAULT_WECHAT_BASE_URL: &str = "https://api.mch.weixin.qq.com";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Gates every route under `/admin`.
    pub admin_api_key: Secret<String>,
    /// Gates access to unredacted callback payloads. When unset, raw payloads are unreachable
    /// over HTTP.
    pub forensic_api_key: Option<Secret<String>>,
    pub wechat: Option<WechatConfig>,
    pub alipay: Option<AlipayConfig>,
    pub bank: Option<BankConfig>,
    /// Ack-vs-retry and amount tolerance knobs, per provider.
    pub policies: PipelinePolicies,
    pub cert_refresh_interval: Duration,
    pub cert_refresh_policy: RefreshPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LPG_HOST.to_string(),
            port: DEFAULT_LPG_PORT,
            database_url: String::default(),
            admin_api_key: Secret::default(),
            forensic_api_key: None,
            wechat: None,
            alipay: None,
            bank: None,
            policies: PipelinePolicies::default(),
            cert_refresh_interval: DEFAULT_CERT_REFRESH_INTERVAL,
            cert_refresh_policy: RefreshPolicy::Replace,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LPG_HOST").ok().unwrap_or_else(|| DEFAULT_LPG_HOST.into());
        let port = env::var("LPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for LPG_PORT. {e} Using the default, {DEFAULT_LPG_PORT}, instead."
                    );
                    DEFAULT_LPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_LPG_PORT);
        let database_url = env::var("LPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ LPG_DATABASE_URL is not set. Please set it to the URL for the LexPay database.");
            String::default()
        });
        let admin_api_key = admin_key_from_env();
        let forensic_api_key = env::var("LPG_FORENSIC_API_KEY").ok().map(Secret::new);
        if forensic_api_key.is_none() {
            info!("🪛️ LPG_FORENSIC_API_KEY is not set. Raw callback payloads will not be accessible over HTTP.");
        }
        let wechat = WechatConfig::try_from_env()
            .map_err(|e| {
                warn!("🪛️ WeChat credentials not loaded. {e}. WeChat notifications will fail verification.");
            })
            .ok();
        let alipay = AlipayConfig::try_from_env()
            .map_err(|e| {
                warn!("🪛️ Alipay credentials not loaded. {e}. Alipay notifications will fail verification.");
            })
            .ok();
        let bank = BankConfig::try_from_env()
            .map_err(|e| {
                warn!("🪛️ Bank credentials not loaded. {e}. Bank notifications will fail verification.");
            })
            .ok();
        let policies = policies_from_env();
        let cert_refresh_interval = env::var("LPG_CERT_REFRESH_INTERVAL_SECS")
            .map_err(|_| {
                info!(
                    "🪛️ LPG_CERT_REFRESH_INTERVAL_SECS is not set. Using the default value of {}s.",
                    DEFAULT_CERT_REFRESH_INTERVAL.as_secs()
                )
            })
            .and_then(|s| {
                s.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for LPG_CERT_REFRESH_INTERVAL_SECS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_CERT_REFRESH_INTERVAL);
        let cert_refresh_policy = match env::var("LPG_CERT_REFRESH_POLICY").map(|s| s.to_lowercase()) {
            Ok(s) if s == "merge" => RefreshPolicy::Merge,
            Ok(s) if s == "replace" => RefreshPolicy::Replace,
            Ok(s) => {
                warn!("🪛️ '{s}' is not a valid LPG_CERT_REFRESH_POLICY (replace|merge). Using 'replace'.");
                RefreshPolicy::Replace
            },
            Err(_) => RefreshPolicy::Replace,
        };
        Self {
            host,
            port,
            database_url,
            admin_api_key,
            forensic_api_key,
            wechat,
            alipay,
            bank,
            policies,
            cert_refresh_interval,
            cert_refresh_policy,
        }
    }
}

fn admin_key_from_env() -> Secret<String> {
    if let Ok(key) = env::var("LPG_ADMIN_API_KEY") {
        return Secret::new(key);
    }
    warn!(
        "🚨️🚨️🚨️ The admin API key has not been set. I'm using a random value for this session. DO NOT operate on \
         production like this; admin access will be lost on restart. 🚨️🚨️🚨️"
    );
    let key: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
    let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
    match &mut tmpfile {
        Some((f, p)) => {
            let key_data = json!({ "admin_api_key": key }).to_string();
            match writeln!(f, "{key_data}") {
                Ok(()) => warn!(
                    "🚨️🚨️🚨️ The admin API key for this session was written to {}. If this is a production instance, \
                     you are doing it wrong! Set the LPG_ADMIN_API_KEY environment variable instead. 🚨️🚨️🚨️",
                    p.to_str().unwrap_or("???")
                ),
                Err(e) => warn!("🪛️ Could not write the admin API key to the temporary file. {e}"),
            }
        },
        None => {
            warn!("🪛️ Could not create a temporary file to store the admin API key.");
        },
    }
    Secret::new(key)
}

fn policies_from_env() -> PipelinePolicies {
    let mut policies = PipelinePolicies::default();
    for provider in PaymentProvider::ALL {
        policies = policies.set(provider, provider_policy_from_env(provider));
    }
    policies
}

/// Reads `LPG_{PROVIDER}_RETRY_ON_SIGNATURE_FAILURE`, `LPG_{PROVIDER}_ACK_ON_DECRYPT_FAILURE`
/// and `LPG_{PROVIDER}_AMOUNT_TOLERANCE`, falling back to the engine defaults.
fn provider_policy_from_env(provider: PaymentProvider) -> ProviderPolicy {
    let prefix = provider.as_str().to_uppercase();
    let defaults = ProviderPolicy::default();
    let retry_on_signature =
        parse_boolean_flag(env::var(format!("LPG_{prefix}_RETRY_ON_SIGNATURE_FAILURE")).ok(), false);
    let ack_on_decrypt = parse_boolean_flag(env::var(format!("LPG_{prefix}_ACK_ON_DECRYPT_FAILURE")).ok(), false);
    let amount_tolerance = env::var(format!("LPG_{prefix}_AMOUNT_TOLERANCE"))
        .ok()
        .and_then(|s| {
            s.parse::<i64>()
                .map_err(|e| warn!("🪛️ Invalid value for LPG_{prefix}_AMOUNT_TOLERANCE. {e}"))
                .ok()
        })
        .unwrap_or(defaults.amount_tolerance);
    ProviderPolicy {
        on_signature_failure: if retry_on_signature { AckDecision::Retry } else { defaults.on_signature_failure },
        on_decrypt_failure: if ack_on_decrypt { AckDecision::Ack } else { defaults.on_decrypt_failure },
        amount_tolerance,
    }
}

//-------------------------------------------------  WechatConfig  ----------------------------------------------------
#[derive(Clone, Debug)]
pub struct WechatConfig {
    /// Merchant id assigned by the provider.
    pub mch_id: String,
    /// Serial number of the merchant's own certificate, sent with signed outbound calls.
    pub mch_serial_no: String,
    /// The merchant's RSA private key (PKCS#8 PEM), used to sign certificate download requests.
    pub private_key_pem: Secret<String>,
    /// The 32-byte APIv3 key used for notification envelope decryption.
    pub api_v3_key: Secret<String>,
    pub base_url: String,
}

impl WechatConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let api_v3_key = env::var("LPG_WECHAT_API_V3_KEY")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [LPG_WECHAT_API_V3_KEY]")))?;
        let mch_id = env::var("LPG_WECHAT_MCH_ID")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [LPG_WECHAT_MCH_ID]")))?;
        let mch_serial_no = env::var("LPG_WECHAT_MCH_SERIAL_NO")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [LPG_WECHAT_MCH_SERIAL_NO]")))?;
        let private_key_pem = pem_from_env("LPG_WECHAT_PRIVATE_KEY")?;
        let base_url = env::var("LPG_WECHAT_BASE_URL").ok().unwrap_or_else(|| DEFAULT_WECHAT_BASE_URL.into());
        Ok(Self { mch_id, mch_serial_no, private_key_pem: Secret::new(private_key_pem), api_v3_key: Secret::new(api_v3_key), base_url })
    }
}

//-------------------------------------------------  AlipayConfig  ----------------------------------------------------
#[derive(Clone, Debug)]
pub struct AlipayConfig {
    /// The provider's RSA public key (SPKI PEM). Public material, but still config.
    pub public_key_pem: String,
}

impl AlipayConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let public_key_pem = pem_from_env("LPG_ALIPAY_PUBLIC_KEY")?;
        Ok(Self { public_key_pem })
    }
}

//-------------------------------------------------  BankConfig  ------------------------------------------------------
#[derive(Clone, Debug)]
pub struct BankConfig {
    /// Shared HMAC secret agreed with the bank channel.
    pub shared_secret: Secret<String>,
}

impl BankConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let shared_secret = env::var("LPG_BANK_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [LPG_BANK_SECRET]")))?;
        Ok(Self { shared_secret: Secret::new(shared_secret) })
    }
}

/// Key material can be supplied inline (`{VAR}`) or as a path to a PEM file (`{VAR}_FILE`).
fn pem_from_env(var: &str) -> Result<String, ServerError> {
    if let Ok(path) = env::var(format!("{var}_FILE")) {
        return std::fs::read_to_string(&path)
            .map_err(|e| ServerError::ConfigurationError(format!("Could not read {path} [{var}_FILE]: {e}")));
    }
    env::var(var).map_err(|e| ServerError::ConfigurationError(format!("{e} [{var}]")))
}

//-------------------------------------------------  ServerOptions  ---------------------------------------------------
/// The subset of the configuration that request handlers need. Kept small so that secrets are not
/// passed around the system with every request.
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    pub forensic_api_key: Option<Secret<String>>,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { forensic_api_key: config.forensic_api_key.clone() }
    }
}
