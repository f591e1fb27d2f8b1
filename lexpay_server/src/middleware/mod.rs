mod api_key;

pub use api_key::ApiKeyMiddlewareFactory;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "lpg-api-key";
/// Header carrying the forensic access key for raw payload reads.
pub const FORENSIC_KEY_HEADER: &str = "lpg-forensic-key";
