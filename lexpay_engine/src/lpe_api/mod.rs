//! # LexPay engine public API
//!
//! The `lpe_api` module exposes the programmatic API for the payment engine. The API is modular:
//! clients pick the pieces they need, each generic over the backend traits it requires.
//!
//! * [`callback_flow_api`] is the primary API: it runs the webhook ingestion pipeline and the
//!   order state machine in response to provider notifications.
//! * [`reconciliation_api`] produces the read-only diagnosis an operator uses when a payment
//!   looks stuck.
//! * [`cert_api`] manages the platform certificate store for cert-based providers.
//! * [`audit_api`] is the read side of the callback audit trail.
//!
//! The pattern for all of them is the same: construct the API with a database backend that
//! implements the required traits.
//!
//! ```rust,ignore
//! use lexpay_engine::{CallbackFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/lexpay.db", 5).await?;
//! let api = CallbackFlowApi::new(db, registry, policies, producers);
//! let decision = api.handle_callback(provider, &body, &headers).await?;
//! ```
pub mod audit_api;
pub mod callback_flow_api;
pub mod cert_api;
pub mod reconciliation_api;
