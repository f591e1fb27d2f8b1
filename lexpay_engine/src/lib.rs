//! LexPay Engine
//!
//! The core library of the LexPay payment gateway: callback verification, the order state
//! machine, reconciliation and the audit trail for the legal-services marketplace. It is
//! HTTP-agnostic; the server crate puts an actix-web surface in front of it.
//!
//! The library is divided into three main sections:
//! 1. Database types and backend traits ([`db_types`], [`traits`]), plus the SQLite backend that
//!    implements them. Callers should never touch the database directly; everything goes through
//!    the public API.
//! 2. The public API ([`mod@lpe_api`]): the callback ingestion pipeline
//!    ([`CallbackFlowApi`]), reconciliation ([`ReconciliationApi`]), certificate store management
//!    ([`CertApi`]) and audit reads ([`AuditApi`]). Each API is generic over the backend traits
//!    it needs.
//! 3. Provider plumbing: the [`adapters`] that verify each provider's wire format, the shared
//!    [`crypto`] primitives, and the [`masking`] rules applied to stored payloads.
//!
//! The engine also emits order lifecycle events ([`events`]): register a hook and the pipeline
//! publishes an [`events::OrderPaidEvent`] after every paid transition, decoupled from the
//! webhook response cycle.
pub mod adapters;
pub mod crypto;
pub mod db_types;
pub mod events;
pub mod helpers;
mod lpe_api;
pub mod masking;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use lpe_api::{
    audit_api::AuditApi,
    callback_flow_api::{AckDecision, CallbackFlowApi, PipelinePolicies, ProviderPolicy},
    cert_api::{CertApi, RefreshPolicy},
    reconciliation_api::{Diagnosis, ReconciliationApi, ReconciliationResult},
};
