//! # LexPay server
//! This module hosts the HTTP surface of the LexPay payment gateway. It is responsible for:
//! Listening for incoming webhook notifications from the payment providers.
//! Handing the raw payload and signature headers to the engine's ingestion pipeline.
//! Answering with each provider's expected ack or retry response.
//! Serving the admin API: audit listings, reconciliation, certificate management.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/{provider}`: The ingestion endpoint for provider payment notifications.
//! * `/admin/*`: Operator routes, gated by the admin API key.

pub mod cert_worker;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
