//! Stateless pub-sub hooks for order lifecycle events.
//!
//! Downstream services (the consultation booking flow, invoicing) register async handlers for
//! order-paid events. Delivery is decoupled from the webhook request cycle via a buffered channel:
//! a slow consumer can never delay a provider ack, and a handler failure never rolls back an order
//! transition. Delivery is at-least-once; consumers are expected to be idempotent.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::OrderPaidEvent;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
