use std::fmt::Debug;

use log::*;

use crate::{
    adapters::{AdapterRegistry, CallbackHeaders, FailureKind, VerificationFailure},
    db_types::{event_errors, NewCallbackEvent, NewPaymentOrder, OrderNo, OrderStatusType, PaymentOrder, PaymentProvider},
    events::{EventProducers, OrderPaidEvent},
    helpers::idempotency_key,
    masking::mask,
    traits::{CertManagement, PaidTransition, PaymentGatewayDatabase, PaymentGatewayError, VerifiedNotification},
};

/// The provider-facing effect of handling one notification. Every code path through the pipeline
/// produces one of these explicitly; the HTTP layer translates it into the provider's expected
/// response, never the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Durable receipt; the provider must not redeliver.
    Ack,
    /// Ask the provider to redeliver later.
    Retry,
}

/// Per-provider policy knobs for the pipeline.
///
/// A bad signature is inherently non-retriable, so the default acks it. A decrypt failure may be
/// a key rotation that the refresh worker has not caught up with yet, so the default asks the
/// provider to retry and gives the credentials time to propagate.
#[derive(Debug, Clone, Copy)]
pub struct ProviderPolicy {
    pub on_signature_failure: AckDecision,
    pub on_decrypt_failure: AckDecision,
    /// Acceptable difference, in minor units, between the order amount and the notified amount.
    pub amount_tolerance: i64,
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self { on_signature_failure: AckDecision::Ack, on_decrypt_failure: AckDecision::Retry, amount_tolerance: 0 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelinePolicies {
    wechat: ProviderPolicy,
    alipay: ProviderPolicy,
    bank: ProviderPolicy,
}

impl PipelinePolicies {
    pub fn for_provider(&self, provider: PaymentProvider) -> &ProviderPolicy {
        match provider {
            PaymentProvider::Wechat => &self.wechat,
            PaymentProvider::Alipay => &self.alipay,
            PaymentProvider::Bank => &self.bank,
        }
    }

    pub fn set(mut self, provider: PaymentProvider, policy: ProviderPolicy) -> Self {
        match provider {
            PaymentProvider::Wechat => self.wechat = policy,
            PaymentProvider::Alipay => self.alipay = policy,
            PaymentProvider::Bank => self.bank = policy,
        }
        self
    }
}

/// `CallbackFlowApi` runs the webhook ingestion pipeline: persist, verify, deduplicate, settle.
pub struct CallbackFlowApi<B> {
    db: B,
    registry: AdapterRegistry,
    policies: PipelinePolicies,
    producers: EventProducers,
}

impl<B> Debug for CallbackFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallbackFlowApi")
    }
}

impl<B> CallbackFlowApi<B> {
    pub fn new(db: B, registry: AdapterRegistry, policies: PipelinePolicies, producers: EventProducers) -> Self {
        Self { db, registry, policies, producers }
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.registry.is_configured(provider)
    }
}

impl<B> CallbackFlowApi<B>
where B: PaymentGatewayDatabase + CertManagement
{
    /// Register a new order awaiting payment. This is the order-issuing collaborator's entry
    /// point; the pipeline itself never creates orders.
    pub async fn process_new_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder, PaymentGatewayError> {
        let order = self.db.insert_order(order).await?;
        debug!("🔄️📦️ Order {} registered, awaiting payment of {}", order.order_no, order.amount);
        Ok(order)
    }

    /// Handle one inbound provider notification end to end.
    ///
    /// The audit record is written before anything else; if that write fails the error propagates
    /// and the server answers with a non-ack so the provider redelivers. Every later outcome,
    /// including every failure, is an explicit [`AckDecision`].
    pub async fn handle_callback(
        &self,
        provider: PaymentProvider,
        raw: &str,
        headers: &CallbackHeaders,
    ) -> Result<AckDecision, PaymentGatewayError> {
        let masked = mask(raw);
        let event = self
            .db
            .insert_callback_event(NewCallbackEvent {
                provider,
                raw_payload: raw.to_string(),
                masked_payload: masked,
            })
            .await?;
        trace!("🔄️🪝️ Callback event #{} recorded for {provider}", event.id);

        let certs = if provider.uses_platform_certs() {
            self.db
                .fetch_active_certs(provider)
                .await
                .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?
        } else {
            Vec::new()
        };

        let notification = match self.registry.verify(provider, raw, headers, &certs) {
            Ok(notification) => notification,
            Err(failure) => return self.handle_verification_failure(provider, event.id, failure).await,
        };

        let key = idempotency_key(provider, &notification);
        self.db.record_event_verified(event.id, &notification, &key).await?;
        if self.db.transition_applied_for_key(&key).await? {
            debug!("🔄️🪝️ Redelivery of already-applied notification {key}; acking without action");
            self.db.annotate_event(event.id, event_errors::DUPLICATE).await?;
            return Ok(AckDecision::Ack);
        }

        let Some(order) = self.resolve_order(provider, &notification).await? else {
            warn!("🔄️🪝️ Verified notification from {provider} matches no known order; flagging as orphaned");
            self.db.annotate_event(event.id, event_errors::ORPHANED_ORDER).await?;
            return Ok(AckDecision::Ack);
        };

        let tolerance = self.policies.for_provider(provider).amount_tolerance;
        if notification.paid && order.amount.abs_diff(notification.amount) > tolerance {
            warn!(
                "🔄️🪝️ Amount mismatch on order {}: expected {}, notified {}. Order left untouched.",
                order.order_no, order.amount, notification.amount
            );
            self.db.annotate_event(event.id, event_errors::AMOUNT_MISMATCH).await?;
            return Ok(AckDecision::Ack);
        }

        match self.db.settle_order(&order.order_no, &notification).await? {
            PaidTransition::Applied(order) => {
                self.db.mark_event_applied(event.id).await?;
                info!("🔄️📦️ Order {} settled as {} via {provider}", order.order_no, order.status);
                if order.status == OrderStatusType::Paid {
                    self.call_order_paid_hook(&order, provider).await;
                }
                Ok(AckDecision::Ack)
            },
            PaidTransition::AlreadySettled(order) => {
                let annotation = if order.status == OrderStatusType::Paid && notification.paid {
                    event_errors::DUPLICATE
                } else {
                    event_errors::NOT_PAYABLE
                };
                debug!("🔄️🪝️ Order {} is already {}; acking without action", order.order_no, order.status);
                self.db.annotate_event(event.id, annotation).await?;
                Ok(AckDecision::Ack)
            },
        }
    }

    async fn handle_verification_failure(
        &self,
        provider: PaymentProvider,
        event_id: i64,
        failure: VerificationFailure,
    ) -> Result<AckDecision, PaymentGatewayError> {
        warn!("🔄️🪝️ Notification from {provider} failed verification: {failure}");
        self.db
            .record_event_failure(
                event_id,
                failure.kind.as_error_message(),
                failure.order_no.as_ref(),
                failure.trade_no.as_deref(),
            )
            .await?;
        let policy = self.policies.for_provider(provider);
        let decision = match failure.kind {
            // Nothing a redelivery of the same bytes could fix.
            FailureKind::Malformed => AckDecision::Ack,
            FailureKind::SignatureFailed => policy.on_signature_failure,
            FailureKind::DecryptFailed => policy.on_decrypt_failure,
        };
        Ok(decision)
    }

    /// Resolve the order a notification is about: by its order number when the payload carries
    /// one, falling back to a trade-number lookup.
    async fn resolve_order(
        &self,
        provider: PaymentProvider,
        notification: &VerifiedNotification,
    ) -> Result<Option<PaymentOrder>, PaymentGatewayError> {
        if let Some(order_no) = &notification.order_no {
            return self.db.fetch_order_by_order_no(order_no).await;
        }
        if let Some(trade_no) = &notification.trade_no {
            return self.db.fetch_order_by_trade_no(provider, trade_no).await;
        }
        Ok(None)
    }

    async fn call_order_paid_hook(&self, order: &PaymentOrder, provider: PaymentProvider) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔄️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone(), provider)).await;
        }
    }

    /// A snapshot read, used by webhook handlers that want to report back on the order they
    /// just settled.
    pub async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<PaymentOrder>, PaymentGatewayError> {
        self.db.fetch_order_by_order_no(order_no).await
    }
}
