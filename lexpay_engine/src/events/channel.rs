use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// One event channel with a single async handler function. Handlers are stateless; all they get
/// is the event itself.
pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then drains outstanding handler tasks.
    ///
    /// Each event is handled on its own task, so one slow consumer invocation cannot hold up the
    /// events queued behind it.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // The internal sender must go, otherwise the channel never closes.
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                received = self.listener.recv() => match received {
                    Some(event) => {
                        trace!("📬️ Handling event");
                        let handler = Arc::clone(&self.handler);
                        in_flight.spawn(async move {
                            (handler)(event).await;
                            trace!("📬️ Event handled");
                        });
                    },
                    None => break,
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {},
            }
        }
        debug!("📬️ Channel closed. Waiting for {} in-flight handlers to complete", in_flight.len());
        while in_flight.join_next().await.is_some() {}
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Delivery failure is logged and swallowed. An event must never propagate an error back into
    /// the webhook response path.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn events_from_multiple_producers_all_arrive() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = Arc::clone(&count);
        let handler = Arc::new(move |v: u64| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(v, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5u64 {
                producer_1.publish_event(i * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5u64 {
                producer_2.publish_event(i * 2).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(c2.load(Ordering::SeqCst), 45);
    }

    #[tokio::test]
    async fn all_events_are_drained_after_the_last_producer_drops() {
        let count = Arc::new(AtomicU64::new(0));
        let c2 = Arc::clone(&count);
        let handler = Arc::new(move |_: u64| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                count.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(4, handler);
        let producer = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..20u64 {
                producer.publish_event(i).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(c2.load(Ordering::SeqCst), 20);
    }
}
