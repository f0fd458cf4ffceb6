use async_trait::async_trait;
use rihla_core::{EventPublisher, PublishError};
use rihla_shared::{BookingEvent, ProviderId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberScope {
    /// Events for items owned by this provider.
    Provider(ProviderId),
    /// Every event.
    Admin,
}

impl SubscriberScope {
    pub fn accepts(&self, event: &BookingEvent) -> bool {
        match self {
            SubscriberScope::Provider(id) => event.provider_id == *id,
            SubscriberScope::Admin => true,
        }
    }
}

/// Fans booking lifecycle events out to in-process subscribers and to any
/// downstream sinks. Delivery is best-effort: a full or absent audience
/// never fails the caller.
pub struct NotificationDispatcher {
    tx: broadcast::Sender<BookingEvent>,
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl NotificationDispatcher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            sinks: Vec::new(),
        }
    }

    /// Forward every dispatched event to `sink` as well.
    pub fn with_sink(mut self, sink: Arc<dyn EventPublisher>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn subscribe(&self, scope: SubscriberScope) -> Subscription {
        Subscription {
            scope,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn dispatch(&self, event: &BookingEvent) {
        // No receivers is fine
        let delivered = self.tx.send(event.clone()).unwrap_or(0);
        tracing::debug!(
            booking_id = %event.booking_id,
            kind = ?event.kind,
            delivered,
            "Booking event dispatched"
        );

        for sink in &self.sinks {
            let sink = sink.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.publish(&event).await {
                    tracing::warn!("Dropping {:?} for booking {}: {}", event.kind, event.booking_id, e);
                }
            });
        }
    }
}

#[async_trait]
impl EventPublisher for NotificationDispatcher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        self.dispatch(event);
        Ok(())
    }
}

/// A scoped view of the event bus. Events missed while lagging are skipped.
pub struct Subscription {
    scope: SubscriberScope,
    rx: broadcast::Receiver<BookingEvent>,
}

impl Subscription {
    pub fn scope(&self) -> SubscriberScope {
        self.scope
    }

    /// Next event in scope, or `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<BookingEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.scope.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Subscriber {:?} lagged; skipped {} events", self.scope, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = BookingEvent> + Send + 'static {
        let scope = self.scope;
        BroadcastStream::new(self.rx).filter_map(move |msg| match msg {
            Ok(event) if scope.accepts(&event) => Some(event),
            _ => None,
        })
    }
}
