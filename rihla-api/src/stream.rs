use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::Stream;
use rihla_booking::SubscriberScope;
use rihla_core::{ensure, Capability, Principal, ResourceOwner};
use rihla_shared::ProviderId;
use tokio_stream::StreamExt;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/providers/{id}/events", get(provider_events))
}

/// GET /v1/providers/{id}/events
/// Live booking events for one provider. Delivery is at-most-once; a client
/// that falls behind misses events rather than stalling the bus.
async fn provider_events(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(provider_id): Path<ProviderId>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    ensure(
        &principal,
        Capability::ViewProviderBookings,
        Some(&ResourceOwner::provider(provider_id)),
    )?;

    let subscription = state.dispatcher.subscribe(SubscriberScope::Provider(provider_id));
    tracing::info!(%provider_id, subscriber = %principal.id, "Event stream opened");

    let events = subscription
        .into_stream()
        .map(|event| Event::default().event(event.kind.name()).json_data(&event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
