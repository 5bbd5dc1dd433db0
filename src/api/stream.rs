use std::convert::Infallible;
use std::sync::Arc;
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::Json;
use futures::{Stream, StreamExt};
use log::{debug, error, info};

use crate::api::AppState;
use crate::data::{Publisher, Subscriber};

/// Unregisters and stops a subscriber once its response stream is dropped,
/// whether the client disconnected or the game ended.
struct SubscriptionGuard {
    publisher: Arc<Publisher>,
    subscriber: Arc<Subscriber>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscriber.stop();
        self.publisher.unsubscribe(&self.subscriber);
        info!("Stream closed for subscriber {}", self.subscriber.uid());
    }
}

// GET /stream - Open a subscriber and stream events as server-sent events
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let publisher = state.controller.publisher().clone();
    let subscriber = publisher.new_subscriber();
    publisher.subscribe(subscriber.clone());
    info!("Stream opened for subscriber {}", subscriber.uid());

    // Replay current progress before any live update can be consumed
    if let Err(e) = state.controller.catch_up(subscriber.uid()).await {
        error!("Failed to replay state to subscriber {}: {}", subscriber.uid(), e);
    }

    let guard = SubscriptionGuard {
        publisher,
        subscriber: subscriber.clone(),
    };

    let events = subscriber.listen().map(move |payload| {
        debug!("Sending to {}: {}", guard.subscriber.uid(), payload);
        Ok::<_, Infallible>(SseEvent::default().data(payload))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

// GET /health - Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "market_feed",
        "timestamp": chrono::Utc::now(),
        "subscribers": state.controller.publisher().subscriber_count(),
    }))
}
