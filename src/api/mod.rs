pub mod admin;
pub mod stream;

use std::sync::Arc;
use axum::routing::{get, post};
use axum::Router;

use crate::data::MarketController;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<MarketController>,
}

pub fn admin_prefix(admin_secret: &str) -> String {
    format!("/__admin__/{}", admin_secret)
}

// Create the public stream routes and the secret-prefixed admin routes
pub fn create_router(state: AppState, admin_secret: &str) -> Router {
    let admin_routes = Router::new()
        .route("/service_info", get(admin::service_info))
        .route("/next_round", post(admin::next_round))
        .route("/publish_news", post(admin::publish_news))
        .route("/edit_round", post(admin::edit_round))
        .route("/go_to_step/:step", post(admin::go_to_step))
        .route("/finish_game", post(admin::finish_game))
        .route("/reset", post(admin::reset));

    Router::new()
        .route("/stream", get(stream::stream_events))
        .route("/health", get(stream::health_check))
        .nest(&admin_prefix(admin_secret), admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::data::market::sample_rounds;
    use crate::data::{Publisher, StockMarket, SubscriberSettings};

    const SECRET: &str = "test-secret";

    fn app(rounds: usize) -> (Router, Arc<MarketController>) {
        let market = StockMarket::new(Box::new(sample_rounds(rounds))).unwrap();
        let publisher = Arc::new(Publisher::new(SubscriberSettings::default()));
        let controller = Arc::new(MarketController::new(market, publisher));
        let router = create_router(AppState { controller: controller.clone() }, SECRET);
        (router, controller)
    }

    fn admin_post(path: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("{}{}", admin_prefix(SECRET), path))
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_next_round_success_then_warning() {
        let (router, _) = app(2);

        let response = router.clone().oneshot(admin_post("/next_round", Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "success");

        let response = router.oneshot(admin_post("/next_round", Body::empty())).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "warning");
        assert_eq!(body["message"], "Already at last round");
    }

    #[tokio::test]
    async fn test_admin_routes_require_secret() {
        let (router, _) = app(2);
        let request = Request::builder()
            .method("POST")
            .uri("/__admin__/wrong/next_round")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_round_reports_structured_errors() {
        let (router, _) = app(3);

        let response = router.clone()
            .oneshot(admin_post("/edit_round", Body::from("{not json")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "error");

        let body = r#"{"round_number": 9, "news": ["late"]}"#;
        let response = router.clone().oneshot(admin_post("/edit_round", Body::from(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].as_str().unwrap().contains("exceeds"));

        let body = r#"{"round_number": 1, "chart_data": {"Apple": 1, "Google": 2}}"#;
        let response = router.oneshot(admin_post("/edit_round", Body::from(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Round 1 updated successfully");
    }

    #[tokio::test]
    async fn test_go_to_step_and_service_info() {
        let (router, _) = app(5);

        let response = router.clone().oneshot(admin_post("/go_to_step/3", Body::empty())).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["current_step"], 3);

        let response = router.clone().oneshot(admin_post("/go_to_step/-1", Body::empty())).await.unwrap();
        assert_eq!(json_body(response).await["status"], "error");

        let response = router.clone().oneshot(admin_post("/go_to_step/abc", Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("abc"));

        let request = Request::builder()
            .uri(format!("{}/service_info", admin_prefix(SECRET)))
            .body(Body::empty())
            .unwrap();
        let info = json_body(router.oneshot(request).await.unwrap()).await;
        assert_eq!(info["current_round_number"], 3);
        assert_eq!(info["current_news_round"], 2);
        assert_eq!(info["available_currencies"][0], "Apple");
    }

    #[tokio::test]
    async fn test_stream_replays_state_and_ends_on_finish() {
        let (router, controller) = app(3);
        controller.next_round().await.unwrap();

        let request = Request::builder().uri("/stream").body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(controller.publisher().subscriber_count(), 1);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert!(first.starts_with("data: "));
        assert!(first.contains("\"data_type\":\"chart\""));
        assert!(first.contains("\"1\""));

        let response = router.oneshot(admin_post("/finish_game", Body::empty())).await.unwrap();
        assert_eq!(json_body(response).await["status"], "success");

        // the stream drains and closes; releasing the body unregisters the subscriber
        while let Some(chunk) = body.next().await {
            chunk.unwrap();
        }
        drop(body);
        assert_eq!(controller.publisher().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_unsubscribes() {
        let (router, controller) = app(3);

        let request = Request::builder().uri("/stream").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(controller.publisher().subscriber_count(), 1);

        drop(response);
        assert_eq!(controller.publisher().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (router, _) = app(1);
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let body = json_body(router.oneshot(request).await.unwrap()).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["subscribers"], 0);
    }
}
