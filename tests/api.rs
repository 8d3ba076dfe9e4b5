//! HTTP facade tests: routing, envelopes and error mapping.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use boxoffice_server::engine::{LockConfig, OrderEngine, PaymentProviderRegistry};
use boxoffice_server::models::{Event, Item, Organizer, Quota};
use boxoffice_server::routes::create_routes;
use boxoffice_server::store::EventStore;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store: Arc<EventStore>,
    event_id: Uuid,
    item_id: Uuid,
}

fn test_app() -> TestApp {
    let store = Arc::new(EventStore::new());
    let organizer_id = Uuid::new_v4();
    store.insert_organizer(Organizer {
        id: organizer_id,
        name: "Rust Events".into(),
        slug: "rust-events".into(),
    });
    let event_id = Uuid::new_v4();
    store.insert_event(Event {
        id: event_id,
        organizer_id,
        name: "RustConf".into(),
        slug: "rustconf".into(),
        currency: "EUR".into(),
        currency_places: 2,
        has_subevents: false,
        testmode: false,
        sales_channels: vec!["web".into()],
        payment_term_days: 14,
        invoice_immediately: false,
    });
    let item_id = Uuid::new_v4();
    store.insert_item(Item {
        id: item_id,
        event_id,
        name: "Conference ticket".into(),
        default_price: dec!(23.00),
        free_price: false,
        active: true,
        requires_seat: false,
        tax_rule_id: None,
        variations: vec![],
    });
    store.insert_quota(Quota {
        id: Uuid::new_v4(),
        event_id,
        subevent_id: None,
        name: "General admission".into(),
        size: Some(5),
        items: HashSet::from([item_id]),
        variations: HashSet::new(),
    });

    let engine = Arc::new(OrderEngine::new(
        Arc::clone(&store),
        PaymentProviderRegistry::with_defaults(),
        LockConfig::default(),
    ));
    TestApp {
        router: create_routes(engine),
        store,
        event_id,
        item_id,
    }
}

fn post_order(event_id: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/events/{event_id}/orders"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = test_app();
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-content-type-options"));
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], json!("ok"));
}

#[tokio::test]
async fn creating_an_order_returns_201_with_the_aggregate() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_order(
            app.event_id,
            json!({
                "email": "buyer@example.org",
                "positions": [{"item": app.item_id}],
                "status": "paid",
                "payment_provider": "banktransfer"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["kind"], json!("persisted"));
    assert_eq!(body["data"]["order"]["status"], json!("paid"));
    assert_eq!(body["data"]["order"]["total"], json!("23.00"));
    assert_eq!(app.store.order_count(), 1);
}

#[tokio::test]
async fn simulate_returns_a_draft_and_persists_nothing() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_order(
            app.event_id,
            json!({
                "positions": [{"item": app.item_id}],
                "simulate": true
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["kind"], json!("draft"));
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn validation_problems_come_back_as_structured_details() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_order(
            app.event_id,
            json!({
                "positions": [{"item": Uuid::new_v4()}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    let details = &body["error"]["details"];
    assert_eq!(details["positions"][0]["index"], json!(0));
    assert_eq!(
        details["positions"][0]["error"]["code"],
        json!("unknown_item")
    );
}

#[tokio::test]
async fn unknown_events_map_to_404() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_order(
            Uuid::new_v4(),
            json!({"positions": [{"item": app.item_id}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}
