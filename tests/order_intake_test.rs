//! Integration tests for order intake: cart validation, server-side
//! pricing, gateway handoff, and failure disposition.

mod common;

use axum::http::Method;
use common::{response_json, TestApp};
use serde_json::json;

fn cart(product_id: impl ToString, quantity: i64) -> serde_json::Value {
    json!({
        "buyer": {
            "name": "Asha Rao",
            "email": "asha@example.com",
            "phone": "+919800000000"
        },
        "items": [{
            "product_id": product_id.to_string(),
            "quantity": quantity
        }]
    })
}

#[tokio::test]
async fn create_order_prices_cart_from_catalog() {
    let app = TestApp::new().await;
    let candle = app.seed_product("candle-1", 49_900, 10).await;

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(cart(candle.id, 2)))
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    assert!(body["success"].as_bool().unwrap());
    let data = &body["data"];
    assert_eq!(data["amount_minor"], 99_800);
    assert_eq!(data["currency"], "INR");
    assert_eq!(data["gateway_order_id"], "order_mock0000");
    assert!(data["order_id"].as_str().is_some());
    assert!(data["gateway_key_id"].as_str().is_some());

    // The remote order was minted for the same amount
    assert_eq!(app.gateway.calls(), 1);
    let remote = app.gateway.last_request().unwrap();
    assert_eq!(remote.amount_minor, 99_800);
    assert_eq!(remote.currency, "INR");

    // Stock is checked but not decremented at intake
    assert_eq!(app.product_stock(candle.id).await, 10);
}

#[tokio::test]
async fn client_supplied_prices_are_ignored() {
    let app = TestApp::new().await;
    let candle = app.seed_product("candle-1", 49_900, 10).await;

    // A hostile client smuggles price fields into the payload
    let payload = json!({
        "buyer": { "name": "Asha Rao", "email": "asha@example.com" },
        "items": [{
            "product_id": candle.id.to_string(),
            "quantity": 2,
            "unit_price_minor": 1,
            "price": 1
        }],
        "amount_minor": 5
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload))
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    assert_eq!(body["data"]["amount_minor"], 99_800);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;

    let payload = json!({
        "buyer": { "name": "Asha Rao", "email": "asha@example.com" },
        "items": []
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload))
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let app = TestApp::new().await;
    let candle = app.seed_product("candle-1", 49_900, 10).await;

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(cart(candle.id, 0)))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unknown_product_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(cart(uuid::Uuid::new_v4(), 1)),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn inactive_product_is_rejected() {
    let app = TestApp::new().await;
    let retired = app.seed_product_with("retired-1", 9_900, 5, false).await;

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(cart(retired.id, 1)))
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn insufficient_stock_is_rejected() {
    let app = TestApp::new().await;
    let candle = app.seed_product("candle-1", 49_900, 1).await;

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(cart(candle.id, 2)))
        .await;
    assert_eq!(response.status(), 422);
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn gateway_failure_leaves_no_payable_order() {
    let app = TestApp::new().await;
    let candle = app.seed_product("candle-1", 49_900, 10).await;
    app.gateway.set_fail(true);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(cart(candle.id, 2)))
        .await;
    assert_eq!(response.status(), 502);

    // The only order on file is failed and carries no gateway order id
    let list = app.request(Method::GET, "/api/v1/orders", None).await;
    let body = response_json(list).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], "failed");
    assert!(items[0]["gateway_order_id"].is_null());

    // Stock untouched
    assert_eq!(app.product_stock(candle.id).await, 10);
}

#[tokio::test]
async fn get_order_returns_items_with_captured_prices() {
    let app = TestApp::new().await;
    let candle = app.seed_product("candle-1", 49_900, 10).await;
    let soap = app.seed_product("soap-3", 12_500, 4).await;

    let payload = json!({
        "buyer": { "name": "Asha Rao", "email": "asha@example.com" },
        "items": [
            { "product_id": candle.id.to_string(), "quantity": 2 },
            { "product_id": soap.id.to_string(), "quantity": 1 }
        ]
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload))
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["amount_minor"], 112_300);

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["status"], "created");
    assert_eq!(data["items"].as_array().unwrap().len(), 2);

    let candle_line = data["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["sku"] == "candle-1")
        .unwrap();
    assert_eq!(candle_line["unit_price_minor"], 49_900);
    assert_eq!(candle_line["line_total_minor"], 99_800);
}

#[tokio::test]
async fn get_unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}
