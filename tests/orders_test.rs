mod common;

use axum::http::{Method, StatusCode};
use common::{first_item_id, id_of, quantity, sizes, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn order_creation_validates_items_and_customer() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Northwind").await;

    let order = app.create_order(&id_of(&customer)).await;
    assert_eq!(order["status"], "received");
    assert_eq!(order["customer_name"], "Northwind");
    assert_eq!(order["total_quantity"], 40);
    assert!(order["order_number"]
        .as_str()
        .unwrap_or_default()
        .starts_with("ORD"));
    assert_eq!(quantity(&order["items"][0]["sizes"], "M"), 20);

    let duplicate_sizes = app
        .admin(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_id": id_of(&customer),
                "items": [{ "style": "Tee", "unit_price": "2", "sizes": sizes(&[("M", 5), ("m", 5)]) }]
            })),
        )
        .await;
    assert_eq!(duplicate_sizes.status, StatusCode::BAD_REQUEST);

    let no_items = app
        .admin(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "customer_id": id_of(&customer), "items": [] })),
        )
        .await;
    assert_eq!(no_items.status, StatusCode::BAD_REQUEST);

    let unknown_customer = app
        .admin(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_id": Uuid::new_v4(),
                "items": [{ "style": "Tee", "unit_price": "2", "sizes": sizes(&[("M", 5)]) }]
            })),
        )
        .await;
    assert_eq!(unknown_customer.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown_customer.json()["error"], "Not Found");

    let beyond_i32 = app
        .admin(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_id": id_of(&customer),
                "items": [{
                    "style": "Tee",
                    "unit_price": "2",
                    "sizes": sizes(&[("M", 2_000_000_000), ("L", 2_000_000_000)])
                }]
            })),
        )
        .await;
    assert_eq!(beyond_i32.status, StatusCode::BAD_REQUEST, "{}", beyond_i32.text());
}

#[tokio::test]
async fn listing_filters_by_status_and_summarises_stages() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Harbor").await;
    let first = app.create_order(&id_of(&customer)).await;
    app.create_order(&id_of(&customer)).await;

    let cancelled = app
        .admin(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", id_of(&first)),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);

    let received = app
        .admin(Method::GET, "/api/v1/orders?status=received", None)
        .await;
    assert_eq!(received.status, StatusCode::OK, "{}", received.text());
    assert_eq!(received.data()["total"], 1);

    let all = app
        .admin(Method::GET, "/api/v1/orders?limit=1&page=2", None)
        .await;
    let page = all.data();
    assert_eq!(page["total"], 2);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));

    let summary = app
        .admin(Method::GET, "/api/v1/orders/summary/stages", None)
        .await;
    let counts = summary.data();
    let counts = counts.as_array().expect("stage counts");
    assert_eq!(counts.len(), 8);
    let count_of = |status: &str| {
        counts
            .iter()
            .find(|c| c["status"] == status)
            .and_then(|c| c["count"].as_u64())
    };
    assert_eq!(count_of("received"), Some(1));
    assert_eq!(count_of("cancelled"), Some(1));
    assert_eq!(count_of("invoiced"), Some(0));
}

#[tokio::test]
async fn sizes_cannot_shrink_below_cutting_work() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Sizes").await;
    let order = app.create_order(&id_of(&customer)).await;
    let item_id = first_item_id(&order);

    let cutting = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({ "order_item_id": item_id, "cutting_master": "Ravi", "sizes": sizes(&[("M", 12)]) })),
        )
        .await;
    assert_eq!(cutting.status, StatusCode::CREATED);

    let shrink = app
        .admin(
            Method::PUT,
            &format!("/api/v1/order-items/{}/sizes", item_id),
            Some(json!({ "sizes": sizes(&[("S", 10), ("M", 11), ("L", 10)]) })),
        )
        .await;
    assert_eq!(shrink.status, StatusCode::BAD_REQUEST);

    let dropped = app
        .admin(
            Method::PUT,
            &format!("/api/v1/order-items/{}/sizes", item_id),
            Some(json!({ "sizes": sizes(&[("S", 10), ("L", 10)]) })),
        )
        .await;
    assert_eq!(dropped.status, StatusCode::BAD_REQUEST);

    let grown = app
        .admin(
            Method::PUT,
            &format!("/api/v1/order-items/{}/sizes", item_id),
            Some(json!({ "sizes": sizes(&[("S", 10), ("M", 12), ("L", 10), ("XL", 6)]) })),
        )
        .await;
    assert_eq!(grown.status, StatusCode::OK, "{}", grown.text());
    assert_eq!(grown.data()["total_quantity"], 38);

    let added = app
        .admin(
            Method::POST,
            &format!("/api/v1/orders/{}/items", id_of(&order)),
            Some(json!({ "style": "Tee", "color": "White", "unit_price": "2.75", "sizes": sizes(&[("M", 30)]) })),
        )
        .await;
    assert_eq!(added.status, StatusCode::CREATED, "{}", added.text());

    let detail = app
        .admin(Method::GET, &format!("/api/v1/orders/{}", id_of(&order)), None)
        .await;
    assert_eq!(detail.data()["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(detail.data()["total_quantity"], 68);
}

#[tokio::test]
async fn deletes_respect_downstream_work() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Deletes").await;
    let customer_id = id_of(&customer);
    let fresh = app.create_order(&customer_id).await;
    let started = app.create_order(&customer_id).await;

    app.admin(
        Method::POST,
        "/api/v1/cutting-assignments",
        Some(json!({
            "order_item_id": first_item_id(&started),
            "cutting_master": "Ravi",
            "sizes": sizes(&[("S", 1)])
        })),
    )
    .await;

    let in_cutting = app
        .admin(Method::DELETE, &format!("/api/v1/orders/{}", id_of(&started)), None)
        .await;
    assert_eq!(in_cutting.status, StatusCode::BAD_REQUEST);

    let customer_busy = app
        .admin(Method::DELETE, &format!("/api/v1/customers/{}", customer_id), None)
        .await;
    assert_eq!(customer_busy.status, StatusCode::CONFLICT);

    let removed = app
        .admin(Method::DELETE, &format!("/api/v1/orders/{}", id_of(&fresh)), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let gone = app
        .admin(Method::GET, &format!("/api/v1/orders/{}", id_of(&fresh)), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    // numbering continues past the surviving order instead of reusing its number
    let next = app.create_order(&customer_id).await;
    let number_of = |order: &serde_json::Value| {
        order["order_number"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    };
    assert_ne!(number_of(&next), number_of(&started));
    assert!(number_of(&next) > number_of(&started));
}

#[tokio::test]
async fn order_search_treats_wildcards_literally() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Wildcards").await;
    app.create_order(&id_of(&customer)).await;
    app.create_order(&id_of(&customer)).await;

    let dashed = app.admin(Method::GET, "/api/v1/orders?search=ORD-", None).await;
    assert_eq!(dashed.status, StatusCode::OK, "{}", dashed.text());
    assert_eq!(dashed.data()["total"], 2);

    let underscore = app.admin(Method::GET, "/api/v1/orders?search=ORD_", None).await;
    assert_eq!(underscore.data()["total"], 0);

    let percent = app.admin(Method::GET, "/api/v1/orders?search=%25", None).await;
    assert_eq!(percent.data()["total"], 0);
}

#[tokio::test]
async fn customers_are_searchable_and_editable() {
    let app = TestApp::new().await;
    let northwind = app.create_customer("Northwind").await;
    app.create_customer("Blue Harbor").await;

    let found = app
        .admin(Method::GET, "/api/v1/customers?search=harb", None)
        .await;
    assert_eq!(found.data()["total"], 1);
    assert_eq!(found.data()["items"][0]["name"], "Blue Harbor");

    let blank = app
        .admin(Method::POST, "/api/v1/customers", Some(json!({ "name": "   " })))
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let updated = app
        .admin(
            Method::PUT,
            &format!("/api/v1/customers/{}", id_of(&northwind)),
            Some(json!({ "contact_person": "Maya Lin", "phone": "+1 555 0100" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.data()["contact_person"], "Maya Lin");
    assert_eq!(updated.data()["name"], "Northwind");

    let bad_email = app
        .admin(
            Method::POST,
            "/api/v1/customers",
            Some(json!({ "name": "Broken", "email": "not-an-email" })),
        )
        .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);

    let removed = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/customers/{}", id_of(&northwind)),
            None,
        )
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
}
