mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        other => Decimal::from_str(&other.to_string()).expect("decimal number"),
    }
}

async fn create_item(app: &TestApp, sku: &str, reorder_level: &str, opening: &str) -> Value {
    let response = app
        .admin(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({
                "sku": sku,
                "name": format!("Item {}", sku),
                "category": "fabric",
                "unit": "m",
                "reorder_level": reorder_level,
                "unit_cost": "2.50",
                "opening_quantity": opening
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
    response.data()
}

#[tokio::test]
async fn stock_adjustments_keep_a_ledger_and_never_go_negative() {
    let app = TestApp::new().await;
    let item = create_item(&app, "FAB-01", "10", "100").await;
    let item_id = id_of(&item);
    assert_eq!(decimal(&item["quantity_on_hand"]), Decimal::from(100));

    let issue = app
        .admin(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", item_id),
            Some(json!({ "quantity": "-30", "reason": "issued to cutting", "reference": "ORD-1" })),
        )
        .await;
    assert_eq!(issue.status, StatusCode::OK, "{}", issue.text());
    assert_eq!(decimal(&issue.data()["item"]["quantity_on_hand"]), Decimal::from(70));

    let overdraw = app
        .admin(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", item_id),
            Some(json!({ "quantity": "-71", "reason": "issued to cutting" })),
        )
        .await;
    assert_eq!(overdraw.status, StatusCode::UNPROCESSABLE_ENTITY);

    let zero = app
        .admin(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", item_id),
            Some(json!({ "quantity": "0", "reason": "nothing" })),
        )
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let movements = app
        .admin(
            Method::GET,
            &format!("/api/v1/inventory/{}/movements", item_id),
            None,
        )
        .await;
    let movements = movements.data();
    let movements = movements.as_array().expect("movements");
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().any(|m| m["reason"] == "opening"));
    assert!(movements.iter().any(|m| m["reference"] == "ORD-1"));

    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({
                "sku": "fab-01",
                "name": "Again",
                "unit": "m",
                "reorder_level": "0",
                "unit_cost": "0",
                "opening_quantity": "0"
            })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn low_stock_filter_and_search() {
    let app = TestApp::new().await;
    create_item(&app, "THR-01", "8", "5").await;
    create_item(&app, "FAB-02", "10", "100").await;

    let low = app
        .admin(Method::GET, "/api/v1/inventory?low_stock=true", None)
        .await;
    assert_eq!(low.status, StatusCode::OK, "{}", low.text());
    let page = low.data();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["sku"], "THR-01");

    let searched = app
        .admin(Method::GET, "/api/v1/inventory?search=fab", None)
        .await;
    assert_eq!(searched.data()["total"], 1);
    assert_eq!(searched.data()["items"][0]["sku"], "FAB-02");
}

#[tokio::test]
async fn csv_import_is_all_or_nothing() {
    let app = TestApp::new().await;

    let bad = b"sku,name,category,unit,reorder_level,unit_cost,opening_quantity\n\
                BTN-01,Button,trims,piece,100,0.02,500\n\
                ZIP-01,Zip,trims,piece,abc,0.30,10\n"
        .to_vec();
    let rejected = app
        .raw(
            Method::POST,
            "/api/v1/inventory/import",
            "text/csv",
            bad,
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert!(rejected.json()["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Row 3"));

    let empty = app.admin(Method::GET, "/api/v1/inventory", None).await;
    assert_eq!(empty.data()["total"], 0);

    let good = b"sku,name,category,unit,reorder_level,unit_cost,opening_quantity\n\
                 BTN-01,Button,trims,piece,100,0.02,500\n\
                 ZIP-01,Zip,trims,piece,20,0.30,\n"
        .to_vec();
    let imported = app
        .raw(
            Method::POST,
            "/api/v1/inventory/import",
            "text/csv",
            good,
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(imported.status, StatusCode::CREATED, "{}", imported.text());
    assert_eq!(imported.data()["created"], 2);

    let template = app
        .admin(Method::GET, "/api/v1/artifacts/templates/inventory", None)
        .await;
    assert_eq!(template.status, StatusCode::OK);
    assert!(template
        .text()
        .starts_with("sku,name,category,unit,reorder_level,unit_cost,opening_quantity"));
}

#[tokio::test]
async fn goods_receipt_moves_accepted_pieces_into_stock() {
    let app = TestApp::new().await;
    let item = create_item(&app, "FAB-PQ", "10", "0").await;
    let item_id = id_of(&item);

    let po = app
        .admin(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "Coastal Mills",
                "lines": [{ "inventory_item_id": item_id, "ordered_quantity": "100", "unit_cost": "3.40" }]
            })),
        )
        .await;
    assert_eq!(po.status, StatusCode::CREATED, "{}", po.text());
    let po = po.data();
    let po_id = id_of(&po);
    let line_id = id_of(&po["lines"][0]);
    assert_eq!(po["status"], "open");
    assert!(po["po_number"].as_str().unwrap_or_default().starts_with("PO"));

    let first = app
        .admin(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/receipts", po_id),
            Some(json!({
                "lines": [{ "purchase_order_line_id": line_id, "received_quantity": "60", "rejected_quantity": "5" }]
            })),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.text());
    let receipt = first.data();
    assert_eq!(receipt["received_by"], "Factory Admin");
    assert_eq!(decimal(&receipt["lines"][0]["accepted_quantity"]), Decimal::from(55));

    let stocked = app
        .admin(Method::GET, &format!("/api/v1/inventory/{}", item_id), None)
        .await;
    assert_eq!(decimal(&stocked.data()["quantity_on_hand"]), Decimal::from(55));

    let partial = app
        .admin(Method::GET, &format!("/api/v1/purchase-orders/{}", po_id), None)
        .await;
    assert_eq!(partial.data()["status"], "partially_received");

    let cancel = app
        .admin(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/cancel", po_id),
            None,
        )
        .await;
    assert_eq!(cancel.status, StatusCode::BAD_REQUEST);

    let too_much = app
        .admin(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/receipts", po_id),
            Some(json!({
                "lines": [{ "purchase_order_line_id": line_id, "received_quantity": "41" }]
            })),
        )
        .await;
    assert_eq!(too_much.status, StatusCode::BAD_REQUEST);

    let rest = app
        .admin(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/receipts", po_id),
            Some(json!({
                "received_by": "Gate 2",
                "lines": [{ "purchase_order_line_id": line_id, "received_quantity": "40" }]
            })),
        )
        .await;
    assert_eq!(rest.status, StatusCode::CREATED, "{}", rest.text());

    let done = app
        .admin(Method::GET, &format!("/api/v1/purchase-orders/{}", po_id), None)
        .await;
    assert_eq!(done.data()["status"], "received");

    let receipts = app
        .admin(
            Method::GET,
            &format!("/api/v1/purchase-orders/{}/receipts", po_id),
            None,
        )
        .await;
    assert_eq!(receipts.data().as_array().map(Vec::len), Some(2));

    let on_order = app
        .admin(Method::DELETE, &format!("/api/v1/inventory/{}", item_id), None)
        .await;
    assert_eq!(on_order.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn open_purchase_orders_can_be_cancelled() {
    let app = TestApp::new().await;
    let item = create_item(&app, "TRM-01", "0", "0").await;

    let po = app
        .admin(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "Trim House",
                "lines": [{ "inventory_item_id": id_of(&item), "ordered_quantity": "10", "unit_cost": "1" }]
            })),
        )
        .await;
    let po_id = id_of(&po.data());

    let cancelled = app
        .admin(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/cancel", po_id),
            None,
        )
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.data()["status"], "cancelled");

    let receive = app
        .admin(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/receipts", po_id),
            Some(json!({
                "lines": [{ "purchase_order_line_id": id_of(&po.data()["lines"][0]), "received_quantity": "1" }]
            })),
        )
        .await;
    assert_eq!(receive.status, StatusCode::BAD_REQUEST);

    let empty = app
        .admin(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({ "supplier_name": "Nobody", "lines": [] })),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}
