mod common;

use axum::http::{Method, StatusCode};
use common::{first_item_id, id_of, sizes, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

fn size_field(list: &Value, size: &str, field: &str) -> i64 {
    list.as_array()
        .into_iter()
        .flatten()
        .filter(|row| row["size"].as_str() == Some(size))
        .filter_map(|row| row[field].as_i64())
        .sum()
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        other => Decimal::from_str(&other.to_string()).expect("decimal number"),
    }
}

/// Customer, order, full cut, one batch; returns (order id, item id, cutting id, batch assignment id)
async fn order_in_stitching(app: &TestApp) -> (String, String, String, String) {
    let customer = app.create_customer("Northwind").await;
    let order = app.create_order(&id_of(&customer)).await;
    let order_id = id_of(&order);
    let item_id = first_item_id(&order);

    let cutting = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({
                "order_item_id": item_id,
                "cutting_master": "Ravi",
                "sizes": sizes(&[("S", 10), ("M", 20), ("L", 10)])
            })),
        )
        .await;
    assert_eq!(cutting.status, StatusCode::CREATED, "{}", cutting.text());
    let cutting_id = id_of(&cutting.data());

    let cut = app
        .admin(
            Method::PUT,
            &format!("/api/v1/cutting-assignments/{}/cut", cutting_id),
            Some(json!({ "sizes": sizes(&[("S", 10), ("M", 20), ("L", 10)]) })),
        )
        .await;
    assert_eq!(cut.status, StatusCode::OK, "{}", cut.text());

    let batch = app.create_batch("Line A").await;
    let assigned = app
        .admin(
            Method::POST,
            "/api/v1/batch-assignments",
            Some(json!({
                "order_item_id": item_id,
                "allocations": [{
                    "batch_id": id_of(&batch),
                    "sizes": sizes(&[("S", 10), ("M", 20), ("L", 10)])
                }]
            })),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::CREATED, "{}", assigned.text());
    let assignment_id = id_of(&assigned.data()[0]);

    (order_id, item_id, cutting_id, assignment_id)
}

#[tokio::test]
async fn order_travels_from_receipt_to_invoice() {
    let app = TestApp::new().await;
    let (order_id, item_id, _, assignment_id) = order_in_stitching(&app).await;
    assert_eq!(app.order_status(&order_id).await, "stitching");

    let qc = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({
                "remarks": "first pass",
                "entries": [
                    { "size": "S", "approved": 9, "rejected": 1 },
                    { "size": "M", "approved": 20, "rejected": 0 },
                    { "size": "L", "approved": 10, "rejected": 0 }
                ]
            })),
        )
        .await;
    assert_eq!(qc.status, StatusCode::CREATED, "{}", qc.text());
    let result = qc.data();
    assert_eq!(result["assignment"]["status"], "completed");
    assert_eq!(result["progress"]["total"]["approved"], 39);
    assert_eq!(result["progress"]["total"]["rejected"], 1);
    assert_eq!(result["records"][0]["reviewed_by"], "Factory Admin");
    assert_eq!(app.order_status(&order_id).await, "quality_check");

    let progress = app
        .admin(
            Method::GET,
            &format!("/api/v1/order-items/{}/qc-progress", item_id),
            None,
        )
        .await;
    assert_eq!(progress.status, StatusCode::OK);
    assert_eq!(progress.data()["total"]["pending"], 0);

    for next in ["packed", "dispatched"] {
        let moved = app
            .admin(
                Method::PUT,
                &format!("/api/v1/orders/{}/status", order_id),
                Some(json!({ "status": next })),
            )
            .await;
        assert_eq!(moved.status, StatusCode::OK, "{}", moved.text());
    }

    let invoice = app
        .admin(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({ "order_id": order_id, "tax_rate": "0.05" })),
        )
        .await;
    assert_eq!(invoice.status, StatusCode::CREATED, "{}", invoice.text());
    let invoice = invoice.data();
    assert_eq!(invoice["status"], "draft");
    assert_eq!(decimal(&invoice["subtotal"]), Decimal::from(200));
    assert_eq!(decimal(&invoice["tax_amount"]), Decimal::from(10));
    assert_eq!(decimal(&invoice["total"]), Decimal::from(210));
    assert_eq!(invoice["lines"][0]["quantity"], 40);
    assert!(invoice["invoice_number"]
        .as_str()
        .unwrap_or_default()
        .starts_with("INV"));

    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let invoice_id = id_of(&invoice);
    let issued = app
        .admin(
            Method::POST,
            &format!("/api/v1/invoices/{}/issue", invoice_id),
            None,
        )
        .await;
    assert_eq!(issued.status, StatusCode::OK, "{}", issued.text());
    assert_eq!(issued.data()["status"], "issued");
    assert_eq!(app.order_status(&order_id).await, "invoiced");

    let paid = app
        .admin(
            Method::POST,
            &format!("/api/v1/invoices/{}/pay", invoice_id),
            None,
        )
        .await;
    assert_eq!(paid.data()["status"], "paid");

    let cancel_paid = app
        .admin(
            Method::POST,
            &format!("/api/v1/invoices/{}/cancel", invoice_id),
            None,
        )
        .await;
    assert_eq!(cancel_paid.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cutting_cannot_exceed_the_ordered_sizes() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Blue Harbor").await;
    let order = app.create_order(&id_of(&customer)).await;
    let item_id = first_item_id(&order);

    let too_many = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({
                "order_item_id": item_id,
                "cutting_master": "Ravi",
                "sizes": sizes(&[("M", 21)])
            })),
        )
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    let unknown = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({
                "order_item_id": item_id,
                "cutting_master": "Ravi",
                "sizes": sizes(&[("XXL", 1)])
            })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.order_status(&id_of(&order)).await, "received");

    let first = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({
                "order_item_id": item_id,
                "cutting_master": "Ravi",
                "sizes": sizes(&[("M", 15)])
            })),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let rest_of_m = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({
                "order_item_id": item_id,
                "cutting_master": "Lena",
                "sizes": sizes(&[("m", 6)])
            })),
        )
        .await;
    assert_eq!(rest_of_m.status, StatusCode::BAD_REQUEST);

    let summary = app
        .admin(
            Method::GET,
            &format!("/api/v1/order-items/{}/cutting-summary", item_id),
            None,
        )
        .await;
    assert_eq!(summary.status, StatusCode::OK);
    let summary = summary.data();
    assert_eq!(summary["total_ordered"], 40);
    assert_eq!(summary["total_assigned"], 15);
    assert_eq!(summary["total_cut"], 0);
}

#[tokio::test]
async fn cutting_master_reassignment_splits_by_remaining_pieces() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Harbor").await;
    let order = app.create_order(&id_of(&customer)).await;
    let item_id = first_item_id(&order);

    let created = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({
                "order_item_id": item_id,
                "cutting_master": "Ravi",
                "sizes": sizes(&[("S", 10), ("M", 20), ("L", 10)])
            })),
        )
        .await;
    let source_id = id_of(&created.data());

    let moved = app
        .admin(
            Method::POST,
            &format!("/api/v1/cutting-assignments/{}/reassign", source_id),
            Some(json!({ "cutting_master": "Lena", "pieces": { "total": 8 } })),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK, "{}", moved.text());
    let target = moved.data();
    assert_eq!(target["cutting_master"], "Lena");
    assert_eq!(size_field(&target["sizes"], "S", "assigned"), 2);
    assert_eq!(size_field(&target["sizes"], "M", "assigned"), 4);
    assert_eq!(size_field(&target["sizes"], "L", "assigned"), 2);

    let same_master = app
        .admin(
            Method::POST,
            &format!("/api/v1/cutting-assignments/{}/reassign", source_id),
            Some(json!({ "cutting_master": "ravi", "pieces": { "total": 1 } })),
        )
        .await;
    assert_eq!(same_master.status, StatusCode::BAD_REQUEST);

    let listed = app
        .admin(
            Method::GET,
            &format!("/api/v1/order-items/{}/cutting", item_id),
            None,
        )
        .await;
    let assignments = listed.data();
    let assignments = assignments.as_array().expect("list");
    assert_eq!(assignments.len(), 2);
    let ravi = assignments
        .iter()
        .find(|a| a["cutting_master"] == "Ravi")
        .expect("source assignment");
    assert_eq!(size_field(&ravi["sizes"], "M", "assigned"), 16);
}

#[tokio::test]
async fn cut_totals_cannot_drop_below_batch_holdings() {
    let app = TestApp::new().await;
    let (_, item_id, cutting_id, _) = order_in_stitching(&app).await;

    let shrink = app
        .admin(
            Method::PUT,
            &format!("/api/v1/cutting-assignments/{}/cut", cutting_id),
            Some(json!({ "sizes": sizes(&[("M", 5)]) })),
        )
        .await;
    assert_eq!(shrink.status, StatusCode::BAD_REQUEST);

    let over = app
        .admin(
            Method::POST,
            "/api/v1/batch-assignments",
            Some(json!({
                "order_item_id": item_id,
                "allocations": [{
                    "batch_id": id_of(&app.create_batch("Line B").await),
                    "sizes": sizes(&[("S", 1)])
                }]
            })),
        )
        .await;
    assert_eq!(over.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_reassignment_tops_up_the_target_batch() {
    let app = TestApp::new().await;
    let (_, item_id, _, assignment_id) = order_in_stitching(&app).await;
    let line_b = app.create_batch("Line B").await;

    let moved = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/reassign", assignment_id),
            Some(json!({
                "target_batch_id": id_of(&line_b),
                "pieces": { "sizes": sizes(&[("M", 5)]) }
            })),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK, "{}", moved.text());
    let target = moved.data();
    assert_eq!(target["batch_name"], "Line B");
    assert_eq!(size_field(&target["sizes"], "M", "assigned"), 5);

    let again = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/reassign", assignment_id),
            Some(json!({
                "target_batch_id": id_of(&line_b),
                "pieces": { "sizes": sizes(&[("M", 3)]) }
            })),
        )
        .await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(id_of(&again.data()), id_of(&target));
    assert_eq!(size_field(&again.data()["sizes"], "M", "assigned"), 8);

    let listed = app
        .admin(
            Method::GET,
            &format!("/api/v1/batch-assignments?order_item_id={}", item_id),
            None,
        )
        .await;
    assert_eq!(listed.data().as_array().map(Vec::len), Some(2));

    let same_batch = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/reassign", id_of(&target)),
            Some(json!({
                "target_batch_id": id_of(&line_b),
                "pieces": { "total": 1 }
            })),
        )
        .await;
    assert_eq!(same_batch.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn qc_cannot_review_more_than_the_batch_holds() {
    let app = TestApp::new().await;
    let (order_id, _, _, assignment_id) = order_in_stitching(&app).await;

    let too_many = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({ "entries": [{ "size": "S", "approved": 10, "rejected": 1 }] })),
        )
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    let empty = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({ "entries": [{ "size": "S", "approved": 0, "rejected": 0 }] })),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.order_status(&order_id).await, "stitching");

    let partial = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({
                "reviewed_by": "Inspector Kim",
                "entries": [{ "size": "s", "approved": 4, "rejected": 0 }]
            })),
        )
        .await;
    assert_eq!(partial.status, StatusCode::CREATED, "{}", partial.text());
    let result = partial.data();
    assert_eq!(result["assignment"]["status"], "assigned");
    assert_eq!(result["records"][0]["size"], "S");
    assert_eq!(result["records"][0]["reviewed_by"], "Inspector Kim");

    let records = app
        .admin(
            Method::GET,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            None,
        )
        .await;
    assert_eq!(records.data().as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn status_moves_one_stage_at_a_time_and_locks_after_packing() {
    let app = TestApp::new().await;
    let (order_id, _, cutting_id, assignment_id) = order_in_stitching(&app).await;

    let skip = app
        .admin(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "packed" })),
        )
        .await;
    assert_eq!(skip.status, StatusCode::BAD_REQUEST);

    for next in ["quality_check", "packed"] {
        let moved = app
            .admin(
                Method::PUT,
                &format!("/api/v1/orders/{}/status", order_id),
                Some(json!({ "status": next })),
            )
            .await;
        assert_eq!(moved.status, StatusCode::OK, "{}", moved.text());
    }

    let cut = app
        .admin(
            Method::PUT,
            &format!("/api/v1/cutting-assignments/{}/cut", cutting_id),
            Some(json!({ "sizes": sizes(&[("S", 10)]) })),
        )
        .await;
    assert_eq!(cut.status, StatusCode::BAD_REQUEST);

    let qc = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({ "entries": [{ "size": "S", "approved": 1, "rejected": 0 }] })),
        )
        .await;
    assert_eq!(qc.status, StatusCode::BAD_REQUEST);

    let cancel = app
        .admin(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(cancel.status, StatusCode::OK);
}

fn status_in(list: &Value, id: &str) -> String {
    list.as_array()
        .into_iter()
        .flatten()
        .find(|row| row["id"].as_str() == Some(id))
        .and_then(|row| row["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn concurrent_cutting_assignments_cannot_overbook() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Racing").await;
    let order = app.create_order(&id_of(&customer)).await;
    let item_id = first_item_id(&order);

    let everything = json!({
        "order_item_id": item_id,
        "cutting_master": "Ravi",
        "sizes": sizes(&[("S", 10), ("M", 20), ("L", 10)])
    });
    let (first, second) = tokio::join!(
        app.admin(Method::POST, "/api/v1/cutting-assignments", Some(everything.clone())),
        app.admin(Method::POST, "/api/v1/cutting-assignments", Some(everything)),
    );
    let created = [&first, &second]
        .iter()
        .filter(|r| r.status == StatusCode::CREATED)
        .count();
    assert!(created <= 1, "both assignments were accepted");

    let summary = app
        .admin(
            Method::GET,
            &format!("/api/v1/order-items/{}/cutting-summary", item_id),
            None,
        )
        .await
        .data();
    assert_eq!(summary["total_assigned"], 40 * created as i64);
}

#[tokio::test]
async fn invoices_can_bill_only_approved_pieces() {
    let app = TestApp::new().await;
    let (order_id, _, _, assignment_id) = order_in_stitching(&app).await;

    let before_qc = app
        .admin(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({ "order_id": order_id, "approved_only": true })),
        )
        .await;
    assert_eq!(before_qc.status, StatusCode::BAD_REQUEST);

    let qc = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({
                "entries": [
                    { "size": "S", "approved": 9, "rejected": 1 },
                    { "size": "M", "approved": 20, "rejected": 0 },
                    { "size": "L", "approved": 10, "rejected": 0 }
                ]
            })),
        )
        .await;
    assert_eq!(qc.status, StatusCode::CREATED, "{}", qc.text());

    let invoice = app
        .admin(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({ "order_id": order_id, "approved_only": true, "tax_rate": "0" })),
        )
        .await;
    assert_eq!(invoice.status, StatusCode::CREATED, "{}", invoice.text());
    let invoice = invoice.data();
    assert_eq!(invoice["lines"][0]["quantity"], 39);
    assert_eq!(decimal(&invoice["subtotal"]), Decimal::from(195));
    assert_eq!(decimal(&invoice["total"]), Decimal::from(195));
}

#[tokio::test]
async fn cutting_reassignment_of_everything_left_closes_the_source() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Closing").await;
    let untouched = first_item_id(&app.create_order(&id_of(&customer)).await);
    let half_cut = first_item_id(&app.create_order(&id_of(&customer)).await);

    let mut sources = Vec::new();
    for item_id in [&untouched, &half_cut] {
        let created = app
            .admin(
                Method::POST,
                "/api/v1/cutting-assignments",
                Some(json!({
                    "order_item_id": item_id,
                    "cutting_master": "Ravi",
                    "sizes": sizes(&[("S", 10), ("M", 20), ("L", 10)])
                })),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED, "{}", created.text());
        sources.push(id_of(&created.data()));
    }

    let all_of_it = app
        .admin(
            Method::POST,
            &format!("/api/v1/cutting-assignments/{}/reassign", sources[0]),
            Some(json!({ "cutting_master": "Lena", "pieces": { "total": 40 } })),
        )
        .await;
    assert_eq!(all_of_it.status, StatusCode::OK, "{}", all_of_it.text());
    let listed = app
        .admin(Method::GET, &format!("/api/v1/order-items/{}/cutting", untouched), None)
        .await
        .data();
    assert_eq!(status_in(&listed, &sources[0]), "reassigned");

    let cut = app
        .admin(
            Method::PUT,
            &format!("/api/v1/cutting-assignments/{}/cut", sources[1]),
            Some(json!({ "sizes": sizes(&[("S", 10), ("M", 20), ("L", 6)]) })),
        )
        .await;
    assert_eq!(cut.status, StatusCode::OK, "{}", cut.text());
    let rest = app
        .admin(
            Method::POST,
            &format!("/api/v1/cutting-assignments/{}/reassign", sources[1]),
            Some(json!({ "cutting_master": "Lena", "pieces": { "sizes": sizes(&[("L", 4)]) } })),
        )
        .await;
    assert_eq!(rest.status, StatusCode::OK, "{}", rest.text());
    let listed = app
        .admin(Method::GET, &format!("/api/v1/order-items/{}/cutting", half_cut), None)
        .await
        .data();
    assert_eq!(status_in(&listed, &sources[1]), "completed");
}

#[tokio::test]
async fn batch_reassignment_of_unreviewed_pieces_marks_the_source_reassigned() {
    let app = TestApp::new().await;
    let (_, item_id, _, assignment_id) = order_in_stitching(&app).await;
    let line_b = app.create_batch("Line B").await;

    let moved = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/reassign", assignment_id),
            Some(json!({ "target_batch_id": id_of(&line_b), "pieces": { "total": 40 } })),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK, "{}", moved.text());

    let listed = app
        .admin(
            Method::GET,
            &format!("/api/v1/batch-assignments?order_item_id={}", item_id),
            None,
        )
        .await
        .data();
    assert_eq!(status_in(&listed, &assignment_id), "reassigned");
}

#[tokio::test]
async fn batch_reassignment_after_review_completes_the_source() {
    let app = TestApp::new().await;
    let (_, item_id, _, assignment_id) = order_in_stitching(&app).await;
    let line_b = app.create_batch("Line B").await;

    let reviewed = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/qc", assignment_id),
            Some(json!({ "entries": [{ "size": "S", "approved": 4, "rejected": 0 }] })),
        )
        .await;
    assert_eq!(reviewed.status, StatusCode::CREATED, "{}", reviewed.text());

    let moved = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/reassign", assignment_id),
            Some(json!({ "target_batch_id": id_of(&line_b), "pieces": { "total": 36 } })),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK, "{}", moved.text());
    assert_eq!(size_field(&moved.data()["sizes"], "S", "assigned"), 6);

    let listed = app
        .admin(
            Method::GET,
            &format!("/api/v1/batch-assignments?order_item_id={}", item_id),
            None,
        )
        .await
        .data();
    assert_eq!(status_in(&listed, &assignment_id), "completed");
}

#[tokio::test]
async fn inactive_batches_cannot_take_reassigned_pieces() {
    let app = TestApp::new().await;
    let (_, _, _, assignment_id) = order_in_stitching(&app).await;
    let line_b = app.create_batch("Line B").await;

    let retired = app
        .admin(
            Method::PUT,
            &format!("/api/v1/batches/{}", id_of(&line_b)),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(retired.status, StatusCode::OK, "{}", retired.text());

    let refused = app
        .admin(
            Method::POST,
            &format!("/api/v1/batch-assignments/{}/reassign", assignment_id),
            Some(json!({ "target_batch_id": id_of(&line_b), "pieces": { "total": 1 } })),
        )
        .await;
    assert_eq!(refused.status, StatusCode::BAD_REQUEST);
}
