mod common;

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use common::{first_item_id, id_of, sizes, TestApp};
use garment_erp::events::ChangeAction;
use serde_json::json;

#[tokio::test]
async fn files_round_trip_through_their_bucket() {
    let app = TestApp::new().await;

    let uploaded = app
        .upload("documents", "spec sheet (v2).pdf", "application/pdf", b"%PDF-1.4 fake")
        .await;
    assert_eq!(uploaded.status, StatusCode::CREATED, "{}", uploaded.text());
    let file = uploaded.data();
    let file_id = id_of(&file);
    assert_eq!(file["bucket"], "documents");
    assert_eq!(file["file_name"], "spec_sheet__v2_.pdf");
    assert_eq!(file["size_bytes"], 13);

    let listed = app
        .admin(Method::GET, "/api/v1/files?bucket=documents", None)
        .await;
    assert_eq!(listed.data().as_array().map(Vec::len), Some(1));
    let images = app.admin(Method::GET, "/api/v1/files?bucket=images", None).await;
    assert_eq!(images.data().as_array().map(Vec::len), Some(0));

    let downloaded = app
        .admin(Method::GET, &format!("/api/v1/files/{}/download", file_id), None)
        .await;
    assert_eq!(downloaded.status, StatusCode::OK);
    assert_eq!(downloaded.headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(downloaded.body, b"%PDF-1.4 fake");

    let removed = app
        .admin(Method::DELETE, &format!("/api/v1/files/{}", file_id), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let gone = app
        .admin(Method::GET, &format!("/api/v1/files/{}", file_id), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uploads_are_checked_before_storing() {
    let app = TestApp::new().await;

    let unknown_bucket = app
        .upload("archives", "a.zip", "application/zip", b"PK")
        .await;
    assert_eq!(unknown_bucket.status, StatusCode::BAD_REQUEST);

    let empty = app.upload("images", "blank.png", "image/png", b"").await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let oversized = vec![b'x'; 70 * 1024];
    let too_large = app
        .upload("images", "huge.png", "image/png", &oversized)
        .await;
    assert_eq!(too_large.status, StatusCode::PAYLOAD_TOO_LARGE);

    let listed = app.admin(Method::GET, "/api/v1/files", None).await;
    assert_eq!(listed.data().as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn tutorials_link_videos_and_pin_them() {
    let app = TestApp::new().await;
    let video = app
        .upload("videos", "threading.mp4", "video/mp4", b"\x00\x00\x00\x18ftypmp42")
        .await
        .data();
    let picture = app
        .upload("images", "needle.png", "image/png", b"\x89PNG")
        .await
        .data();

    let wrong_bucket = app
        .admin(
            Method::POST,
            "/api/v1/tutorials",
            Some(json!({ "title": "Threading", "video_file_id": id_of(&picture) })),
        )
        .await;
    assert_eq!(wrong_bucket.status, StatusCode::BAD_REQUEST);

    let tutorial = app
        .admin(
            Method::POST,
            "/api/v1/tutorials",
            Some(json!({
                "title": "Threading the overlock",
                "category": "machines",
                "video_file_id": id_of(&video)
            })),
        )
        .await;
    assert_eq!(tutorial.status, StatusCode::CREATED, "{}", tutorial.text());
    let tutorial_id = id_of(&tutorial.data());

    app.admin(
        Method::POST,
        "/api/v1/tutorials",
        Some(json!({ "title": "Reading a cutting sheet", "category": "cutting" })),
    )
    .await;

    let machines = app
        .admin(Method::GET, "/api/v1/tutorials?category=machines", None)
        .await;
    assert_eq!(machines.data()["total"], 1);

    let pinned = app
        .admin(Method::DELETE, &format!("/api/v1/files/{}", id_of(&video)), None)
        .await;
    assert_eq!(pinned.status, StatusCode::CONFLICT);

    let renamed = app
        .admin(
            Method::PUT,
            &format!("/api/v1/tutorials/{}", tutorial_id),
            Some(json!({ "title": "Overlock threading" })),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.data()["title"], "Overlock threading");
    assert_eq!(renamed.data()["video_file_id"], video["id"]);

    let removed = app
        .admin(Method::DELETE, &format!("/api/v1/tutorials/{}", tutorial_id), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let again = app
        .admin(Method::DELETE, &format!("/api/v1/tutorials/{}", tutorial_id), None)
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    // the video outlives the tutorial and is free to delete now
    let freed = app
        .admin(Method::DELETE, &format!("/api/v1/files/{}", id_of(&video)), None)
        .await;
    assert_eq!(freed.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn bundle_labels_and_cutting_sheets_download_as_csv() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Labels").await;
    let order = app.create_order(&id_of(&customer)).await;
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
    let cutting_id = id_of(&cutting.data());
    app.admin(
        Method::PUT,
        &format!("/api/v1/cutting-assignments/{}/cut", cutting_id),
        Some(json!({ "sizes": sizes(&[("S", 10), ("M", 20), ("L", 6)]) })),
    )
    .await;

    let sheet = app
        .admin(
            Method::GET,
            &format!("/api/v1/artifacts/cutting-sheet/{}", item_id),
            None,
        )
        .await;
    assert_eq!(sheet.status, StatusCode::OK, "{}", sheet.text());
    assert!(sheet.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap_or_default()
        .starts_with("text/csv"));
    let sheet_text = sheet.text();
    let lines: Vec<&str> = sheet_text.lines().collect();
    assert_eq!(lines[0], "cutting_master,size,assigned,cut,left");
    assert_eq!(lines[3], "Ravi,L,10,6,4");

    let batch = app.create_batch("Line B").await;
    let assigned = app
        .admin(
            Method::POST,
            "/api/v1/batch-assignments",
            Some(json!({
                "order_item_id": item_id,
                "allocations": [{ "batch_id": id_of(&batch), "sizes": sizes(&[("S", 10), ("M", 20), ("L", 6)]) }]
            })),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::CREATED, "{}", assigned.text());
    let assignment_id = id_of(&assigned.data()[0]);

    let labels = app
        .admin(
            Method::GET,
            &format!("/api/v1/artifacts/bundle-labels/{}?bundle_size=8", assignment_id),
            None,
        )
        .await;
    assert_eq!(labels.status, StatusCode::OK, "{}", labels.text());
    let disposition = labels.headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap_or_default()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("bundle-labels-"));

    let label_text = labels.text();
    let rows: Vec<&str> = label_text.lines().skip(1).collect();
    // S 8+2, M 8+8+4, L 6
    assert_eq!(rows.len(), 6);
    assert!(rows[5].ends_with(",L,6,6"));

    let bad_size = app
        .admin(
            Method::GET,
            &format!("/api/v1/artifacts/bundle-labels/{}?bundle_size=0", assignment_id),
            None,
        )
        .await;
    assert_eq!(bad_size.status, StatusCode::BAD_REQUEST);

    let template = app
        .admin(Method::GET, "/api/v1/artifacts/templates/orders", None)
        .await;
    assert_eq!(template.status, StatusCode::OK);
}

#[tokio::test]
async fn bundle_label_sheets_are_capped() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Bulk").await;
    let order = app
        .admin(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_id": id_of(&customer),
                "items": [{ "style": "Tee", "unit_price": "1.10", "sizes": sizes(&[("M", 6000)]) }]
            })),
        )
        .await;
    assert_eq!(order.status, StatusCode::CREATED, "{}", order.text());
    let item_id = first_item_id(&order.data());

    let cutting = app
        .admin(
            Method::POST,
            "/api/v1/cutting-assignments",
            Some(json!({ "order_item_id": item_id, "cutting_master": "Ravi", "sizes": sizes(&[("M", 6000)]) })),
        )
        .await;
    let cutting_id = id_of(&cutting.data());
    app.admin(
        Method::PUT,
        &format!("/api/v1/cutting-assignments/{}/cut", cutting_id),
        Some(json!({ "sizes": sizes(&[("M", 6000)]) })),
    )
    .await;
    let batch = app.create_batch("Line C").await;
    let assigned = app
        .admin(
            Method::POST,
            "/api/v1/batch-assignments",
            Some(json!({
                "order_item_id": item_id,
                "allocations": [{ "batch_id": id_of(&batch), "sizes": sizes(&[("M", 6000)]) }]
            })),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::CREATED, "{}", assigned.text());
    let assignment_id = id_of(&assigned.data()[0]);

    let one_per_ticket = app
        .admin(
            Method::GET,
            &format!("/api/v1/artifacts/bundle-labels/{}?bundle_size=1", assignment_id),
            None,
        )
        .await;
    assert_eq!(one_per_ticket.status, StatusCode::BAD_REQUEST);

    let pairs = app
        .admin(
            Method::GET,
            &format!("/api/v1/artifacts/bundle-labels/{}?bundle_size=2", assignment_id),
            None,
        )
        .await;
    assert_eq!(pairs.status, StatusCode::OK, "{}", pairs.text());
    assert_eq!(pairs.text().lines().count(), 3_001);
}

#[tokio::test]
async fn committed_writes_reach_realtime_subscribers() {
    let app = TestApp::new().await;
    let mut feed = app.state.change_feed.subscribe();

    let customer = app.create_customer("Realtime").await;
    // setup writes may still be draining through the event loop
    let change = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let change = feed.recv().await.expect("feed open");
            if change.table == "customers" {
                break change;
            }
        }
    })
    .await
    .expect("change within timeout");
    assert_eq!(change.table, "customers");
    assert_eq!(change.action, ChangeAction::Insert);
    assert_eq!(change.id.to_string(), id_of(&customer));

    let (status, headers) = app
        .head_only("/api/v1/realtime?table=orders", &app.admin_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");

    let (_, staff_token) = app.staff_user("floor@factory.test", &["orders"]).await;
    let (forbidden, _) = app.head_only("/api/v1/realtime", &staff_token).await;
    assert_eq!(forbidden, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn readiness_reports_the_database() {
    let app = TestApp::new().await;

    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.json()["ready"], true);

    let live = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(live.json()["alive"], true);
}
