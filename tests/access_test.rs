mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp, STAFF_PASSWORD};
use serde_json::json;

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let app = TestApp::new().await;

    let missing = app.request(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let garbage = app
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.json()["error"]["code"], "AUTH_INVALID_TOKEN");

    let me = app.request(Method::GET, "/api/v1/me", None, None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);

    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}

#[tokio::test]
async fn group_grant_opens_its_subtree_only() {
    let app = TestApp::new().await;
    let (_, token) = app.staff_user("line@factory.test", &["production"]).await;

    let batches = app
        .request(Method::GET, "/api/v1/batches", None, Some(&token))
        .await;
    assert_eq!(batches.status, StatusCode::OK, "{}", batches.text());

    let created = app
        .request(
            Method::POST,
            "/api/v1/batches",
            Some(json!({ "name": "Line C", "worker_count": 9 })),
            Some(&token),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text());

    let orders = app
        .request(Method::GET, "/api/v1/orders", None, Some(&token))
        .await;
    assert_eq!(orders.status, StatusCode::FORBIDDEN);
    assert_eq!(orders.json()["error"]["code"], "AUTH_INSUFFICIENT_PERMISSIONS");

    let users = app
        .request(Method::GET, "/api/v1/admin/users", None, Some(&token))
        .await;
    assert_eq!(users.status, StatusCode::FORBIDDEN);

    let me = app
        .request(Method::GET, "/api/v1/me", None, Some(&token))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    let me = me.data();
    assert_eq!(me["profile"]["is_admin"], false);
    let permissions: Vec<&str> = me["permissions"]
        .as_array()
        .expect("permissions")
        .iter()
        .filter_map(|p| p.as_str())
        .collect();
    assert!(permissions.contains(&"production:write"));
    assert!(permissions.contains(&"qc:write"));
    assert!(!permissions.contains(&"orders:read"));
}

#[tokio::test]
async fn sidebar_shows_granted_nodes_under_their_ancestors() {
    let app = TestApp::new().await;
    let (_, token) = app
        .staff_user("stores@factory.test", &["inventory:read", "dashboard"])
        .await;

    let sidebar = app
        .request(Method::GET, "/api/v1/me/sidebar", None, Some(&token))
        .await;
    assert_eq!(sidebar.status, StatusCode::OK);
    let entries = sidebar.data();
    let keys: Vec<&str> = entries
        .as_array()
        .expect("entries")
        .iter()
        .filter_map(|e| e["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["dashboard", "stores", "inventory:read"]);
    assert_eq!(entries[2]["depth"], 1);
    assert_eq!(entries[2]["parent_key"], "stores");
    assert_eq!(entries[2]["route"], "/inventory");

    let admin_sidebar = app.admin(Method::GET, "/api/v1/me/sidebar", None).await;
    let tree = app.admin(Method::GET, "/api/v1/admin/permissions", None).await;
    assert_eq!(
        admin_sidebar.data().as_array().map(Vec::len),
        tree.data().as_array().map(Vec::len)
    );
}

#[tokio::test]
async fn departments_designations_and_users_are_managed_by_admins() {
    let app = TestApp::new().await;

    let department = app
        .admin(
            Method::POST,
            "/api/v1/admin/departments",
            Some(json!({ "name": "Quality" })),
        )
        .await;
    assert_eq!(department.status, StatusCode::CREATED);
    let department_id = id_of(&department.data());

    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/admin/departments",
            Some(json!({ "name": "Quality" })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let designation = app
        .admin(
            Method::POST,
            "/api/v1/admin/designations",
            Some(json!({ "name": "QC Inspector", "department_id": department_id })),
        )
        .await;
    assert_eq!(designation.status, StatusCode::CREATED);
    let designation_id = id_of(&designation.data());

    let unknown_key = app
        .admin(
            Method::PUT,
            &format!("/api/v1/admin/designations/{}/permissions", designation_id),
            Some(json!({ "permission_keys": ["qc:read", "qc:approve-everything"] })),
        )
        .await;
    assert_eq!(unknown_key.status, StatusCode::BAD_REQUEST);

    let granted = app
        .admin(
            Method::PUT,
            &format!("/api/v1/admin/designations/{}/permissions", designation_id),
            Some(json!({ "permission_keys": ["qc:read", "qc:write"] })),
        )
        .await;
    assert_eq!(granted.status, StatusCode::OK, "{}", granted.text());
    let detail = granted.data();
    assert_eq!(detail["department_name"], "Quality");
    assert_eq!(detail["permission_keys"], json!(["qc:read", "qc:write"]));

    let busy_department = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/admin/departments/{}", department_id),
            None,
        )
        .await;
    assert_eq!(busy_department.status, StatusCode::CONFLICT);

    let user = app
        .admin(
            Method::POST,
            "/api/v1/admin/users",
            Some(json!({
                "name": "Kim",
                "email": "Kim@Factory.Test",
                "password": STAFF_PASSWORD,
                "designation_id": designation_id
            })),
        )
        .await;
    assert_eq!(user.status, StatusCode::CREATED, "{}", user.text());
    let user = user.data();
    let user_id = id_of(&user);
    assert_eq!(user["email"], "kim@factory.test");
    assert_eq!(user["designation_name"], "QC Inspector");
    assert!(user.get("password_hash").is_none());

    let filtered = app
        .admin(
            Method::GET,
            &format!("/api/v1/admin/users?designation_id={}", designation_id),
            None,
        )
        .await;
    assert_eq!(filtered.data()["total"], 1);

    let held = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/admin/designations/{}", designation_id),
            None,
        )
        .await;
    assert_eq!(held.status, StatusCode::CONFLICT);

    let login = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "kim@factory.test", "password": STAFF_PASSWORD })),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);

    let deactivated = app
        .admin(
            Method::PUT,
            &format!("/api/v1/admin/users/{}", user_id),
            Some(json!({ "active": false })),
        )
        .await;
    assert_eq!(deactivated.status, StatusCode::OK);
    assert_eq!(deactivated.data()["active"], false);

    let refused = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "kim@factory.test", "password": STAFF_PASSWORD })),
            None,
        )
        .await;
    assert_eq!(refused.status, StatusCode::UNAUTHORIZED);

    let self_delete = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/admin/users/{}", app.admin_id),
            None,
        )
        .await;
    assert_eq!(self_delete.status, StatusCode::BAD_REQUEST);

    let removed = app
        .admin(Method::DELETE, &format!("/api/v1/admin/users/{}", user_id), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let designation_gone = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/admin/designations/{}", designation_id),
            None,
        )
        .await;
    assert_eq!(designation_gone.status, StatusCode::NO_CONTENT);

    let department_gone = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/admin/departments/{}", department_id),
            None,
        )
        .await;
    assert_eq!(department_gone.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn duplicate_emails_are_refused() {
    let app = TestApp::new().await;
    let duplicate = app
        .admin(
            Method::POST,
            "/api/v1/admin/users",
            Some(json!({
                "name": "Second admin",
                "email": common::ADMIN_EMAIL.to_uppercase(),
                "password": STAFF_PASSWORD
            })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let short_password = app
        .admin(
            Method::POST,
            "/api/v1/admin/users",
            Some(json!({ "name": "Short", "email": "short@factory.test", "password": "abc" })),
        )
        .await;
    assert_eq!(short_password.status, StatusCode::BAD_REQUEST);
}
