mod common;

use axum::http::{Method, StatusCode};
use assert_matches::assert_matches;
use common::{TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};
use garment_erp::auth::AuthError;
use serde_json::json;

#[tokio::test]
async fn login_issues_a_bearer_pair() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "  ADMIN@factory.test ", "password": ADMIN_PASSWORD })),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let pair = response.json();
    assert_eq!(pair["token_type"], "Bearer");
    assert_eq!(pair["expires_in"], 3600);
    assert_eq!(pair["refresh_expires_in"], 86_400);

    let token = pair["access_token"].as_str().expect("access token");
    let me = app
        .request(Method::GET, "/api/v1/me", None, Some(token))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.data()["profile"]["email"], ADMIN_EMAIL);
    assert_eq!(me.data()["profile"]["is_admin"], true);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = TestApp::new().await;

    let wrong = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": "not-the-password" })),
            None,
        )
        .await;
    let unknown = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "ghost@factory.test", "password": ADMIN_PASSWORD })),
            None,
        )
        .await;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.json()["error"], unknown.json()["error"]);
}

#[tokio::test]
async fn refresh_tokens_rotate_and_cannot_be_replayed() {
    let app = TestApp::new().await;
    let login = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            None,
        )
        .await
        .json();
    let refresh = login["refresh_token"].as_str().expect("refresh token");

    let as_access = app
        .request(Method::GET, "/api/v1/me", None, Some(refresh))
        .await;
    assert_eq!(as_access.status, StatusCode::UNAUTHORIZED);

    let rotated = app
        .request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": refresh })),
            None,
        )
        .await;
    assert_eq!(rotated.status, StatusCode::OK, "{}", rotated.text());
    assert_ne!(rotated.json()["refresh_token"], login["refresh_token"]);

    let replay = app
        .request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": refresh })),
            None,
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.json()["error"]["code"], "AUTH_REVOKED_TOKEN");

    let access = login["access_token"].as_str().expect("access token");
    let refresh_with_access = app
        .request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": access })),
            None,
        )
        .await;
    assert_eq!(refresh_with_access.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_refreshes_with_one_token_mint_one_pair() {
    let app = TestApp::new().await;
    let login = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            None,
        )
        .await
        .json();
    let refresh = login["refresh_token"].as_str().expect("refresh token");

    let auth = app.state.auth.clone();
    let (first, second) = tokio::join!(auth.refresh_token(refresh), auth.refresh_token(refresh));

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(Result::err);
    assert_matches!(loser, Some(AuthError::RevokedToken));
}

#[tokio::test]
async fn logout_revokes_the_access_token() {
    let app = TestApp::new().await;
    let token = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            None,
        )
        .await
        .json()["access_token"]
        .as_str()
        .expect("access token")
        .to_string();

    let before = app
        .request(Method::GET, "/api/v1/orders", None, Some(&token))
        .await;
    assert_eq!(before.status, StatusCode::OK);

    let logout = app
        .request(Method::POST, "/auth/logout", None, Some(&token))
        .await;
    assert_eq!(logout.status, StatusCode::OK);

    let after = app
        .request(Method::GET, "/api/v1/orders", None, Some(&token))
        .await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after.json()["error"]["code"], "AUTH_REVOKED_TOKEN");

    // other sessions are untouched
    let other = app
        .request(Method::GET, "/api/v1/orders", None, Some(&app.admin_token))
        .await;
    assert_eq!(other.status, StatusCode::OK);
}
