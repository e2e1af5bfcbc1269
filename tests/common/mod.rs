#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use garment_erp::{
    auth::LoginCredentials,
    config::AppConfig,
    db,
    events::{self, EventSender},
    realtime::ChangeFeed,
    services::access::{
        CreateDesignationRequest, CreateUserRequest, SetPermissionsRequest, UserProfile,
    },
    storage::{BlobStore, LocalDiskStore},
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@factory.test";
pub const ADMIN_PASSWORD: &str = "admin-pass-123";
pub const STAFF_PASSWORD: &str = "staff-pass-123";

const TEST_JWT_SECRET: &str =
    "t3st-s1gn1ng-k3y-for-g4rment-erp-integration-suite-9f8e7d6c5b4a3210zyxwvu";

/// Full application over a throwaway SQLite file and blob directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_token: String,
    pub admin_id: Uuid,
    _workdir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// `data` of an `ApiResponse` envelope
    pub fn data(&self) -> Value {
        self.json()["data"].clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let workdir = tempfile::tempdir().expect("temp dir");
        let db_path = workdir.path().join("erp.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 4;
        cfg.storage_dir = workdir.path().join("blobs").display().to_string();
        cfg.max_upload_bytes = 64 * 1024;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let change_feed = ChangeFeed::new(cfg.realtime_channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx, change_feed.clone()));

        let store = LocalDiskStore::new(cfg.storage_dir.clone());
        store.init().await.expect("blob directory");
        let storage: Arc<dyn BlobStore> = Arc::new(store);

        let state = AppState::new(db_arc, cfg, event_sender, change_feed, storage);
        let router = garment_erp::build_router(state.clone());

        let admin = state
            .services
            .access
            .create_user(CreateUserRequest {
                name: "Factory Admin".to_string(),
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
                designation_id: None,
                is_admin: true,
                active: true,
            })
            .await
            .expect("admin user");
        let admin_token = state
            .auth
            .login(LoginCredentials {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            })
            .await
            .expect("admin login")
            .access_token;

        Self {
            router,
            state,
            admin_token,
            admin_id: admin.id,
            _workdir: workdir,
            _event_task: event_task,
        }
    }

    /// Creates a non-admin user whose designation grants `keys`, returning the profile and an access token
    pub async fn staff_user(&self, email: &str, keys: &[&str]) -> (UserProfile, String) {
        let access = &self.state.services.access;
        let designation = access
            .create_designation(CreateDesignationRequest {
                name: format!("Role for {}", email),
                department_id: None,
            })
            .await
            .expect("designation");
        access
            .set_designation_permissions(
                designation.id,
                SetPermissionsRequest {
                    permission_keys: keys.iter().map(|k| k.to_string()).collect(),
                },
            )
            .await
            .expect("permissions");
        let profile = access
            .create_user(CreateUserRequest {
                name: format!("Staff {}", email),
                email: email.to_string(),
                password: STAFF_PASSWORD.to_string(),
                designation_id: Some(designation.id),
                is_admin: false,
                active: true,
            })
            .await
            .expect("staff user");
        let token = self
            .state
            .auth
            .login(LoginCredentials {
                email: email.to_string(),
                password: STAFF_PASSWORD.to_string(),
            })
            .await
            .expect("staff login")
            .access_token;
        (profile, token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router never fails");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body")
            .to_vec();
        Response {
            status,
            headers,
            body,
        }
    }

    /// Status and headers only; for endpoints whose body never ends
    pub async fn head_only(&self, uri: &str, token: &str) -> (StatusCode, axum::http::HeaderMap) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .expect("request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router never fails");
        (response.status(), response.headers().clone())
    }

    /// JSON request with an optional bearer token
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    /// JSON request as the admin
    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.admin_token))
            .await
    }

    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        content_type: &str,
        body: Vec<u8>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body)).expect("request"))
            .await
    }

    /// Single-file multipart upload as the admin
    pub async fn upload(
        &self,
        bucket: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Response {
        let boundary = "----garment-erp-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        self.raw(
            Method::POST,
            &format!("/api/v1/files?bucket={}", bucket),
            &format!("multipart/form-data; boundary={}", boundary),
            body,
            Some(&self.admin_token),
        )
        .await
    }

    // Fixtures

    pub async fn create_customer(&self, name: &str) -> Value {
        let response = self
            .admin(
                Method::POST,
                "/api/v1/customers",
                Some(json!({ "name": name, "email": format!("{}@buyer.test", name.to_lowercase().replace(' ', "")) })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.data()
    }

    /// Order with one polo item: S 10, M 20, L 10 at 5.00
    pub async fn create_order(&self, customer_id: &str) -> Value {
        let response = self
            .admin(
                Method::POST,
                "/api/v1/orders",
                Some(json!({
                    "customer_id": customer_id,
                    "notes": "integration",
                    "items": [{
                        "style": "Polo",
                        "color": "Navy",
                        "fabric": "Pique",
                        "unit_price": "5.00",
                        "sizes": [
                            { "size": "S", "quantity": 10 },
                            { "size": "M", "quantity": 20 },
                            { "size": "L", "quantity": 10 }
                        ]
                    }]
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.data()
    }

    pub async fn create_batch(&self, name: &str) -> Value {
        let response = self
            .admin(
                Method::POST,
                "/api/v1/batches",
                Some(json!({ "name": name, "supervisor": "Asha", "worker_count": 12 })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.data()
    }

    pub async fn order_status(&self, order_id: &str) -> String {
        let response = self
            .admin(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.data()["status"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}

pub fn first_item_id(order: &Value) -> String {
    order["items"][0]["id"]
        .as_str()
        .expect("order item id")
        .to_string()
}

pub fn sizes(pairs: &[(&str, i32)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(size, quantity)| json!({ "size": size, "quantity": quantity }))
            .collect(),
    )
}

/// Quantity for `size` in a `[{size, quantity}]` array
pub fn quantity(list: &Value, size: &str) -> i64 {
    list.as_array()
        .into_iter()
        .flatten()
        .filter(|row| row["size"].as_str() == Some(size))
        .filter_map(|row| row["quantity"].as_i64())
        .sum()
}
