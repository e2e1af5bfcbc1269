//! Garment ERP API Library
//!
//! Order intake, cutting, batching, quality check, stores, purchasing, invoicing and staff
//! access for a garment factory, served as an HTTP/JSON API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod realtime;
pub mod services;
pub mod storage;
pub mod tracing;

use axum::{
    middleware::from_fn,
    response::Json,
    routing::{delete, get, post, put},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use utoipa::{IntoParams, ToSchema};

use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthService};
use crate::cache::QueryCache;
use crate::storage::BlobStore;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub change_feed: realtime::ChangeFeed,
    pub cache: QueryCache,
    pub storage: Arc<dyn BlobStore>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires services, the reference cache and the auth service around shared resources
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        change_feed: realtime::ChangeFeed,
        storage: Arc<dyn BlobStore>,
    ) -> Self {
        let cache = QueryCache::in_memory(config.cache_ttl());
        let auth = Arc::new(AuthService::new(
            auth::AuthConfig::from(&config),
            db.clone(),
        ));
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            cache.clone(),
            storage.clone(),
            &config,
        );
        Self {
            db,
            config,
            event_sender,
            services,
            change_feed,
            cache,
            storage,
            auth,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            search: None,
            sort_by: None,
            sort_order: None,
        }
    }
}

impl ListQuery {
    /// Page is at least 1 and the limit is clamped into the configured bounds
    pub fn normalized(mut self, config: &config::AppConfig) -> Self {
        self.page = self.page.max(1);
        self.limit = config.page_size(Some(self.limit));
        self
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// Versioned API routes, one router per permission gate
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{
        admin, artifacts, customers, files, inventory, invoices, me, orders, procurement,
        production, qc, tutorials,
    };

    let orders_read = Router::new()
        .route("/orders", get(orders::list_orders))
        .route("/orders/summary/stages", get(orders::stage_summary))
        .route("/orders/:id", get(orders::get_order))
        .route("/artifacts/templates/orders", get(artifacts::order_template))
        .with_permission(perm::ORDERS_READ);

    let orders_write = Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", put(orders::update_order).delete(orders::delete_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        .route("/orders/:id/items", post(orders::add_order_item))
        .route("/order-items/:id/sizes", put(orders::update_item_sizes))
        .with_permission(perm::ORDERS_WRITE);

    let customers_read = Router::new()
        .route("/customers", get(customers::list_customers))
        .route("/customers/:id", get(customers::get_customer))
        .with_permission(perm::CUSTOMERS_READ);

    let customers_write = Router::new()
        .route("/customers", post(customers::create_customer))
        .route(
            "/customers/:id",
            put(customers::update_customer).delete(customers::delete_customer),
        )
        .with_permission(perm::CUSTOMERS_WRITE);

    let production_read = Router::new()
        .route("/order-items/:id/cutting", get(production::list_cutting_assignments))
        .route("/order-items/:id/cutting-summary", get(production::cutting_summary))
        .route("/batches", get(production::list_batches))
        .route("/batches/:id", get(production::get_batch))
        .route("/batch-assignments", get(production::list_batch_assignments))
        .route("/artifacts/bundle-labels/:id", get(artifacts::bundle_labels))
        .route("/artifacts/cutting-sheet/:id", get(artifacts::cutting_sheet))
        .with_permission(perm::PRODUCTION_READ);

    let production_write = Router::new()
        .route("/cutting-assignments", post(production::create_cutting_assignment))
        .route("/cutting-assignments/:id/cut", put(production::update_cut_quantities))
        .route(
            "/cutting-assignments/:id/reassign",
            post(production::reassign_cutting_master),
        )
        .route("/batch-assignments", post(production::assign_batches))
        .route("/batch-assignments/:id/reassign", post(production::reassign_batch))
        .with_permission(perm::PRODUCTION_WRITE);

    let batches_write = Router::new()
        .route("/batches", post(production::create_batch))
        .route(
            "/batches/:id",
            put(production::update_batch).delete(production::delete_batch),
        )
        .with_permission(perm::BATCHES_WRITE);

    let qc_read = Router::new()
        .route("/order-items/:id/qc-progress", get(qc::item_progress))
        .route("/batch-assignments/:id/qc", get(qc::list_qc_records))
        .route("/batch-assignments/:id/qc-progress", get(qc::assignment_progress))
        .with_permission(perm::QC_READ);

    let qc_write = Router::new()
        .route("/batch-assignments/:id/qc", post(qc::record_qc))
        .with_permission(perm::QC_WRITE);

    let inventory_read = Router::new()
        .route("/inventory", get(inventory::list_items))
        .route("/inventory/:id", get(inventory::get_item))
        .route("/inventory/:id/movements", get(inventory::list_movements))
        .route("/artifacts/templates/inventory", get(artifacts::inventory_template))
        .with_permission(perm::INVENTORY_READ);

    let inventory_write = Router::new()
        .route("/inventory", post(inventory::create_item))
        .route("/inventory/import", post(inventory::import_items))
        .route(
            "/inventory/:id",
            put(inventory::update_item).delete(inventory::delete_item),
        )
        .route("/inventory/:id/adjust", post(inventory::adjust_stock))
        .with_permission(perm::INVENTORY_WRITE);

    let procurement_read = Router::new()
        .route("/purchase-orders", get(procurement::list_purchase_orders))
        .route("/purchase-orders/:id", get(procurement::get_purchase_order))
        .route("/purchase-orders/:id/receipts", get(procurement::list_goods_receipts))
        .with_permission(perm::PROCUREMENT_READ);

    let procurement_write = Router::new()
        .route("/purchase-orders", post(procurement::create_purchase_order))
        .route("/purchase-orders/:id/cancel", post(procurement::cancel_purchase_order))
        .route("/purchase-orders/:id/receipts", post(procurement::receive_goods))
        .with_permission(perm::PROCUREMENT_WRITE);

    let invoices_read = Router::new()
        .route("/invoices", get(invoices::list_invoices))
        .route("/invoices/:id", get(invoices::get_invoice))
        .with_permission(perm::INVOICES_READ);

    let invoices_write = Router::new()
        .route("/invoices", post(invoices::create_invoice))
        .route("/invoices/:id/issue", post(invoices::issue_invoice))
        .route("/invoices/:id/pay", post(invoices::mark_paid))
        .route("/invoices/:id/cancel", post(invoices::cancel_invoice))
        .with_permission(perm::INVOICES_WRITE);

    let admin_read = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id", get(admin::get_user))
        .route("/admin/departments", get(admin::list_departments))
        .route("/admin/designations", get(admin::list_designations))
        .route("/admin/designations/:id", get(admin::get_designation))
        .route("/admin/permissions", get(admin::permission_tree))
        .route("/realtime", get(handlers::realtime::subscribe))
        .with_permission(perm::ADMIN_READ);

    let admin_write = Router::new()
        .route("/admin/users", post(admin::create_user))
        .route("/admin/users/:id", put(admin::update_user).delete(admin::delete_user))
        .route("/admin/departments", post(admin::create_department))
        .route(
            "/admin/departments/:id",
            put(admin::update_department).delete(admin::delete_department),
        )
        .route("/admin/designations", post(admin::create_designation))
        .route(
            "/admin/designations/:id",
            put(admin::update_designation).delete(admin::delete_designation),
        )
        .route(
            "/admin/designations/:id/permissions",
            put(admin::set_designation_permissions),
        )
        .with_permission(perm::ADMIN_WRITE);

    let tutorials_read = Router::new()
        .route("/tutorials", get(tutorials::list_tutorials))
        .route("/tutorials/:id", get(tutorials::get_tutorial))
        .with_permission(perm::TUTORIALS_READ);

    let tutorials_write = Router::new()
        .route("/tutorials", post(tutorials::create_tutorial))
        .route(
            "/tutorials/:id",
            put(tutorials::update_tutorial).delete(tutorials::delete_tutorial),
        )
        .with_permission(perm::TUTORIALS_WRITE);

    let files_read = Router::new()
        .route("/files", get(files::list_files))
        .route("/files/:id", get(files::get_file))
        .route("/files/:id/download", get(files::download_file))
        .with_permission(perm::FILES_READ);

    let files_write = Router::new()
        .route("/files", post(files::upload_file))
        .route("/files/:id", delete(files::delete_file))
        .with_permission(perm::FILES_WRITE);

    // Any signed-in user
    let me = Router::new()
        .route("/me", get(me::profile))
        .route("/me/sidebar", get(me::sidebar))
        .with_auth();

    Router::new()
        .merge(orders_read)
        .merge(orders_write)
        .merge(customers_read)
        .merge(customers_write)
        .merge(production_read)
        .merge(production_write)
        .merge(batches_write)
        .merge(qc_read)
        .merge(qc_write)
        .merge(inventory_read)
        .merge(inventory_write)
        .merge(procurement_read)
        .merge(procurement_write)
        .merge(invoices_read)
        .merge(invoices_write)
        .merge(admin_read)
        .merge(admin_write)
        .merge(tutorials_read)
        .merge(tutorials_write)
        .merge(files_read)
        .merge(files_write)
        .merge(me)
}

/// Full application router: API, auth, health, metrics and Swagger UI.
///
/// CORS is left to the caller since it depends on deployment settings.
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.auth.clone();
    let body_limit = state.config.max_upload_bytes + 64 * 1024;

    Router::<AppState>::new()
        .route("/", get(|| async { "garment-erp up" }))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .nest(
            "/auth",
            auth::auth_routes().with_state(auth_service.clone()),
        )
        .merge(openapi::swagger_ui())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
        .layer(from_fn(metrics::http_metrics_middleware))
        .layer(Extension(auth_service))
        .layer(from_fn(middleware_helpers::request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }

    #[test]
    fn total_pages_round_up() {
        let page = PaginatedResponse::new(vec![1, 2], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        let empty: PaginatedResponse<u8> = PaginatedResponse::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn list_query_is_clamped_to_config() {
        let mut cfg = config::AppConfig::new(
            "sqlite::memory:".into(),
            "x".repeat(64),
            3600,
            86400,
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        cfg.api_max_page_size = 50;
        let query = ListQuery {
            page: 0,
            limit: 500,
            ..ListQuery::default()
        }
        .normalized(&cfg);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 50);
    }
}
