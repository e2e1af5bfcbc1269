use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Garment ERP API",
        version = "1.0.0",
        description = r#"
# Garment Manufacturing ERP API

Orders move through cutting, stitching (batches), quality check, packing and dispatch to invoicing.
Procurement, inventory, user administration and training videos sit alongside.

## Authentication

Obtain a token pair from `/auth/login` and send the access token on every request:

```
Authorization: Bearer <your-jwt-token>
```

Each route is gated by a permission key granted to the caller's designation. Admin accounts pass every gate.

## Pagination

List endpoints take `page`, `limit` (max 100), `search`, `sort_by` and `sort_order` (asc/desc).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "auth", description = "Login and token rotation"),
        (name = "me", description = "The caller's profile and sidebar"),
        (name = "orders", description = "Customer orders and size distributions"),
        (name = "customers", description = "Customer records"),
        (name = "production", description = "Cutting assignments and stitching batches"),
        (name = "qc", description = "Quality check records and progress"),
        (name = "inventory", description = "Fabric and trims stock"),
        (name = "procurement", description = "Purchase orders and goods receipts"),
        (name = "invoices", description = "Customer invoicing"),
        (name = "admin", description = "Users, departments, designations and permissions"),
        (name = "tutorials", description = "Training videos"),
        (name = "files", description = "Uploaded images, videos and documents"),
        (name = "artifacts", description = "CSV templates, bundle labels and cutting sheets"),
        (name = "realtime", description = "Change feed over server-sent events")
    ),
    paths(
        // Auth
        crate::auth::login_handler,
        crate::auth::refresh_token_handler,

        // Me
        crate::handlers::me::profile,
        crate::handlers::me::sidebar,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::stage_summary,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::add_order_item,
        crate::handlers::orders::update_item_sizes,
        crate::handlers::orders::delete_order,

        // Customers
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,

        // Production
        crate::handlers::production::list_cutting_assignments,
        crate::handlers::production::cutting_summary,
        crate::handlers::production::create_cutting_assignment,
        crate::handlers::production::update_cut_quantities,
        crate::handlers::production::reassign_cutting_master,
        crate::handlers::production::list_batches,
        crate::handlers::production::get_batch,
        crate::handlers::production::create_batch,
        crate::handlers::production::update_batch,
        crate::handlers::production::delete_batch,
        crate::handlers::production::list_batch_assignments,
        crate::handlers::production::assign_batches,
        crate::handlers::production::reassign_batch,

        // QC
        crate::handlers::qc::item_progress,
        crate::handlers::qc::list_qc_records,
        crate::handlers::qc::assignment_progress,
        crate::handlers::qc::record_qc,

        // Inventory
        crate::handlers::inventory::list_items,
        crate::handlers::inventory::get_item,
        crate::handlers::inventory::list_movements,
        crate::handlers::inventory::create_item,
        crate::handlers::inventory::import_items,
        crate::handlers::inventory::update_item,
        crate::handlers::inventory::delete_item,
        crate::handlers::inventory::adjust_stock,

        // Procurement
        crate::handlers::procurement::list_purchase_orders,
        crate::handlers::procurement::get_purchase_order,
        crate::handlers::procurement::list_goods_receipts,
        crate::handlers::procurement::create_purchase_order,
        crate::handlers::procurement::cancel_purchase_order,
        crate::handlers::procurement::receive_goods,

        // Invoices
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::issue_invoice,
        crate::handlers::invoices::mark_paid,
        crate::handlers::invoices::cancel_invoice,

        // Admin
        crate::handlers::admin::list_users,
        crate::handlers::admin::get_user,
        crate::handlers::admin::create_user,
        crate::handlers::admin::update_user,
        crate::handlers::admin::delete_user,
        crate::handlers::admin::list_departments,
        crate::handlers::admin::create_department,
        crate::handlers::admin::update_department,
        crate::handlers::admin::delete_department,
        crate::handlers::admin::list_designations,
        crate::handlers::admin::get_designation,
        crate::handlers::admin::create_designation,
        crate::handlers::admin::update_designation,
        crate::handlers::admin::delete_designation,
        crate::handlers::admin::set_designation_permissions,
        crate::handlers::admin::permission_tree,

        // Tutorials and files
        crate::handlers::tutorials::list_tutorials,
        crate::handlers::tutorials::get_tutorial,
        crate::handlers::tutorials::create_tutorial,
        crate::handlers::tutorials::update_tutorial,
        crate::handlers::tutorials::delete_tutorial,
        crate::handlers::files::list_files,
        crate::handlers::files::get_file,
        crate::handlers::files::download_file,
        crate::handlers::files::upload_file,
        crate::handlers::files::delete_file,

        // Artifacts and realtime
        crate::handlers::artifacts::order_template,
        crate::handlers::artifacts::inventory_template,
        crate::handlers::artifacts::bundle_labels,
        crate::handlers::artifacts::cutting_sheet,
        crate::handlers::realtime::subscribe,
    ),
    components(
        schemas(
            crate::ListQuery,
            crate::ResponseMeta,
            crate::auth::TokenPair,
            crate::auth::LoginCredentials,
            crate::auth::RefreshTokenRequest,
            crate::services::allocation::SizeQuantity,
            crate::services::allocation::MoveRequest,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
