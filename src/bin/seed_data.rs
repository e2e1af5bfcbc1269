//! Seed data script - creates the first admin account and optional demo records
//!
//! Run with: cargo run --bin seed-data -- --admin-email admin@factory.local --admin-password '...' --demo
//!
//! The admin account is always created. With `--demo` it also creates:
//! - departments and designations with sensible permission sets
//! - customers, sewing batches and stores items
//! - a couple of orders with size distributions

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use garment_erp::{
    auth::consts as perm,
    cache::QueryCache,
    config, db,
    errors::ServiceError,
    services::{
        access::{
            AccessService, CreateDesignationRequest, CreateUserRequest, DepartmentRequest,
            SetPermissionsRequest,
        },
        allocation::SizeQuantity,
        customers::{CreateCustomerRequest, CustomerService},
        inventory::{CreateInventoryItemRequest, InventoryService},
        orders::{CreateOrderRequest, OrderItemInput, OrderService},
        production::{CreateBatchRequest, ProductionService},
    },
};

#[derive(Parser)]
#[command(name = "seed-data", about = "Create the admin account and optional demo data", version)]
struct Cli {
    #[arg(long, env = "SEED_ADMIN_EMAIL", default_value = "admin@factory.local")]
    admin_email: String,
    #[arg(long, env = "SEED_ADMIN_PASSWORD")]
    admin_password: String,
    #[arg(long, default_value = "Administrator")]
    admin_name: String,
    /// Also create demo departments, customers, batches, stock and orders
    #[arg(long)]
    demo: bool,
}

/// Treats an existing record as success so the script can be re-run
fn tolerate_existing<T>(result: Result<T, ServiceError>, what: &str) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ServiceError::Conflict(msg)) => {
            warn!("{} already present: {}", what, msg);
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to create {}", what)),
    }
}

fn sizes(pairs: &[(&str, i32)]) -> Vec<SizeQuantity> {
    pairs
        .iter()
        .map(|(size, quantity)| SizeQuantity::new(*size, *quantity))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("=== Garment ERP seed data ===");
    let conn = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&conn).await?;
    let db = Arc::new(conn);

    let cache = QueryCache::in_memory(cfg.cache_ttl());
    let access = AccessService::new(db.clone(), None, cache.clone());

    tolerate_existing(
        access
            .create_user(CreateUserRequest {
                name: cli.admin_name.clone(),
                email: cli.admin_email.clone(),
                password: cli.admin_password.clone(),
                designation_id: None,
                is_admin: true,
                active: true,
            })
            .await,
        "admin account",
    )?;
    info!(email = %cli.admin_email, "Admin account ready");

    if !cli.demo {
        return Ok(());
    }

    // Departments and designations
    let roles: [(&str, &str, &[&str]); 4] = [
        ("Cutting", "Cutting Supervisor", &[perm::DASHBOARD, perm::ORDERS_READ, "production"]),
        ("Stitching", "Line Supervisor", &[perm::DASHBOARD, perm::PRODUCTION_READ, perm::QC_READ]),
        ("Quality", "QC Inspector", &[perm::DASHBOARD, perm::PRODUCTION_READ, perm::QC_READ, perm::QC_WRITE]),
        ("Stores", "Storekeeper", &[perm::DASHBOARD, "stores", perm::TUTORIALS_READ]),
    ];
    for (department_name, designation_name, keys) in roles {
        let department = tolerate_existing(
            access
                .create_department(DepartmentRequest {
                    name: department_name.to_string(),
                })
                .await,
            "department",
        )?;
        let Some(department) = department else {
            continue;
        };
        let designation = access
            .create_designation(CreateDesignationRequest {
                name: designation_name.to_string(),
                department_id: Some(department.id),
            })
            .await?;
        access
            .set_designation_permissions(
                designation.id,
                SetPermissionsRequest {
                    permission_keys: keys.iter().map(|k| k.to_string()).collect(),
                },
            )
            .await?;
        info!(designation = designation_name, "Designation seeded");
    }

    // Customers
    let customers = CustomerService::new(db.clone(), None);
    let mut customer_ids = Vec::new();
    for (name, contact, email) in [
        ("Northwind Apparel", "Maya Lin", "orders@northwind.example"),
        ("Blue Harbor Retail", "Sam Okafor", "buying@blueharbor.example"),
    ] {
        if let Some(customer) = tolerate_existing(
            customers
                .create_customer(CreateCustomerRequest {
                    name: name.to_string(),
                    contact_person: Some(contact.to_string()),
                    phone: None,
                    email: Some(email.to_string()),
                    address: None,
                    tax_id: None,
                })
                .await,
            "customer",
        )? {
            customer_ids.push(customer.id);
        }
    }

    // Sewing batches
    let production = ProductionService::new(db.clone(), None, cache);
    for (name, supervisor, workers) in [("Line A", "Ravi", 18), ("Line B", "Lena", 15)] {
        tolerate_existing(
            production
                .create_batch(CreateBatchRequest {
                    name: name.to_string(),
                    supervisor: Some(supervisor.to_string()),
                    worker_count: workers,
                    is_active: true,
                })
                .await,
            "batch",
        )?;
    }

    // Stores
    let inventory = InventoryService::new(db.clone(), None);
    let stock = [
        ("FAB-PQ-NAVY", "Pique cotton, navy", "fabric", "m", dec!(200), dec!(3.40), dec!(1200)),
        ("FAB-JER-WHT", "Single jersey, white", "fabric", "m", dec!(200), dec!(2.10), dec!(800)),
        ("TRM-BTN-12", "Buttons 12L", "trims", "pcs", dec!(1000), dec!(0.02), dec!(15000)),
        ("THR-NAVY-40", "Navy thread 40s", "trims", "cone", dec!(20), dec!(1.25), dec!(60)),
    ];
    for (sku, name, category, unit, reorder_level, unit_cost, opening_quantity) in stock {
        tolerate_existing(
            inventory
                .create_item(CreateInventoryItemRequest {
                    sku: sku.to_string(),
                    name: name.to_string(),
                    category: Some(category.to_string()),
                    unit: unit.to_string(),
                    reorder_level,
                    unit_cost,
                    opening_quantity,
                })
                .await,
            "inventory item",
        )?;
    }

    // Orders
    let orders = OrderService::new(db, None);
    for customer_id in customer_ids {
        let order = orders
            .create_order(CreateOrderRequest {
                customer_id,
                order_date: None,
                delivery_date: None,
                notes: Some("Demo order".to_string()),
                items: vec![
                    OrderItemInput {
                        style: "Polo Shirt".to_string(),
                        color: Some("Navy".to_string()),
                        fabric: Some("Pique Cotton".to_string()),
                        unit_price: dec!(4.50),
                        sizes: sizes(&[("S", 40), ("M", 80), ("L", 80), ("XL", 40)]),
                    },
                    OrderItemInput {
                        style: "Crew Tee".to_string(),
                        color: Some("White".to_string()),
                        fabric: Some("Single Jersey".to_string()),
                        unit_price: dec!(2.75),
                        sizes: sizes(&[("M", 120), ("L", 120)]),
                    },
                ],
            })
            .await?;
        info!(order_number = %order.order.order_number, "Demo order created");
    }

    info!("=== Seed data complete ===");
    info!("Explore interactively at: http://{}:{}/swagger-ui", cfg.host, cfg.port);
    Ok(())
}
