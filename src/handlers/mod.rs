pub mod admin;
pub mod artifacts;
pub mod common;
pub mod customers;
pub mod files;
pub mod inventory;
pub mod invoices;
pub mod me;
pub mod orders;
pub mod procurement;
pub mod production;
pub mod qc;
pub mod realtime;
pub mod tutorials;

use crate::cache::QueryCache;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    access::AccessService, artifacts::ArtifactService, customers::CustomerService,
    files::FileService, inventory::InventoryService, invoicing::InvoiceService,
    orders::OrderService, procurement::ProcurementService, production::ProductionService,
    qc::QcService, tutorials::TutorialService,
};
use crate::storage::BlobStore;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub customers: Arc<CustomerService>,
    pub orders: Arc<OrderService>,
    pub production: Arc<ProductionService>,
    pub qc: Arc<QcService>,
    pub inventory: Arc<InventoryService>,
    pub procurement: Arc<ProcurementService>,
    pub invoices: Arc<InvoiceService>,
    pub access: Arc<AccessService>,
    pub tutorials: Arc<TutorialService>,
    pub files: Arc<FileService>,
    pub artifacts: Arc<ArtifactService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        cache: QueryCache,
        storage: Arc<dyn BlobStore>,
        config: &AppConfig,
    ) -> Self {
        let events = Some(event_sender);

        let tax_rate = Decimal::from_f64(config.default_tax_rate)
            .map(|rate| rate.round_dp(4))
            .unwrap_or_else(|| {
                warn!(rate = config.default_tax_rate, "Unrepresentable tax rate; using 0");
                Decimal::ZERO
            });

        Self {
            customers: Arc::new(CustomerService::new(db_pool.clone(), events.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), events.clone())),
            production: Arc::new(ProductionService::new(
                db_pool.clone(),
                events.clone(),
                cache.clone(),
            )),
            qc: Arc::new(QcService::new(db_pool.clone(), events.clone())),
            inventory: Arc::new(InventoryService::new(db_pool.clone(), events.clone())),
            procurement: Arc::new(ProcurementService::new(db_pool.clone(), events.clone())),
            invoices: Arc::new(InvoiceService::new(
                db_pool.clone(),
                events.clone(),
                tax_rate,
                config.default_currency.clone(),
            )),
            access: Arc::new(AccessService::new(db_pool.clone(), events.clone(), cache)),
            tutorials: Arc::new(TutorialService::new(db_pool.clone(), events.clone())),
            files: Arc::new(FileService::new(
                db_pool.clone(),
                events,
                storage,
                config.max_upload_bytes,
            )),
            artifacts: Arc::new(ArtifactService::new(db_pool, config.bundle_size)),
        }
    }
}
