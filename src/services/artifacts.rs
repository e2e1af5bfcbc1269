//! Downloadable CSV artifacts: import templates, bundle tickets and cutting sheets.

use crate::{
    db::DbPool,
    entities::{batch, batch_assignment, batch_assignment_size, cutting_assignment, cutting_assignment_size},
    errors::ServiceError,
    storage::sanitize_file_name,
};
use csv::WriterBuilder;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::inventory::IMPORT_COLUMNS;
use super::orders::{load_item_sizes, load_item_with_order};

/// Size columns of the order import template
pub const STANDARD_SIZES: [&str; 6] = ["XS", "S", "M", "L", "XL", "XXL"];

/// Most tickets one bundle label sheet may hold
pub const MAX_BUNDLE_LABELS: i64 = 5_000;

/// A rendered CSV file ready to be served as an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvArtifact {
    pub file_name: String,
    pub content: Vec<u8>,
}

fn render(file_name: &str, rows: Vec<Vec<String>>) -> Result<CsvArtifact, ServiceError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for row in rows {
        writer.write_record(&row)?;
    }
    let content = writer
        .into_inner()
        .map_err(|e| ServiceError::InternalError(format!("Failed to finish CSV: {}", e)))?;
    Ok(CsvArtifact {
        file_name: file_name.to_string(),
        content,
    })
}

fn strings<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Splits `quantity` into bundles of `bundle_size`; the last bundle takes the remainder
pub fn split_into_bundles(quantity: i32, bundle_size: i32) -> Vec<i32> {
    if quantity <= 0 || bundle_size <= 0 {
        return Vec::new();
    }
    let full = quantity / bundle_size;
    let mut bundles = vec![bundle_size; full as usize];
    if quantity % bundle_size > 0 {
        bundles.push(quantity % bundle_size);
    }
    bundles
}

/// Tickets `split_into_bundles` would produce across all `quantities`
pub fn bundle_count(quantities: impl IntoIterator<Item = i32>, bundle_size: i32) -> i64 {
    if bundle_size <= 0 {
        return 0;
    }
    let size = i64::from(bundle_size);
    quantities
        .into_iter()
        .filter(|q| *q > 0)
        .map(|q| (i64::from(q) + size - 1) / size)
        .sum()
}

pub fn order_import_template() -> Result<CsvArtifact, ServiceError> {
    let mut header = strings(["style", "color", "fabric", "unit_price"]);
    header.extend(STANDARD_SIZES.iter().map(|s| s.to_string()));
    let example = strings(["Polo Shirt", "Navy", "Pique Cotton", "4.50", "0", "20", "40", "40", "20", "0"]);
    render("order-import-template.csv", vec![header, example])
}

pub fn inventory_import_template() -> Result<CsvArtifact, ServiceError> {
    let header: Vec<String> = IMPORT_COLUMNS.iter().map(|c| c.to_string()).collect();
    let example = strings(["THR-NAVY-40", "Navy thread 40s", "trims", "cone", "20", "1.25", "100"]);
    render("inventory-import-template.csv", vec![header, example])
}

/// Renders bundle tickets and cutting sheets from production data
#[derive(Clone)]
pub struct ArtifactService {
    db_pool: Arc<DbPool>,
    bundle_size: i32,
}

impl ArtifactService {
    pub fn new(db_pool: Arc<DbPool>, bundle_size: i32) -> Self {
        Self {
            db_pool,
            bundle_size,
        }
    }

    /// One ticket per bundle; numbering runs across the whole assignment from 1
    #[instrument(skip(self))]
    pub async fn bundle_labels(
        &self,
        batch_assignment_id: Uuid,
        bundle_size: Option<i32>,
    ) -> Result<CsvArtifact, ServiceError> {
        let bundle_size = bundle_size.unwrap_or(self.bundle_size);
        if bundle_size <= 0 {
            return Err(ServiceError::ValidationError(
                "Bundle size must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let assignment = batch_assignment::Entity::find_by_id(batch_assignment_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Batch assignment {} not found", batch_assignment_id))
            })?;
        let (item, parent) = load_item_with_order(db, assignment.order_item_id).await?;
        let batch_name = batch::Entity::find_by_id(assignment.batch_id)
            .one(db)
            .await?
            .map(|b| b.name)
            .unwrap_or_default();

        let mut sizes = batch_assignment_size::Entity::find()
            .filter(batch_assignment_size::Column::BatchAssignmentId.eq(batch_assignment_id))
            .all(db)
            .await?;
        let order_of_sizes = load_item_sizes(db, item.id).await?;
        sizes.sort_by_key(|row| {
            order_of_sizes
                .iter()
                .position(|s| s.size.eq_ignore_ascii_case(&row.size))
                .unwrap_or(usize::MAX)
        });

        let tickets = bundle_count(sizes.iter().map(|r| r.assigned_quantity), bundle_size);
        if tickets > MAX_BUNDLE_LABELS {
            return Err(ServiceError::ValidationError(format!(
                "Bundle size {} would print {} tickets, at most {} fit one sheet",
                bundle_size, tickets, MAX_BUNDLE_LABELS
            )));
        }

        let mut rows = vec![strings([
            "order_number", "style", "color", "batch", "size", "bundle_no", "pieces",
        ])];
        let mut bundle_no = 0;
        for row in &sizes {
            for pieces in split_into_bundles(row.assigned_quantity, bundle_size) {
                bundle_no += 1;
                rows.push(vec![
                    parent.order_number.clone(),
                    item.style.clone(),
                    item.color.clone().unwrap_or_default(),
                    batch_name.clone(),
                    row.size.clone(),
                    bundle_no.to_string(),
                    pieces.to_string(),
                ]);
            }
        }

        debug!(bundles = bundle_no, "Rendered bundle labels");
        let file_name = sanitize_file_name(&format!(
            "bundle-labels-{}-{}.csv",
            parent.order_number, batch_name
        ));
        render(&file_name, rows)
    }

    /// One row per cutting assignment and size, in assignment then size order
    #[instrument(skip(self))]
    pub async fn cutting_sheet(&self, order_item_id: Uuid) -> Result<CsvArtifact, ServiceError> {
        let db = &*self.db_pool;
        let (item, parent) = load_item_with_order(db, order_item_id).await?;
        let order_of_sizes = load_item_sizes(db, item.id).await?;

        let assignments = cutting_assignment::Entity::find()
            .filter(cutting_assignment::Column::OrderItemId.eq(order_item_id))
            .order_by_asc(cutting_assignment::Column::CreatedAt)
            .all(db)
            .await?;

        let mut rows = vec![strings(["cutting_master", "size", "assigned", "cut", "left"])];
        for assignment in assignments {
            let mut sizes = cutting_assignment_size::Entity::find()
                .filter(cutting_assignment_size::Column::CuttingAssignmentId.eq(assignment.id))
                .all(db)
                .await?;
            sizes.sort_by_key(|row| {
                order_of_sizes
                    .iter()
                    .position(|s| s.size.eq_ignore_ascii_case(&row.size))
                    .unwrap_or(usize::MAX)
            });
            for row in sizes {
                rows.push(vec![
                    assignment.cutting_master.clone(),
                    row.size.clone(),
                    row.assigned_quantity.to_string(),
                    row.cut_quantity.to_string(),
                    row.left().to_string(),
                ]);
            }
        }

        let file_name = sanitize_file_name(&format!(
            "cutting-sheet-{}-{}.csv",
            parent.order_number, item.style
        ));
        render(&file_name, rows)
    }
}
