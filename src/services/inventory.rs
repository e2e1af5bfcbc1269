use crate::{
    db::DbPool,
    entities::{inventory_item, purchase_order_line, stock_movement},
    errors::ServiceError,
    events::{ChangeAction, Event, EventSender},
    metrics::BUSINESS_METRICS,
    ListQuery, PaginatedResponse,
};
use chrono::Utc;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, contains_ci, fetch_page, publish, search_term, sort_direction};

/// Column order of the inventory import template
pub const IMPORT_COLUMNS: [&str; 7] = [
    "sku",
    "name",
    "category",
    "unit",
    "reorder_level",
    "unit_cost",
    "opening_quantity",
];

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateInventoryItemRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub reorder_level: Decimal,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub unit_cost: Decimal,
    /// Recorded as an `opening` stock movement when positive
    #[serde(default)]
    #[schema(value_type = f64)]
    pub opening_quantity: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateInventoryItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub reorder_level: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub unit_cost: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed change to on-hand quantity
    #[schema(value_type = f64)]
    pub quantity: Decimal,
    pub reason: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct InventoryFilter {
    pub category: Option<String>,
    /// Only items at or below their reorder level
    pub low_stock: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustment {
    pub item: inventory_item::Model,
    pub movement: stock_movement::Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportSummary {
    pub created: usize,
    pub items: Vec<inventory_item::Model>,
}

fn check_non_negative(value: Decimal, field: &str) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            field
        )));
    }
    Ok(())
}

/// Applies a signed stock change and records the movement; on-hand may not go negative
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    item: inventory_item::Model,
    delta: Decimal,
    reason: &str,
    reference: Option<String>,
) -> Result<(inventory_item::Model, stock_movement::Model), ServiceError> {
    let new_quantity = item.quantity_on_hand + delta;
    if new_quantity < Decimal::ZERO {
        return Err(ServiceError::InsufficientStock(format!(
            "{} has {} {} on hand, cannot remove {}",
            item.sku,
            item.quantity_on_hand,
            item.unit,
            -delta
        )));
    }

    let now = Utc::now();
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_item_id: Set(item.id),
        quantity: Set(delta),
        reason: Set(reason.to_string()),
        reference: Set(reference),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut model: inventory_item::ActiveModel = item.into();
    model.quantity_on_hand = Set(new_quantity);
    model.updated_at = Set(now);
    let item = model.update(conn).await?;
    Ok((item, movement))
}

#[derive(Debug)]
struct NewItem {
    sku: String,
    name: String,
    category: Option<String>,
    unit: String,
    reorder_level: Decimal,
    unit_cost: Decimal,
    opening_quantity: Decimal,
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, String> {
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = Decimal::from_str(raw).map_err(|_| format!("{} '{}' is not a number", field, raw))?;
    if value < Decimal::ZERO {
        return Err(format!("{} cannot be negative", field));
    }
    Ok(value)
}

/// Parses the import template; rows are numbered as in a spreadsheet (header is row 1)
fn parse_import(data: &[u8]) -> Result<Vec<NewItem>, ServiceError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(Trim::All)
        .from_reader(Cursor::new(data));

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ServiceError::InvalidInput(format!("Failed to read CSV header: {}", e)))?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    if headers != IMPORT_COLUMNS {
        return Err(ServiceError::InvalidInput(format!(
            "Expected columns {}",
            IMPORT_COLUMNS.join(",")
        )));
    }

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for (idx, result) in reader.records().enumerate() {
        let row_num = idx + 2;
        let record = result
            .map_err(|e| ServiceError::InvalidInput(format!("Row {}: {}", row_num, e)))?;
        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let invalid = |msg: String| ServiceError::ValidationError(format!("Row {}: {}", row_num, msg));

        let sku = field(0);
        let name = field(1);
        let unit = field(3);
        if sku.is_empty() {
            return Err(invalid("sku is required".to_string()));
        }
        if name.is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        if unit.is_empty() {
            return Err(invalid("unit is required".to_string()));
        }
        if !seen.insert(sku.to_ascii_uppercase()) {
            return Err(invalid(format!("sku {} appears more than once", sku)));
        }

        rows.push(NewItem {
            reorder_level: parse_decimal(&field(4), "reorder_level").map_err(invalid)?,
            unit_cost: parse_decimal(&field(5), "unit_cost").map_err(invalid)?,
            opening_quantity: parse_decimal(&field(6), "opening_quantity").map_err(invalid)?,
            category: clean_optional(Some(field(2))),
            sku,
            name,
            unit,
        });
    }

    if rows.is_empty() {
        return Err(ServiceError::InvalidInput("The file has no rows".to_string()));
    }
    Ok(rows)
}

/// Stores inventory: items, stock movements and CSV import
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn sku_taken<C: ConnectionTrait>(conn: &C, sku: &str) -> Result<bool, ServiceError> {
        let existing = inventory_item::Entity::find()
            .filter(
                Expr::expr(Func::upper(Expr::col(inventory_item::Column::Sku)))
                    .eq(sku.to_ascii_uppercase()),
            )
            .count(conn)
            .await?;
        Ok(existing > 0)
    }

    async fn insert_item<C: ConnectionTrait>(
        conn: &C,
        new: NewItem,
    ) -> Result<inventory_item::Model, ServiceError> {
        if Self::sku_taken(conn, &new.sku).await? {
            return Err(ServiceError::Conflict(format!("SKU {} already exists", new.sku)));
        }

        let now = Utc::now();
        let item = inventory_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(new.sku),
            name: Set(new.name),
            category: Set(new.category),
            unit: Set(new.unit),
            quantity_on_hand: Set(Decimal::ZERO),
            reorder_level: Set(new.reorder_level),
            unit_cost: Set(new.unit_cost),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        if new.opening_quantity > Decimal::ZERO {
            let (item, _) =
                apply_movement(conn, item, new.opening_quantity, "opening", None).await?;
            return Ok(item);
        }
        Ok(item)
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_item(
        &self,
        request: CreateInventoryItemRequest,
    ) -> Result<inventory_item::Model, ServiceError> {
        request.validate()?;
        check_non_negative(request.reorder_level, "Reorder level")?;
        check_non_negative(request.unit_cost, "Unit cost")?;
        check_non_negative(request.opening_quantity, "Opening quantity")?;
        let sku = request.sku.trim().to_string();
        let name = request.name.trim().to_string();
        let unit = request.unit.trim().to_string();
        if sku.is_empty() || name.is_empty() || unit.is_empty() {
            return Err(ServiceError::ValidationError(
                "SKU, name and unit are required".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        let item = Self::insert_item(
            &txn,
            NewItem {
                sku,
                name,
                category: clean_optional(request.category),
                unit,
                reorder_level: request.reorder_level,
                unit_cost: request.unit_cost,
                opening_quantity: request.opening_quantity,
            },
        )
        .await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit inventory item");
            ServiceError::DatabaseError(e)
        })?;

        info!(item_id = %item.id, sku = %item.sku, "Inventory item created");
        publish(
            &self.event_sender,
            Event::record("inventory_items", ChangeAction::Insert, item.id),
        )
        .await;
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, id: Uuid) -> Result<inventory_item::Model, ServiceError> {
        inventory_item::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory item {} not found", id)))
    }

    /// Search covers SKU and name; sorts by sku, name (default), quantity_on_hand or created_at
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        query: &ListQuery,
        filter: &InventoryFilter,
    ) -> Result<PaginatedResponse<inventory_item::Model>, ServiceError> {
        let mut select = inventory_item::Entity::find();

        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(contains_ci(inventory_item::Column::Sku, &term))
                    .add(contains_ci(inventory_item::Column::Name, &term)),
            );
        }
        if let Some(category) = search_term(filter.category.as_deref()) {
            select = select.filter(inventory_item::Column::Category.eq(category));
        }
        if filter.low_stock.unwrap_or(false) {
            select = select.filter(
                Expr::col(inventory_item::Column::QuantityOnHand)
                    .lte(Expr::col(inventory_item::Column::ReorderLevel)),
            );
        }

        let direction = sort_direction(query.sort_order.as_deref(), Order::Asc);
        let column = match query.sort_by.as_deref() {
            Some("sku") => inventory_item::Column::Sku,
            Some("quantity_on_hand") => inventory_item::Column::QuantityOnHand,
            Some("created_at") => inventory_item::Column::CreatedAt,
            _ => inventory_item::Column::Name,
        };
        select = select.order_by(column, direction);

        fetch_page(select, &*self.db_pool, query.page, query.limit).await
    }

    /// SKU and on-hand quantity are not editable here
    #[instrument(skip(self, request))]
    pub async fn update_item(
        &self,
        id: Uuid,
        request: UpdateInventoryItemRequest,
    ) -> Result<inventory_item::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_item(id).await?;
        let mut model: inventory_item::ActiveModel = existing.into();

        if let Some(name) = request.name {
            model.name = Set(name.trim().to_string());
        }
        if request.category.is_some() {
            model.category = Set(clean_optional(request.category));
        }
        if let Some(unit) = request.unit {
            model.unit = Set(unit.trim().to_string());
        }
        if let Some(level) = request.reorder_level {
            check_non_negative(level, "Reorder level")?;
            model.reorder_level = Set(level);
        }
        if let Some(cost) = request.unit_cost {
            check_non_negative(cost, "Unit cost")?;
            model.unit_cost = Set(cost);
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(&*self.db_pool).await?;
        info!(item_id = %id, "Inventory item updated");
        publish(
            &self.event_sender,
            Event::record("inventory_items", ChangeAction::Update, id),
        )
        .await;
        Ok(updated)
    }

    /// Items on purchase orders cannot be deleted; their movement history goes with them
    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = inventory_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory item {} not found", id)))?;

        let on_orders = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::InventoryItemId.eq(id))
            .count(&txn)
            .await?;
        if on_orders > 0 {
            return Err(ServiceError::Conflict(format!(
                "{} is on {} purchase order line(s)",
                existing.sku, on_orders
            )));
        }

        stock_movement::Entity::delete_many()
            .filter(stock_movement::Column::InventoryItemId.eq(id))
            .exec(&txn)
            .await?;
        inventory_item::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(item_id = %id, "Inventory item deleted");
        publish(
            &self.event_sender,
            Event::record("inventory_items", ChangeAction::Delete, id),
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self, request), fields(quantity = %request.quantity))]
    pub async fn adjust_stock(
        &self,
        item_id: Uuid,
        request: AdjustStockRequest,
    ) -> Result<StockAdjustment, ServiceError> {
        if request.quantity.is_zero() {
            return Err(ServiceError::InvalidInput(
                "Adjustment quantity cannot be zero".to_string(),
            ));
        }
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError("Reason is required".to_string()));
        }

        let txn = self.db_pool.begin().await?;
        let item = inventory_item::Entity::find_by_id(item_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory item {} not found", item_id)))?;

        let (item, movement) = apply_movement(
            &txn,
            item,
            request.quantity,
            &reason,
            clean_optional(request.reference),
        )
        .await?;
        txn.commit().await.map_err(|e| {
            error!(item_id = %item_id, error = %e, "Failed to commit stock adjustment");
            ServiceError::DatabaseError(e)
        })?;

        info!(item_id = %item_id, on_hand = %item.quantity_on_hand, reason = %reason, "Stock adjusted");
        if item.is_low_stock() {
            warn!(item_id = %item_id, sku = %item.sku, "Item at or below reorder level");
        }
        BUSINESS_METRICS.stock_adjustments.inc();
        publish(
            &self.event_sender,
            Event::StockAdjusted {
                item_id,
                movement_id: movement.id,
            },
        )
        .await;
        Ok(StockAdjustment { item, movement })
    }

    /// Movements of one item, newest first
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.get_item(item_id).await?;
        Ok(stock_movement::Entity::find()
            .filter(stock_movement::Column::InventoryItemId.eq(item_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Bulk-creates items from the import template; nothing is written if any row fails
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn import_items_csv(&self, data: &[u8]) -> Result<ImportSummary, ServiceError> {
        let rows = parse_import(data)?;
        let txn = self.db_pool.begin().await?;

        let mut items = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            let row_num = idx + 2;
            let item = Self::insert_item(&txn, row)
            .await
            .map_err(|e| match e {
                ServiceError::Conflict(msg) => {
                    ServiceError::Conflict(format!("Row {}: {}", row_num, msg))
                }
                other => other,
            })?;
            items.push(item);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit inventory import");
            ServiceError::DatabaseError(e)
        })?;

        info!(created = items.len(), "Inventory items imported");
        for item in &items {
            publish(
                &self.event_sender,
                Event::record("inventory_items", ChangeAction::Insert, item.id),
            )
            .await;
        }
        Ok(ImportSummary {
            created: items.len(),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_template_rows() {
        let csv = b"sku,name,category,unit,reorder_level,unit_cost,opening_quantity\n\
                    THR-01, Polyester thread ,trims,cone,10,45.5,100\n\
                    BTN-02,Shirt button,,piece,,0.8,\n";
        let rows = parse_import(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Polyester thread");
        assert_eq!(rows[0].unit_cost, dec!(45.5));
        assert_eq!(rows[1].category, None);
        assert_eq!(rows[1].reorder_level, Decimal::ZERO);
        assert_eq!(rows[1].opening_quantity, Decimal::ZERO);
    }

    #[test]
    fn reports_first_bad_row() {
        let csv = b"sku,name,category,unit,reorder_level,unit_cost,opening_quantity\n\
                    A,Fabric,,m,1,2,3\n\
                    B,Zip,,piece,-1,2,3\n";
        assert_matches!(
            parse_import(csv),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("Row 3:")
        );
    }

    #[test]
    fn rejects_duplicate_skus_and_wrong_header() {
        let dup = b"sku,name,category,unit,reorder_level,unit_cost,opening_quantity\n\
                    A,One,,m,,,\n\
                    a,Two,,m,,,\n";
        assert_matches!(parse_import(dup), Err(ServiceError::ValidationError(msg)) if msg.contains("more than once"));

        let wrong = b"code,name\nA,One\n";
        assert_matches!(parse_import(wrong), Err(ServiceError::InvalidInput(_)));

        let empty = b"sku,name,category,unit,reorder_level,unit_cost,opening_quantity\n";
        assert_matches!(parse_import(empty), Err(ServiceError::InvalidInput(_)));
    }
}
