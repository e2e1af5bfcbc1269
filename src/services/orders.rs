use crate::{
    db::DbPool,
    entities::{
        customer, cutting_assignment, invoice,
        order::{self, OrderStatus},
        order_item, size_distribution,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::BUSINESS_METRICS,
    ListQuery, PaginatedResponse,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::allocation::{self, SizeQuantity};
use super::production::cutting_totals;
use super::{
    clean_optional, contains_ci, fetch_page, next_document_number, publish, search_term,
    sort_direction,
};

/// One garment style of an order with its size breakdown
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemInput {
    #[validate(length(min = 1, max = 200))]
    pub style: String,
    pub color: Option<String>,
    pub fabric: Option<String>,
    #[schema(value_type = f64)]
    pub unit_price: Decimal,
    pub sizes: Vec<SizeQuantity>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    /// Defaults to today
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateSizesRequest {
    pub sizes: Vec<SizeQuantity>,
}

/// Extra filters for the order list
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: order_item::Model,
    pub sizes: Vec<SizeQuantity>,
}

/// Order with its customer name, items and size breakdowns
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub customer_name: Option<String>,
    pub total_quantity: i32,
    pub items: Vec<OrderItemDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StageCount {
    pub status: OrderStatus,
    pub count: u64,
}

/// Checks an item's sizes: at least one, unique names, no negatives, some pieces.
/// Returns them trimmed.
pub(crate) fn validate_sizes(sizes: &[SizeQuantity]) -> Result<Vec<SizeQuantity>, ServiceError> {
    if sizes.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one size is required".to_string(),
        ));
    }

    let mut cleaned: Vec<SizeQuantity> = Vec::with_capacity(sizes.len());
    for entry in sizes {
        let size = entry.size.trim();
        if size.is_empty() {
            return Err(ServiceError::ValidationError(
                "Size name cannot be blank".to_string(),
            ));
        }
        if entry.quantity < 0 {
            return Err(ServiceError::ValidationError(format!(
                "Size {} has a negative quantity",
                size
            )));
        }
        if cleaned.iter().any(|c| c.size.eq_ignore_ascii_case(size)) {
            return Err(ServiceError::ValidationError(format!(
                "Size {} is listed more than once",
                size
            )));
        }
        cleaned.push(SizeQuantity::new(size, entry.quantity));
    }

    match allocation::checked_sum(&cleaned) {
        None => Err(ServiceError::ValidationError(format!(
            "An item cannot hold more than {} pieces",
            i32::MAX
        ))),
        Some(total) if total <= 0 => Err(ServiceError::ValidationError(
            "An item must contain at least one piece".to_string(),
        )),
        Some(_) => Ok(cleaned),
    }
}

fn validate_item(input: &OrderItemInput) -> Result<Vec<SizeQuantity>, ServiceError> {
    input.validate()?;
    if input.style.trim().is_empty() {
        return Err(ServiceError::ValidationError("Style is required".to_string()));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Unit price cannot be negative".to_string(),
        ));
    }
    validate_sizes(&input.sizes)
}

/// Item sizes in distribution order
pub(crate) async fn load_item_sizes<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
) -> Result<Vec<SizeQuantity>, ServiceError> {
    let rows = size_distribution::Entity::find()
        .filter(size_distribution::Column::OrderItemId.eq(order_item_id))
        .order_by_asc(size_distribution::Column::Position)
        .all(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| SizeQuantity::new(r.size, r.quantity))
        .collect())
}

/// Order item together with the order it belongs to
pub(crate) async fn load_item_with_order<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
) -> Result<(order_item::Model, order::Model), ServiceError> {
    fetch_item_with_order(conn, order_item_id, false).await
}

/// Same as [`load_item_with_order`], but the item row stays locked until the transaction
/// ends, so size ceilings computed from it hold until commit
pub(crate) async fn lock_item_with_order<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
) -> Result<(order_item::Model, order::Model), ServiceError> {
    fetch_item_with_order(conn, order_item_id, true).await
}

async fn fetch_item_with_order<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
    lock: bool,
) -> Result<(order_item::Model, order::Model), ServiceError> {
    let mut select = order_item::Entity::find_by_id(order_item_id);
    if lock {
        select = select.lock_exclusive();
    }
    let item = select
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", order_item_id)))?;
    let parent = order::Entity::find_by_id(item.order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", item.order_id)))?;
    Ok((item, parent))
}

/// Moves the order to `to` when it currently sits at `from`; returns the change if made
pub(crate) async fn advance_order<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<Option<Event>, ServiceError> {
    if order.status != from {
        return Ok(None);
    }
    let mut model: order::ActiveModel = order.clone().into();
    model.status = Set(to);
    model.updated_at = Set(Utc::now());
    model.update(conn).await?;
    info!(order_id = %order.id, from = %from, to = %to, "Order advanced");
    Ok(Some(Event::OrderStatusChanged {
        order_id: order.id,
        old_status: from.to_string(),
        new_status: to.to_string(),
    }))
}

async fn insert_item<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    input: OrderItemInput,
    sizes: Vec<SizeQuantity>,
) -> Result<order_item::Model, ServiceError> {
    let item = order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        style: Set(input.style.trim().to_string()),
        color: Set(clean_optional(input.color)),
        fabric: Set(clean_optional(input.fabric)),
        unit_price: Set(input.unit_price),
        total_quantity: Set(allocation::sum(&sizes)),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    insert_sizes(conn, item.id, &sizes).await?;
    Ok(item)
}

async fn insert_sizes<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
    sizes: &[SizeQuantity],
) -> Result<(), ServiceError> {
    if sizes.is_empty() {
        return Ok(());
    }
    let rows = sizes
        .iter()
        .enumerate()
        .map(|(position, s)| size_distribution::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_item_id: Set(order_item_id),
            size: Set(s.size.clone()),
            position: Set(position as i32),
            quantity: Set(s.quantity),
        });
    size_distribution::Entity::insert_many(rows).exec(conn).await?;
    Ok(())
}

/// Service for managing orders and their size breakdowns
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order with its items and size distributions in one transaction
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id, items = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        let mut prepared = Vec::with_capacity(request.items.len());
        for (idx, item) in request.items.into_iter().enumerate() {
            let sizes = validate_item(&item).map_err(|e| match e {
                ServiceError::ValidationError(msg) => {
                    ServiceError::ValidationError(format!("Item {}: {}", idx + 1, msg))
                }
                other => other,
            })?;
            prepared.push((item, sizes));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        customer::Entity::find_by_id(request.customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", request.customer_id))
            })?;

        let now = Utc::now();
        let order_number = next_document_number::<order::Entity, _>(
            &txn,
            order::Column::OrderNumber,
            "ORD",
            now.date_naive(),
        )
        .await?;

        let created = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            customer_id: Set(request.customer_id),
            status: Set(OrderStatus::Received),
            order_date: Set(request.order_date.unwrap_or_else(|| now.date_naive())),
            delivery_date: Set(request.delivery_date),
            notes: Set(clean_optional(request.notes)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        for (item, sizes) in prepared {
            insert_item(&txn, created.id, item, sizes).await?;
        }

        txn.commit().await.map_err(|e| {
            error!(order_id = %created.id, error = %e, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %created.id, order_number = %order_number, "Order created");
        BUSINESS_METRICS.orders_created.inc();
        publish(&self.event_sender, Event::OrderCreated(created.id)).await;

        self.get_order(created.id).await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let found = order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let customer_name = customer::Entity::find_by_id(found.customer_id)
            .one(db)
            .await?
            .map(|c| c.name);

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::CreatedAt)
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await?;

        let item_ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        let mut sizes_by_item: HashMap<Uuid, Vec<SizeQuantity>> = HashMap::new();
        if !item_ids.is_empty() {
            let rows = size_distribution::Entity::find()
                .filter(size_distribution::Column::OrderItemId.is_in(item_ids))
                .order_by_asc(size_distribution::Column::Position)
                .all(db)
                .await?;
            for row in rows {
                sizes_by_item
                    .entry(row.order_item_id)
                    .or_default()
                    .push(SizeQuantity::new(row.size, row.quantity));
            }
        }

        let items: Vec<OrderItemDetail> = items
            .into_iter()
            .map(|item| OrderItemDetail {
                sizes: sizes_by_item.remove(&item.id).unwrap_or_default(),
                item,
            })
            .collect();
        let total_quantity = items
            .iter()
            .fold(0i32, |acc, i| acc.saturating_add(i.item.total_quantity));

        Ok(OrderDetail {
            order: found,
            customer_name,
            total_quantity,
            items,
        })
    }

    /// Search matches the order number; sorts by order_date, order_number, delivery_date or
    /// created_at (default, newest first)
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        query: &ListQuery,
        filter: &OrderFilter,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let mut select = order::Entity::find();

        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(contains_ci(order::Column::OrderNumber, &term));
        }
        if let Some(status) = filter.status {
            select = select.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(order::Column::CustomerId.eq(customer_id));
        }

        let direction = sort_direction(query.sort_order.as_deref(), Order::Desc);
        let column = match query.sort_by.as_deref() {
            Some("order_date") => order::Column::OrderDate,
            Some("order_number") => order::Column::OrderNumber,
            Some("delivery_date") => order::Column::DeliveryDate,
            _ => order::Column::CreatedAt,
        };
        select = select.order_by(column, direction);

        fetch_page(select, &*self.db_pool, query.page, query.limit).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_order(
        &self,
        id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let mut model: order::ActiveModel = existing.into();
        if request.delivery_date.is_some() {
            model.delivery_date = Set(request.delivery_date);
        }
        if request.notes.is_some() {
            model.notes = Set(clean_optional(request.notes));
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(db).await.map_err(|e| {
            error!(order_id = %id, error = %e, "Failed to update order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %id, "Order updated");
        publish(&self.event_sender, Event::OrderUpdated(id)).await;
        Ok(updated)
    }

    /// One step forward through the pipeline, or cancellation before dispatch
    #[instrument(skip(self), fields(new_status = %new_status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let old_status = existing.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from {} to {}",
                existing.order_number, old_status, new_status
            )));
        }

        let mut model: order::ActiveModel = existing.into();
        model.status = Set(new_status);
        model.updated_at = Set(Utc::now());
        let updated = model.update(db).await?;

        info!(order_id = %id, old_status = %old_status, new_status = %new_status, "Order status changed");
        BUSINESS_METRICS.order_status_changes.inc();
        publish(
            &self.event_sender,
            Event::OrderStatusChanged {
                order_id: id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            },
        )
        .await;
        Ok(updated)
    }

    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        order_id: Uuid,
        input: OrderItemInput,
    ) -> Result<OrderItemDetail, ServiceError> {
        let sizes = validate_item(&input)?;
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let parent = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if parent.status.is_locked_for_changes() {
            return Err(ServiceError::InvalidOperation(format!(
                "Items cannot be added to an order that is {}",
                parent.status
            )));
        }

        let item = insert_item(&txn, order_id, input, sizes.clone()).await?;
        let mut touched: order::ActiveModel = parent.into();
        touched.updated_at = Set(Utc::now());
        touched.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, order_item_id = %item.id, "Order item added");
        publish(
            &self.event_sender,
            Event::OrderItemAdded {
                order_id,
                order_item_id: item.id,
            },
        )
        .await;
        Ok(OrderItemDetail { item, sizes })
    }

    /// Replaces the item's size breakdown.
    ///
    /// A size may not shrink below what cutting already holds for it, and sizes with cutting
    /// work cannot be dropped.
    #[instrument(skip(self, sizes))]
    pub async fn update_size_distribution(
        &self,
        order_item_id: Uuid,
        sizes: Vec<SizeQuantity>,
    ) -> Result<OrderItemDetail, ServiceError> {
        let sizes = validate_sizes(&sizes)?;
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let (item, parent) = lock_item_with_order(&txn, order_item_id).await?;
        if parent.status.is_locked_for_changes() {
            return Err(ServiceError::InvalidOperation(format!(
                "Sizes cannot change once the order is {}",
                parent.status
            )));
        }

        let (assigned, _) = cutting_totals(&txn, order_item_id).await?;
        for held in assigned.iter().filter(|s| s.quantity > 0) {
            let wanted = sizes
                .iter()
                .find(|s| s.size.eq_ignore_ascii_case(held.size.trim()));
            match wanted {
                None => {
                    return Err(ServiceError::ValidationError(format!(
                        "Size {} has {} pieces with cutting and cannot be removed",
                        held.size, held.quantity
                    )))
                }
                Some(w) if w.quantity < held.quantity => {
                    return Err(ServiceError::ValidationError(format!(
                        "Size {} cannot drop below {} pieces already assigned to cutting",
                        held.size, held.quantity
                    )))
                }
                Some(_) => {}
            }
        }

        size_distribution::Entity::delete_many()
            .filter(size_distribution::Column::OrderItemId.eq(order_item_id))
            .exec(&txn)
            .await?;
        insert_sizes(&txn, order_item_id, &sizes).await?;

        let mut model: order_item::ActiveModel = item.into();
        model.total_quantity = Set(allocation::sum(&sizes));
        let item = model.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(order_item_id = %order_item_id, error = %e, "Failed to commit size update");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_item_id = %order_item_id, total = item.total_quantity, "Size distribution replaced");
        publish(&self.event_sender, Event::SizeDistributionUpdated(order_item_id)).await;
        Ok(OrderItemDetail { item, sizes })
    }

    /// Only fresh or cancelled orders without cutting work or invoices can be deleted
    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let existing = order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        if !matches!(existing.status, OrderStatus::Received | OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is {} and cannot be deleted",
                existing.order_number, existing.status
            )));
        }

        let item_ids: Vec<Uuid> = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();

        if !item_ids.is_empty() {
            let cutting = cutting_assignment::Entity::find()
                .filter(cutting_assignment::Column::OrderItemId.is_in(item_ids.clone()))
                .count(&txn)
                .await?;
            if cutting > 0 {
                return Err(ServiceError::Conflict(format!(
                    "Order {} already has cutting assignments",
                    existing.order_number
                )));
            }
        }
        let invoices = invoice::Entity::find()
            .filter(invoice::Column::OrderId.eq(id))
            .count(&txn)
            .await?;
        if invoices > 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} has invoices",
                existing.order_number
            )));
        }

        if !item_ids.is_empty() {
            size_distribution::Entity::delete_many()
                .filter(size_distribution::Column::OrderItemId.is_in(item_ids))
                .exec(&txn)
                .await?;
        }
        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.eq(id))
            .exec(&txn)
            .await?;
        order::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(order_id = %id, "Order deleted");
        publish(&self.event_sender, Event::OrderDeleted(id)).await;
        Ok(())
    }

    /// Order count per status, every status listed
    #[instrument(skip(self))]
    pub async fn stage_summary(&self) -> Result<Vec<StageCount>, ServiceError> {
        let rows: Vec<(OrderStatus, i64)> = order::Entity::find()
            .select_only()
            .column(order::Column::Status)
            .column_as(Expr::col(order::Column::Id).count(), "count")
            .group_by(order::Column::Status)
            .into_tuple()
            .all(&*self.db_pool)
            .await?;

        Ok(OrderStatus::PIPELINE
            .iter()
            .copied()
            .chain(std::iter::once(OrderStatus::Cancelled))
            .map(|status| StageCount {
                status,
                count: rows
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map(|(_, c)| (*c).max(0) as u64)
                    .unwrap_or(0),
            })
            .collect())
    }
}
