use crate::{
    db::DbPool,
    entities::{
        goods_receipt, goods_receipt_line, inventory_item,
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_line,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::BUSINESS_METRICS,
    ListQuery, PaginatedResponse,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::inventory::apply_movement;
use super::{
    clean_optional, contains_ci, fetch_page, next_document_number, publish, search_term,
    sort_direction,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PurchaseOrderLineInput {
    pub inventory_item_id: Uuid,
    #[schema(value_type = f64)]
    pub ordered_quantity: Decimal,
    #[schema(value_type = f64)]
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_name: String,
    pub expected_date: Option<NaiveDate>,
    pub lines: Vec<PurchaseOrderLineInput>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReceiptLineInput {
    pub purchase_order_line_id: Uuid,
    #[schema(value_type = f64)]
    pub received_quantity: Decimal,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub rejected_quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReceiveGoodsRequest {
    pub received_by: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<ReceiptLineInput>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub lines: Vec<purchase_order_line::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GoodsReceiptDetail {
    #[serde(flatten)]
    pub receipt: goods_receipt::Model,
    pub lines: Vec<goods_receipt_line::Model>,
}

/// Status a purchase order ends up in after a receipt
fn status_after_receipt(lines: &[purchase_order_line::Model]) -> PurchaseOrderStatus {
    if lines.iter().all(|l| l.outstanding().is_zero()) {
        PurchaseOrderStatus::Received
    } else {
        PurchaseOrderStatus::PartiallyReceived
    }
}

/// Purchase orders and goods receipt notes
#[derive(Clone)]
pub struct ProcurementService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProcurementService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(supplier = %request.supplier_name, lines = request.lines.len()))]
    pub async fn create_purchase_order(
        &self,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let supplier = request.supplier_name.trim().to_string();
        if supplier.is_empty() {
            return Err(ServiceError::ValidationError(
                "Supplier name is required".to_string(),
            ));
        }
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "A purchase order needs at least one line".to_string(),
            ));
        }
        for (idx, line) in request.lines.iter().enumerate() {
            if line.ordered_quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Line {}: ordered quantity must be positive",
                    idx + 1
                )));
            }
            if line.unit_cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Line {}: unit cost cannot be negative",
                    idx + 1
                )));
            }
        }

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin purchase order transaction");
            ServiceError::DatabaseError(e)
        })?;

        for line in &request.lines {
            inventory_item::Entity::find_by_id(line.inventory_item_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Inventory item {} not found",
                        line.inventory_item_id
                    ))
                })?;
        }

        let now = Utc::now();
        let po_number = next_document_number::<purchase_order::Entity, _>(
            &txn,
            purchase_order::Column::PoNumber,
            "PO",
            now.date_naive(),
        )
        .await?;

        let created = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            po_number: Set(po_number.clone()),
            supplier_name: Set(supplier),
            status: Set(PurchaseOrderStatus::Open),
            expected_date: Set(request.expected_date),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in request.lines {
            lines.push(
                purchase_order_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    purchase_order_id: Set(created.id),
                    inventory_item_id: Set(line.inventory_item_id),
                    ordered_quantity: Set(line.ordered_quantity),
                    received_quantity: Set(Decimal::ZERO),
                    unit_cost: Set(line.unit_cost),
                }
                .insert(&txn)
                .await?,
            );
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit purchase order");
            ServiceError::DatabaseError(e)
        })?;

        info!(purchase_order_id = %created.id, po_number = %po_number, "Purchase order created");
        publish(&self.event_sender, Event::PurchaseOrderCreated(created.id)).await;
        Ok(PurchaseOrderDetail {
            purchase_order: created,
            lines,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_purchase_order(&self, id: Uuid) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let found = purchase_order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", id)))?;
        let lines = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(id))
            .all(db)
            .await?;
        Ok(PurchaseOrderDetail {
            purchase_order: found,
            lines,
        })
    }

    /// Search covers PO number and supplier; newest first unless sorted otherwise
    #[instrument(skip(self))]
    pub async fn list_purchase_orders(
        &self,
        query: &ListQuery,
        filter: &PurchaseOrderFilter,
    ) -> Result<PaginatedResponse<purchase_order::Model>, ServiceError> {
        let mut select = purchase_order::Entity::find();
        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(contains_ci(purchase_order::Column::PoNumber, &term))
                    .add(contains_ci(purchase_order::Column::SupplierName, &term)),
            );
        }
        if let Some(status) = filter.status {
            select = select.filter(purchase_order::Column::Status.eq(status));
        }

        let direction = sort_direction(query.sort_order.as_deref(), Order::Desc);
        let column = match query.sort_by.as_deref() {
            Some("po_number") => purchase_order::Column::PoNumber,
            Some("supplier_name") => purchase_order::Column::SupplierName,
            Some("expected_date") => purchase_order::Column::ExpectedDate,
            _ => purchase_order::Column::CreatedAt,
        };
        select = select.order_by(column, direction);

        fetch_page(select, &*self.db_pool, query.page, query.limit).await
    }

    /// Only purchase orders with nothing received can be cancelled
    #[instrument(skip(self))]
    pub async fn cancel_purchase_order(&self, id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        let db = &*self.db_pool;
        let found = purchase_order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", id)))?;
        if found.status != PurchaseOrderStatus::Open {
            return Err(ServiceError::InvalidStatus(format!(
                "Purchase order {} is {} and cannot be cancelled",
                found.po_number, found.status
            )));
        }

        let mut model: purchase_order::ActiveModel = found.into();
        model.status = Set(PurchaseOrderStatus::Cancelled);
        model.updated_at = Set(Utc::now());
        let updated = model.update(db).await?;

        info!(purchase_order_id = %id, "Purchase order cancelled");
        publish(&self.event_sender, Event::PurchaseOrderCancelled(id)).await;
        Ok(updated)
    }

    /// Records a goods receipt note.
    ///
    /// Accepted pieces (received minus rejected) go into stock with a `grn` movement; the
    /// purchase order becomes partially or fully received.
    #[instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn receive_goods(
        &self,
        purchase_order_id: Uuid,
        request: ReceiveGoodsRequest,
    ) -> Result<GoodsReceiptDetail, ServiceError> {
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "A goods receipt needs at least one line".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for line in &request.lines {
            if !seen.insert(line.purchase_order_line_id) {
                return Err(ServiceError::InvalidInput(format!(
                    "Line {} appears more than once",
                    line.purchase_order_line_id
                )));
            }
            if line.received_quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Received quantity must be positive".to_string(),
                ));
            }
            if line.rejected_quantity < Decimal::ZERO
                || line.rejected_quantity > line.received_quantity
            {
                return Err(ServiceError::ValidationError(
                    "Rejected quantity must be between zero and the received quantity".to_string(),
                ));
            }
        }

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin goods receipt transaction");
            ServiceError::DatabaseError(e)
        })?;

        let po = purchase_order::Entity::find_by_id(purchase_order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;
        if matches!(
            po.status,
            PurchaseOrderStatus::Cancelled | PurchaseOrderStatus::Received
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Purchase order {} is {} and cannot receive goods",
                po.po_number, po.status
            )));
        }

        let mut po_lines = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(po.id))
            .all(&txn)
            .await?;

        let now = Utc::now();
        let grn_number = next_document_number::<goods_receipt::Entity, _>(
            &txn,
            goods_receipt::Column::GrnNumber,
            "GRN",
            now.date_naive(),
        )
        .await?;
        let receipt = goods_receipt::ActiveModel {
            id: Set(Uuid::new_v4()),
            grn_number: Set(grn_number.clone()),
            purchase_order_id: Set(po.id),
            received_by: Set(clean_optional(request.received_by)),
            notes: Set(clean_optional(request.notes)),
            received_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut receipt_lines = Vec::with_capacity(request.lines.len());
        for input in &request.lines {
            let idx = po_lines
                .iter()
                .position(|l| l.id == input.purchase_order_line_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Line {} is not on purchase order {}",
                        input.purchase_order_line_id, po.po_number
                    ))
                })?;
            let line = po_lines[idx].clone();
            if input.received_quantity > line.outstanding() {
                return Err(ServiceError::ValidationError(format!(
                    "Line {} has {} outstanding, cannot receive {}",
                    line.id,
                    line.outstanding(),
                    input.received_quantity
                )));
            }

            let accepted = input.received_quantity - input.rejected_quantity;
            receipt_lines.push(
                goods_receipt_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    goods_receipt_id: Set(receipt.id),
                    purchase_order_line_id: Set(line.id),
                    received_quantity: Set(input.received_quantity),
                    accepted_quantity: Set(accepted),
                    rejected_quantity: Set(input.rejected_quantity),
                }
                .insert(&txn)
                .await?,
            );

            if accepted > Decimal::ZERO {
                let item = inventory_item::Entity::find_by_id(line.inventory_item_id)
                    .lock_exclusive()
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Inventory item {} not found",
                            line.inventory_item_id
                        ))
                    })?;
                apply_movement(&txn, item, accepted, "grn", Some(grn_number.clone())).await?;
            }

            let mut model: purchase_order_line::ActiveModel = line.clone().into();
            model.received_quantity = Set(line.received_quantity + input.received_quantity);
            po_lines[idx] = model.update(&txn).await?;
        }

        let new_status = status_after_receipt(&po_lines);
        let mut model: purchase_order::ActiveModel = po.into();
        model.status = Set(new_status);
        model.updated_at = Set(now);
        model.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(purchase_order_id = %purchase_order_id, error = %e, "Failed to commit goods receipt");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            goods_receipt_id = %receipt.id,
            grn_number = %grn_number,
            status = %new_status,
            "Goods received"
        );
        BUSINESS_METRICS.goods_receipts.inc();
        publish(
            &self.event_sender,
            Event::GoodsReceived {
                purchase_order_id,
                goods_receipt_id: receipt.id,
            },
        )
        .await;

        Ok(GoodsReceiptDetail {
            receipt,
            lines: receipt_lines,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_goods_receipts(
        &self,
        purchase_order_id: Uuid,
    ) -> Result<Vec<GoodsReceiptDetail>, ServiceError> {
        let db = &*self.db_pool;
        let receipts = goods_receipt::Entity::find()
            .filter(goods_receipt::Column::PurchaseOrderId.eq(purchase_order_id))
            .order_by_asc(goods_receipt::Column::ReceivedAt)
            .all(db)
            .await?;

        let mut out = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            let lines = goods_receipt_line::Entity::find()
                .filter(goods_receipt_line::Column::GoodsReceiptId.eq(receipt.id))
                .all(db)
                .await?;
            out.push(GoodsReceiptDetail { receipt, lines });
        }
        Ok(out)
    }
}
