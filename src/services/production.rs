//! Cutting and batch assignment for order items.
//!
//! Every write runs in one transaction: the "left" ceilings are read, the request is resolved
//! against them with [`allocation`], and all dependent rows are written before commit. Events
//! go out only after the commit succeeds.

use crate::{
    cache::QueryCache,
    db::DbPool,
    entities::{
        batch,
        batch_assignment::{self, BatchAssignmentStatus},
        batch_assignment_size,
        cutting_assignment::{self, CuttingStatus},
        cutting_assignment_size,
        order::OrderStatus,
    },
    errors::ServiceError,
    events::{ChangeAction, Event, EventSender},
    metrics::BUSINESS_METRICS,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::allocation::{self, MoveRequest, SizeQuantity};
use super::orders::{advance_order, load_item_sizes, load_item_with_order, lock_item_with_order};
use super::{clean_optional, publish};

const BATCH_CACHE_KEY: &str = "batches:all";

// ---------------------------------------------------------------------------
// Requests and views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCuttingAssignmentRequest {
    pub order_item_id: Uuid,
    pub cutting_master: String,
    pub sizes: Vec<SizeQuantity>,
}

/// Cumulative cut pieces per size
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateCutRequest {
    pub sizes: Vec<SizeQuantity>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReassignCuttingRequest {
    pub cutting_master: String,
    /// `{"sizes": [...]}` or `{"total": n}`
    pub pieces: MoveRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CuttingSizeView {
    pub size: String,
    pub assigned: i32,
    pub cut: i32,
    pub left: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CuttingAssignmentDetail {
    #[serde(flatten)]
    pub assignment: cutting_assignment::Model,
    pub sizes: Vec<CuttingSizeView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CuttingSummaryRow {
    pub size: String,
    pub ordered: i32,
    pub assigned: i32,
    pub cut: i32,
    pub available_for_batches: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CuttingSummary {
    pub order_item_id: Uuid,
    pub sizes: Vec<CuttingSummaryRow>,
    pub total_ordered: i32,
    pub total_assigned: i32,
    pub total_cut: i32,
    pub total_available_for_batches: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBatchRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub supervisor: Option<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub worker_count: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBatchRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub supervisor: Option<String>,
    #[validate(range(min = 0))]
    pub worker_count: Option<i32>,
    pub is_active: Option<bool>,
}

/// Pieces of one order item handed to one batch
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchAllocation {
    pub batch_id: Uuid,
    pub sizes: Vec<SizeQuantity>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignBatchesRequest {
    pub order_item_id: Uuid,
    pub allocations: Vec<BatchAllocation>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReassignBatchRequest {
    pub target_batch_id: Uuid,
    /// `{"sizes": [...]}` or `{"total": n}`
    pub pieces: MoveRequest,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct BatchAssignmentFilter {
    pub order_item_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchSizeView {
    pub size: String,
    pub assigned: i32,
    pub reviewed: i32,
    pub left: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchAssignmentDetail {
    #[serde(flatten)]
    pub assignment: batch_assignment::Model,
    pub batch_name: Option<String>,
    pub sizes: Vec<BatchSizeView>,
}

impl From<&cutting_assignment_size::Model> for CuttingSizeView {
    fn from(row: &cutting_assignment_size::Model) -> Self {
        Self {
            size: row.size.clone(),
            assigned: row.assigned_quantity,
            cut: row.cut_quantity,
            left: row.left(),
        }
    }
}

impl From<&batch_assignment_size::Model> for BatchSizeView {
    fn from(row: &batch_assignment_size::Model) -> Self {
        Self {
            size: row.size.clone(),
            assigned: row.assigned_quantity,
            reviewed: row.reviewed_quantity,
            left: row.left(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared loaders
// ---------------------------------------------------------------------------

/// Per-size (assigned, cut) totals across every cutting assignment of an item
pub(crate) async fn cutting_totals<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
) -> Result<(Vec<SizeQuantity>, Vec<SizeQuantity>), ServiceError> {
    let assignment_ids: Vec<Uuid> = cutting_assignment::Entity::find()
        .filter(cutting_assignment::Column::OrderItemId.eq(order_item_id))
        .order_by_asc(cutting_assignment::Column::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    if assignment_ids.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let rows = cutting_assignment_size::Entity::find()
        .filter(cutting_assignment_size::Column::CuttingAssignmentId.is_in(assignment_ids))
        .all(conn)
        .await?;

    let mut assigned = Vec::new();
    let mut cut = Vec::new();
    for row in rows {
        assigned = allocation::add_each(
            &assigned,
            &[SizeQuantity::new(row.size.clone(), row.assigned_quantity)],
        );
        cut = allocation::add_each(&cut, &[SizeQuantity::new(row.size, row.cut_quantity)]);
    }
    Ok((assigned, cut))
}

/// Per-size pieces held by every batch assignment of an item
pub(crate) async fn batch_held<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
) -> Result<Vec<SizeQuantity>, ServiceError> {
    let assignment_ids: Vec<Uuid> = batch_assignment::Entity::find()
        .filter(batch_assignment::Column::OrderItemId.eq(order_item_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    if assignment_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = batch_assignment_size::Entity::find()
        .filter(batch_assignment_size::Column::BatchAssignmentId.is_in(assignment_ids))
        .all(conn)
        .await?;
    Ok(rows.into_iter().fold(Vec::new(), |acc, row| {
        allocation::add_each(&acc, &[SizeQuantity::new(row.size, row.assigned_quantity)])
    }))
}

async fn cutting_sizes<C: ConnectionTrait>(
    conn: &C,
    assignment_id: Uuid,
) -> Result<Vec<cutting_assignment_size::Model>, ServiceError> {
    Ok(cutting_assignment_size::Entity::find()
        .filter(cutting_assignment_size::Column::CuttingAssignmentId.eq(assignment_id))
        .all(conn)
        .await?)
}

pub(crate) async fn batch_sizes<C: ConnectionTrait>(
    conn: &C,
    assignment_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, Vec<batch_assignment_size::Model>>, ServiceError> {
    let mut grouped: HashMap<Uuid, Vec<batch_assignment_size::Model>> = HashMap::new();
    if assignment_ids.is_empty() {
        return Ok(grouped);
    }
    let rows = batch_assignment_size::Entity::find()
        .filter(batch_assignment_size::Column::BatchAssignmentId.is_in(assignment_ids))
        .all(conn)
        .await?;
    for row in rows {
        grouped.entry(row.batch_assignment_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Cut pieces per size not yet handed to a batch, in item size order
fn batch_ceilings(
    item_sizes: &[SizeQuantity],
    cut: &[SizeQuantity],
    held: &[SizeQuantity],
) -> Vec<SizeQuantity> {
    item_sizes
        .iter()
        .map(|s| {
            SizeQuantity::new(
                s.size.clone(),
                (allocation::quantity_of(cut, &s.size) - allocation::quantity_of(held, &s.size))
                    .max(0),
            )
        })
        .collect()
}

fn row_matches(row_size: &str, size: &str) -> bool {
    row_size.trim().eq_ignore_ascii_case(size.trim())
}

fn require_name(value: &str, what: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is required", what)));
    }
    Ok(trimmed.to_string())
}

fn reject_duplicate_sizes(sizes: &[SizeQuantity]) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for s in sizes {
        if !seen.insert(s.size.trim().to_ascii_uppercase()) {
            return Err(ServiceError::InvalidInput(format!(
                "Size {} is listed more than once",
                s.size.trim()
            )));
        }
    }
    Ok(())
}

/// Cutting and batch assignment service
#[derive(Clone)]
pub struct ProductionService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cache: QueryCache,
}

impl ProductionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        cache: QueryCache,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            cache,
        }
    }

    async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            publish(&self.event_sender, event).await;
        }
    }

    // -----------------------------------------------------------------------
    // Cutting
    // -----------------------------------------------------------------------

    /// Hands part of an item's ordered pieces to a cutting master.
    ///
    /// The first assignment moves a `received` order to `cutting`.
    #[instrument(skip(self, request), fields(order_item_id = %request.order_item_id))]
    pub async fn create_cutting_assignment(
        &self,
        request: CreateCuttingAssignmentRequest,
    ) -> Result<CuttingAssignmentDetail, ServiceError> {
        let master = require_name(&request.cutting_master, "Cutting master")?;
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin cutting assignment transaction");
            ServiceError::DatabaseError(e)
        })?;

        let (item, parent) = lock_item_with_order(&txn, request.order_item_id).await?;
        if !matches!(parent.status, OrderStatus::Received | OrderStatus::Cutting) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cutting cannot be assigned while order {} is {}",
                parent.order_number, parent.status
            )));
        }

        let ordered = load_item_sizes(&txn, item.id).await?;
        let (assigned, _) = cutting_totals(&txn, item.id).await?;
        let ceilings = allocation::subtract_each(&ordered, &assigned);
        let moved = allocation::resolve_request(&MoveRequest::Sizes(request.sizes), &ceilings)?;

        let now = Utc::now();
        let created = cutting_assignment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_item_id: Set(item.id),
            cutting_master: Set(master.clone()),
            status: Set(CuttingStatus::InProgress),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut rows = Vec::with_capacity(moved.len());
        for s in &moved {
            let row = cutting_assignment_size::ActiveModel {
                id: Set(Uuid::new_v4()),
                cutting_assignment_id: Set(created.id),
                size: Set(s.size.clone()),
                assigned_quantity: Set(s.quantity),
                cut_quantity: Set(0),
            }
            .insert(&txn)
            .await?;
            rows.push(row);
        }

        let advanced =
            advance_order(&txn, &parent, OrderStatus::Received, OrderStatus::Cutting).await?;

        txn.commit().await.map_err(|e| {
            error!(order_item_id = %item.id, error = %e, "Failed to commit cutting assignment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            cutting_assignment_id = %created.id,
            cutting_master = %master,
            pieces = allocation::sum(&moved),
            "Cutting assigned"
        );
        BUSINESS_METRICS.cutting_assignments.inc();

        let mut events = vec![Event::CuttingAssigned {
            cutting_assignment_id: created.id,
            order_item_id: item.id,
        }];
        events.extend(advanced);
        self.publish_all(events).await;

        Ok(CuttingAssignmentDetail {
            sizes: rows.iter().map(CuttingSizeView::from).collect(),
            assignment: created,
        })
    }

    /// Records cumulative cut pieces per size for one assignment
    #[instrument(skip(self, request))]
    pub async fn update_cut_quantities(
        &self,
        cutting_assignment_id: Uuid,
        request: UpdateCutRequest,
    ) -> Result<CuttingAssignmentDetail, ServiceError> {
        reject_duplicate_sizes(&request.sizes)?;
        if request.sizes.is_empty() {
            return Err(ServiceError::InvalidInput("No sizes given".to_string()));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let assignment = cutting_assignment::Entity::find_by_id(cutting_assignment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Cutting assignment {} not found",
                    cutting_assignment_id
                ))
            })?;
        if assignment.status == CuttingStatus::Reassigned {
            return Err(ServiceError::InvalidStatus(
                "A reassigned cutting assignment cannot record cut pieces".to_string(),
            ));
        }
        let (_, parent) = lock_item_with_order(&txn, assignment.order_item_id).await?;
        if parent.status.is_locked_for_changes() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {}",
                parent.order_number, parent.status
            )));
        }

        let rows = cutting_sizes(&txn, assignment.id).await?;
        let limits: Vec<SizeQuantity> = rows
            .iter()
            .map(|r| SizeQuantity::new(r.size.clone(), r.assigned_quantity))
            .collect();
        let wanted = allocation::validate_within(&request.sizes, &limits)?;

        // Batches may already hold cut pieces; the item's cut total must still cover them
        let (_, cut_before) = cutting_totals(&txn, assignment.order_item_id).await?;
        let held = batch_held(&txn, assignment.order_item_id).await?;
        for w in &wanted {
            let previous = rows
                .iter()
                .find(|r| row_matches(&r.size, &w.size))
                .map(|r| r.cut_quantity)
                .unwrap_or(0);
            let cut_after = allocation::quantity_of(&cut_before, &w.size) - previous + w.quantity;
            let in_batches = allocation::quantity_of(&held, &w.size);
            if cut_after < in_batches {
                return Err(ServiceError::ValidationError(format!(
                    "Size {} has {} pieces with batches; cut total cannot drop to {}",
                    w.size, in_batches, cut_after
                )));
            }
        }

        let mut updated_rows = Vec::with_capacity(rows.len());
        for row in rows {
            match wanted.iter().find(|w| row_matches(&row.size, &w.size)) {
                Some(w) if w.quantity != row.cut_quantity => {
                    let mut model: cutting_assignment_size::ActiveModel = row.into();
                    model.cut_quantity = Set(w.quantity);
                    updated_rows.push(model.update(&txn).await?);
                }
                _ => updated_rows.push(row),
            }
        }

        let fully_cut = updated_rows.iter().all(|r| r.left() == 0);
        let mut model: cutting_assignment::ActiveModel = assignment.into();
        model.status = Set(if fully_cut {
            CuttingStatus::Completed
        } else {
            CuttingStatus::InProgress
        });
        model.updated_at = Set(Utc::now());
        let assignment = model.update(&txn).await?;

        txn.commit().await?;

        info!(cutting_assignment_id = %assignment.id, status = %assignment.status, "Cut quantities recorded");
        publish(
            &self.event_sender,
            Event::CuttingProgressUpdated(assignment.id),
        )
        .await;

        Ok(CuttingAssignmentDetail {
            sizes: updated_rows.iter().map(CuttingSizeView::from).collect(),
            assignment,
        })
    }

    /// Moves uncut pieces from one cutting master to another
    #[instrument(skip(self, request))]
    pub async fn reassign_cutting_master(
        &self,
        cutting_assignment_id: Uuid,
        request: ReassignCuttingRequest,
    ) -> Result<CuttingAssignmentDetail, ServiceError> {
        let master = require_name(&request.cutting_master, "Cutting master")?;
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let source = cutting_assignment::Entity::find_by_id(cutting_assignment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Cutting assignment {} not found",
                    cutting_assignment_id
                ))
            })?;
        if source.cutting_master.trim().eq_ignore_ascii_case(&master) {
            return Err(ServiceError::InvalidInput(format!(
                "{} already holds this assignment",
                master
            )));
        }
        let (_, parent) = lock_item_with_order(&txn, source.order_item_id).await?;
        if parent.status.is_locked_for_changes() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {}",
                parent.order_number, parent.status
            )));
        }

        let rows = cutting_sizes(&txn, source.id).await?;
        let left: Vec<SizeQuantity> = rows
            .iter()
            .map(|r| SizeQuantity::new(r.size.clone(), r.left()))
            .collect();
        let moved = allocation::resolve_request(&request.pieces, &left)?;

        let now = Utc::now();
        let target = cutting_assignment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_item_id: Set(source.order_item_id),
            cutting_master: Set(master.clone()),
            status: Set(CuttingStatus::InProgress),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut target_rows = Vec::with_capacity(moved.len());
        for s in &moved {
            target_rows.push(
                cutting_assignment_size::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cutting_assignment_id: Set(target.id),
                    size: Set(s.size.clone()),
                    assigned_quantity: Set(s.quantity),
                    cut_quantity: Set(0),
                }
                .insert(&txn)
                .await?,
            );
        }

        let mut remaining_left = 0;
        let mut any_cut = false;
        for row in rows {
            let taken = allocation::quantity_of(&moved, &row.size);
            any_cut |= row.cut_quantity > 0;
            if taken == 0 {
                remaining_left += row.left();
                continue;
            }
            let mut model: cutting_assignment_size::ActiveModel = row.clone().into();
            model.assigned_quantity = Set(row.assigned_quantity - taken);
            let updated = model.update(&txn).await?;
            remaining_left += updated.left();
        }

        let source_id = source.id;
        let mut model: cutting_assignment::ActiveModel = source.into();
        if remaining_left == 0 {
            model.status = Set(if any_cut {
                CuttingStatus::Completed
            } else {
                CuttingStatus::Reassigned
            });
        }
        model.updated_at = Set(now);
        model.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(cutting_assignment_id = %source_id, error = %e, "Failed to commit cutting reassignment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            from_assignment_id = %source_id,
            to_assignment_id = %target.id,
            cutting_master = %master,
            pieces = allocation::sum(&moved),
            "Cutting master reassigned"
        );
        BUSINESS_METRICS.reassignments.inc();
        publish(
            &self.event_sender,
            Event::CuttingMasterReassigned {
                from_assignment_id: source_id,
                to_assignment_id: target.id,
            },
        )
        .await;

        Ok(CuttingAssignmentDetail {
            sizes: target_rows.iter().map(CuttingSizeView::from).collect(),
            assignment: target,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_cutting_assignments(
        &self,
        order_item_id: Uuid,
    ) -> Result<Vec<CuttingAssignmentDetail>, ServiceError> {
        let db = &*self.db_pool;
        let assignments = cutting_assignment::Entity::find()
            .filter(cutting_assignment::Column::OrderItemId.eq(order_item_id))
            .order_by_asc(cutting_assignment::Column::CreatedAt)
            .all(db)
            .await?;

        let mut out = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let rows = cutting_sizes(db, assignment.id).await?;
            out.push(CuttingAssignmentDetail {
                sizes: rows.iter().map(CuttingSizeView::from).collect(),
                assignment,
            });
        }
        Ok(out)
    }

    /// Per size: ordered, assigned to cutting, cut, and cut pieces not yet with a batch
    #[instrument(skip(self))]
    pub async fn cutting_summary(&self, order_item_id: Uuid) -> Result<CuttingSummary, ServiceError> {
        let db = &*self.db_pool;
        load_item_with_order(db, order_item_id).await?;

        let ordered = load_item_sizes(db, order_item_id).await?;
        let (assigned, cut) = cutting_totals(db, order_item_id).await?;
        let held = batch_held(db, order_item_id).await?;

        let sizes: Vec<CuttingSummaryRow> = ordered
            .iter()
            .map(|o| {
                let cut_pieces = allocation::quantity_of(&cut, &o.size);
                CuttingSummaryRow {
                    size: o.size.clone(),
                    ordered: o.quantity,
                    assigned: allocation::quantity_of(&assigned, &o.size),
                    cut: cut_pieces,
                    available_for_batches: (cut_pieces - allocation::quantity_of(&held, &o.size))
                        .max(0),
                }
            })
            .collect();

        Ok(CuttingSummary {
            order_item_id,
            total_ordered: sizes.iter().map(|s| s.ordered).sum(),
            total_assigned: sizes.iter().map(|s| s.assigned).sum(),
            total_cut: sizes.iter().map(|s| s.cut).sum(),
            total_available_for_batches: sizes.iter().map(|s| s.available_for_batches).sum(),
            sizes,
        })
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_batch(&self, request: CreateBatchRequest) -> Result<batch::Model, ServiceError> {
        request.validate()?;
        let name = require_name(&request.name, "Batch name")?;
        let db = &*self.db_pool;
        self.ensure_batch_name_free(&name, None).await?;

        let created = batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            supervisor: Set(clean_optional(request.supervisor)),
            worker_count: Set(request.worker_count),
            is_active: Set(request.is_active),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create batch");
            ServiceError::DatabaseError(e)
        })?;

        self.cache.invalidate("batches:").await;
        info!(batch_id = %created.id, "Batch created");
        publish(
            &self.event_sender,
            Event::record("batches", ChangeAction::Insert, created.id),
        )
        .await;
        Ok(created)
    }

    async fn ensure_batch_name_free(&self, name: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let taken = batch::Entity::find()
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .any(|b| Some(b.id) != except && b.name.eq_ignore_ascii_case(name));
        if taken {
            return Err(ServiceError::Conflict(format!("Batch {} already exists", name)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_batch(&self, id: Uuid) -> Result<batch::Model, ServiceError> {
        batch::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", id)))
    }

    /// All batches by name, served from the reference cache
    #[instrument(skip(self))]
    pub async fn list_batches(&self, active_only: bool) -> Result<Vec<batch::Model>, ServiceError> {
        let db = self.db_pool.clone();
        let batches: Vec<batch::Model> = self
            .cache
            .get_or_load(BATCH_CACHE_KEY, || async move {
                Ok(batch::Entity::find()
                    .order_by_asc(batch::Column::Name)
                    .all(&*db)
                    .await?)
            })
            .await?;

        Ok(batches
            .into_iter()
            .filter(|b| !active_only || b.is_active)
            .collect())
    }

    #[instrument(skip(self, request))]
    pub async fn update_batch(
        &self,
        id: Uuid,
        request: UpdateBatchRequest,
    ) -> Result<batch::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_batch(id).await?;
        let mut model: batch::ActiveModel = existing.into();

        if let Some(name) = request.name {
            let name = require_name(&name, "Batch name")?;
            self.ensure_batch_name_free(&name, Some(id)).await?;
            model.name = Set(name);
        }
        if request.supervisor.is_some() {
            model.supervisor = Set(clean_optional(request.supervisor));
        }
        if let Some(workers) = request.worker_count {
            model.worker_count = Set(workers);
        }
        if let Some(active) = request.is_active {
            model.is_active = Set(active);
        }

        let updated = model.update(&*self.db_pool).await?;
        self.cache.invalidate("batches:").await;
        info!(batch_id = %id, "Batch updated");
        publish(
            &self.event_sender,
            Event::record("batches", ChangeAction::Update, id),
        )
        .await;
        Ok(updated)
    }

    /// Batches that ever received work cannot be deleted; deactivate them instead
    #[instrument(skip(self))]
    pub async fn delete_batch(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.get_batch(id).await?;
        let assignments = batch_assignment::Entity::find()
            .filter(batch_assignment::Column::BatchId.eq(id))
            .count(db)
            .await?;
        if assignments > 0 {
            return Err(ServiceError::Conflict(format!(
                "Batch {} has {} assignment(s)",
                existing.name, assignments
            )));
        }

        batch::Entity::delete_by_id(id).exec(db).await?;
        self.cache.invalidate("batches:").await;
        info!(batch_id = %id, "Batch deleted");
        publish(
            &self.event_sender,
            Event::record("batches", ChangeAction::Delete, id),
        )
        .await;
        Ok(())
    }

    /// Hands cut pieces of one item to several batches at once.
    ///
    /// The per-size total across all allocations must fit what has been cut and is not yet
    /// with a batch. Moves a `cutting` order to `stitching`.
    #[instrument(skip(self, request), fields(order_item_id = %request.order_item_id, batches = request.allocations.len()))]
    pub async fn assign_batches(
        &self,
        request: AssignBatchesRequest,
    ) -> Result<Vec<BatchAssignmentDetail>, ServiceError> {
        if request.allocations.is_empty() {
            return Err(ServiceError::InvalidInput("No batches given".to_string()));
        }
        let mut seen = HashSet::new();
        for a in &request.allocations {
            if !seen.insert(a.batch_id) {
                return Err(ServiceError::InvalidInput(format!(
                    "Batch {} appears more than once",
                    a.batch_id
                )));
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin batch assignment transaction");
            ServiceError::DatabaseError(e)
        })?;

        let (item, parent) = lock_item_with_order(&txn, request.order_item_id).await?;
        if !matches!(
            parent.status,
            OrderStatus::Cutting | OrderStatus::Stitching | OrderStatus::QualityCheck
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Batches cannot be assigned while order {} is {}",
                parent.order_number, parent.status
            )));
        }

        let ordered = load_item_sizes(&txn, item.id).await?;
        let (_, cut) = cutting_totals(&txn, item.id).await?;
        let held = batch_held(&txn, item.id).await?;
        let ceilings = batch_ceilings(&ordered, &cut, &held);

        let mut batches = Vec::with_capacity(request.allocations.len());
        let mut combined: Vec<SizeQuantity> = Vec::new();
        for allocation_request in &request.allocations {
            let target = batch::Entity::find_by_id(allocation_request.batch_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Batch {} not found", allocation_request.batch_id))
                })?;
            if !target.is_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "Batch {} is inactive",
                    target.name
                )));
            }

            let pieces = allocation::validate_within(&allocation_request.sizes, &ceilings)?;
            let pieces: Vec<SizeQuantity> = pieces.into_iter().filter(|s| s.quantity > 0).collect();
            if pieces.is_empty() {
                return Err(ServiceError::InvalidInput(format!(
                    "Batch {} is given no pieces",
                    target.name
                )));
            }
            combined.extend(pieces.iter().cloned());
            batches.push((target, pieces));
        }
        // Each allocation fits on its own; together they must fit as well
        allocation::validate_within(&combined, &ceilings)?;

        let now = Utc::now();
        let mut created = Vec::with_capacity(batches.len());
        for (target, pieces) in batches {
            let assignment = batch_assignment::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_item_id: Set(item.id),
                batch_id: Set(target.id),
                status: Set(BatchAssignmentStatus::Assigned),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;

            let mut rows = Vec::with_capacity(pieces.len());
            for s in &pieces {
                rows.push(
                    batch_assignment_size::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        batch_assignment_id: Set(assignment.id),
                        size: Set(s.size.clone()),
                        assigned_quantity: Set(s.quantity),
                        reviewed_quantity: Set(0),
                    }
                    .insert(&txn)
                    .await?,
                );
            }
            created.push(BatchAssignmentDetail {
                batch_name: Some(target.name),
                sizes: rows.iter().map(BatchSizeView::from).collect(),
                assignment,
            });
        }

        let advanced =
            advance_order(&txn, &parent, OrderStatus::Cutting, OrderStatus::Stitching).await?;

        txn.commit().await.map_err(|e| {
            error!(order_item_id = %item.id, error = %e, "Failed to commit batch assignment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_item_id = %item.id,
            assignments = created.len(),
            pieces = allocation::sum(&combined),
            "Batches assigned"
        );
        BUSINESS_METRICS.batch_assignments.inc_by(created.len() as u64);

        let mut events = vec![Event::BatchesAssigned {
            order_item_id: item.id,
            batch_assignment_ids: created.iter().map(|c| c.assignment.id).collect(),
        }];
        events.extend(advanced);
        self.publish_all(events).await;

        Ok(created)
    }

    /// Moves unreviewed pieces of a batch assignment to another batch.
    ///
    /// Tops up the target batch's open assignment for the same item when there is one.
    #[instrument(skip(self, request), fields(target_batch_id = %request.target_batch_id))]
    pub async fn reassign_batch(
        &self,
        batch_assignment_id: Uuid,
        request: ReassignBatchRequest,
    ) -> Result<BatchAssignmentDetail, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let source = batch_assignment::Entity::find_by_id(batch_assignment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Batch assignment {} not found", batch_assignment_id))
            })?;
        if source.batch_id == request.target_batch_id {
            return Err(ServiceError::InvalidInput(
                "Target batch is the same as the current batch".to_string(),
            ));
        }
        let target_batch = batch::Entity::find_by_id(request.target_batch_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Batch {} not found", request.target_batch_id))
            })?;
        if !target_batch.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Batch {} is inactive",
                target_batch.name
            )));
        }
        let (_, parent) = lock_item_with_order(&txn, source.order_item_id).await?;
        if parent.status.is_locked_for_changes() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {}",
                parent.order_number, parent.status
            )));
        }

        let mut grouped = batch_sizes(&txn, vec![source.id]).await?;
        let source_rows = grouped.remove(&source.id).unwrap_or_default();
        let left: Vec<SizeQuantity> = source_rows
            .iter()
            .map(|r| SizeQuantity::new(r.size.clone(), r.left()))
            .collect();
        let moved = allocation::resolve_request(&request.pieces, &left)?;

        let now = Utc::now();
        let existing_target = batch_assignment::Entity::find()
            .filter(batch_assignment::Column::OrderItemId.eq(source.order_item_id))
            .filter(batch_assignment::Column::BatchId.eq(target_batch.id))
            .filter(batch_assignment::Column::Status.eq(BatchAssignmentStatus::Assigned))
            .order_by_asc(batch_assignment::Column::CreatedAt)
            .one(&txn)
            .await?;

        let target = match existing_target {
            Some(open) => {
                let mut model: batch_assignment::ActiveModel = open.into();
                model.updated_at = Set(now);
                model.update(&txn).await?
            }
            None => {
                batch_assignment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_item_id: Set(source.order_item_id),
                    batch_id: Set(target_batch.id),
                    status: Set(BatchAssignmentStatus::Assigned),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        let mut target_rows = batch_sizes(&txn, vec![target.id])
            .await?
            .remove(&target.id)
            .unwrap_or_default();
        for s in &moved {
            match target_rows.iter().position(|r| row_matches(&r.size, &s.size)) {
                Some(idx) => {
                    let row = target_rows[idx].clone();
                    let mut model: batch_assignment_size::ActiveModel = row.clone().into();
                    model.assigned_quantity = Set(row.assigned_quantity + s.quantity);
                    target_rows[idx] = model.update(&txn).await?;
                }
                None => {
                    target_rows.push(
                        batch_assignment_size::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            batch_assignment_id: Set(target.id),
                            size: Set(s.size.clone()),
                            assigned_quantity: Set(s.quantity),
                            reviewed_quantity: Set(0),
                        }
                        .insert(&txn)
                        .await?,
                    );
                }
            }
        }

        let mut remaining_left = 0;
        let mut any_reviewed = false;
        for row in source_rows {
            let taken = allocation::quantity_of(&moved, &row.size);
            any_reviewed |= row.reviewed_quantity > 0;
            if taken == 0 {
                remaining_left += row.left();
                continue;
            }
            let mut model: batch_assignment_size::ActiveModel = row.clone().into();
            model.assigned_quantity = Set(row.assigned_quantity - taken);
            remaining_left += model.update(&txn).await?.left();
        }

        let source_id = source.id;
        let mut model: batch_assignment::ActiveModel = source.into();
        if remaining_left == 0 {
            model.status = Set(if any_reviewed {
                BatchAssignmentStatus::Completed
            } else {
                BatchAssignmentStatus::Reassigned
            });
        }
        model.updated_at = Set(now);
        model.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(batch_assignment_id = %source_id, error = %e, "Failed to commit batch reassignment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            from_assignment_id = %source_id,
            to_assignment_id = %target.id,
            pieces = allocation::sum(&moved),
            "Batch reassigned"
        );
        BUSINESS_METRICS.reassignments.inc();
        publish(
            &self.event_sender,
            Event::BatchReassigned {
                from_assignment_id: source_id,
                to_assignment_id: target.id,
            },
        )
        .await;

        Ok(BatchAssignmentDetail {
            batch_name: Some(target_batch.name),
            sizes: target_rows.iter().map(BatchSizeView::from).collect(),
            assignment: target,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_batch_assignments(
        &self,
        filter: &BatchAssignmentFilter,
    ) -> Result<Vec<BatchAssignmentDetail>, ServiceError> {
        let db = &*self.db_pool;
        let mut select = batch_assignment::Entity::find();
        if let Some(item_id) = filter.order_item_id {
            select = select.filter(batch_assignment::Column::OrderItemId.eq(item_id));
        }
        if let Some(batch_id) = filter.batch_id {
            select = select.filter(batch_assignment::Column::BatchId.eq(batch_id));
        }
        let assignments = select
            .order_by_asc(batch_assignment::Column::CreatedAt)
            .all(db)
            .await?;

        let names: HashMap<Uuid, String> = match self.list_batches(false).await {
            Ok(batches) => batches.into_iter().map(|b| (b.id, b.name)).collect(),
            Err(e) => {
                warn!(error = %e, "Batch names unavailable");
                HashMap::new()
            }
        };
        let mut sizes = batch_sizes(db, assignments.iter().map(|a| a.id).collect()).await?;

        Ok(assignments
            .into_iter()
            .map(|assignment| BatchAssignmentDetail {
                batch_name: names.get(&assignment.batch_id).cloned(),
                sizes: sizes
                    .remove(&assignment.id)
                    .unwrap_or_default()
                    .iter()
                    .map(BatchSizeView::from)
                    .collect(),
                assignment,
            })
            .collect())
    }
}
