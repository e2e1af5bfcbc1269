use crate::{
    db::DbPool,
    entities::{
        batch_assignment::{self, BatchAssignmentStatus},
        batch_assignment_size,
        order::OrderStatus,
        qc_record,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::BUSINESS_METRICS,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::allocation::{self, SizeQuantity};
use super::orders::{advance_order, load_item_sizes, load_item_with_order, lock_item_with_order};
use super::production::batch_sizes;
use super::{clean_optional, publish};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QcEntry {
    pub size: String,
    pub approved: i32,
    pub rejected: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecordQcRequest {
    pub reviewed_by: Option<String>,
    pub remarks: Option<String>,
    pub entries: Vec<QcEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QcSizeProgress {
    pub size: String,
    pub assigned: i32,
    pub approved: i32,
    pub rejected: i32,
    pub pending: i32,
    pub completion_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QcProgress {
    pub sizes: Vec<QcSizeProgress>,
    pub total: QcSizeProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QcRecordResult {
    pub assignment: batch_assignment::Model,
    pub records: Vec<qc_record::Model>,
    pub progress: QcProgress,
}

fn completion_percent(reviewed: i32, assigned: i32) -> f64 {
    if assigned <= 0 {
        return 0.0;
    }
    (f64::from(reviewed) * 10_000.0 / f64::from(assigned)).round() / 100.0
}

fn progress_row(size: String, assigned: i32, approved: i32, rejected: i32) -> QcSizeProgress {
    QcSizeProgress {
        size,
        assigned,
        approved,
        rejected,
        pending: (assigned - approved - rejected).max(0),
        completion_percent: completion_percent(approved + rejected, assigned),
    }
}

/// Size-wise QC aggregation.
///
/// `size_order` fixes the output order; sizes that only appear in `assigned` or `records`
/// follow in first-seen order.
pub fn aggregate_progress(
    size_order: &[String],
    assigned: &[SizeQuantity],
    records: &[qc_record::Model],
) -> QcProgress {
    let mut sizes: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !sizes.iter().any(|k| k.eq_ignore_ascii_case(s.trim())) {
            sizes.push(s.trim().to_string());
        }
    };
    size_order.iter().for_each(|s| push(s));
    assigned.iter().for_each(|s| push(&s.size));
    records.iter().for_each(|r| push(&r.size));

    let rows: Vec<QcSizeProgress> = sizes
        .into_iter()
        .map(|size| {
            let (approved, rejected) = records
                .iter()
                .filter(|r| r.size.trim().eq_ignore_ascii_case(&size))
                .fold((0i32, 0i32), |(a, r), rec| {
                    (a.saturating_add(rec.approved), r.saturating_add(rec.rejected))
                });
            let assigned = allocation::quantity_of(assigned, &size);
            progress_row(size, assigned, approved, rejected)
        })
        .collect();

    let total = progress_row(
        "total".to_string(),
        rows.iter().map(|r| r.assigned).sum(),
        rows.iter().map(|r| r.approved).sum(),
        rows.iter().map(|r| r.rejected).sum(),
    );
    QcProgress { sizes: rows, total }
}

/// Quality-check review of batch assignments
#[derive(Clone)]
pub struct QcService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl QcService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Records approved and rejected pieces per size against what the batch still holds
    #[instrument(skip(self, request), fields(entries = request.entries.len()))]
    pub async fn record_qc(
        &self,
        batch_assignment_id: Uuid,
        request: RecordQcRequest,
    ) -> Result<QcRecordResult, ServiceError> {
        if request.entries.is_empty() {
            return Err(ServiceError::InvalidInput("No QC entries given".to_string()));
        }
        for entry in &request.entries {
            if entry.approved < 0 || entry.rejected < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Size {} has a negative count",
                    entry.size.trim()
                )));
            }
            match entry.approved.checked_add(entry.rejected) {
                None => {
                    return Err(ServiceError::ValidationError(format!(
                        "Size {} records more pieces than can be counted",
                        entry.size.trim()
                    )))
                }
                Some(0) => {
                    return Err(ServiceError::InvalidInput(format!(
                        "Size {} records no pieces",
                        entry.size.trim()
                    )))
                }
                Some(_) => {}
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin QC transaction");
            ServiceError::DatabaseError(e)
        })?;

        let assignment = batch_assignment::Entity::find_by_id(batch_assignment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Batch assignment {} not found", batch_assignment_id))
            })?;
        let (item, parent) = lock_item_with_order(&txn, assignment.order_item_id).await?;
        if parent.status.is_locked_for_changes() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {}",
                parent.order_number, parent.status
            )));
        }

        let rows = batch_sizes(&txn, vec![assignment.id])
            .await?
            .remove(&assignment.id)
            .unwrap_or_default();
        let left: Vec<SizeQuantity> = rows
            .iter()
            .map(|r| SizeQuantity::new(r.size.clone(), r.left()))
            .collect();
        let reviewed: Vec<SizeQuantity> = request
            .entries
            .iter()
            .map(|e| SizeQuantity::new(e.size.clone(), e.approved + e.rejected))
            .collect();
        allocation::validate_within(&reviewed, &left)?;

        let now = Utc::now();
        let reviewed_by = clean_optional(request.reviewed_by);
        let remarks = clean_optional(request.remarks);
        let mut records = Vec::with_capacity(request.entries.len());
        for entry in &request.entries {
            let canonical = rows
                .iter()
                .find(|r| r.size.trim().eq_ignore_ascii_case(entry.size.trim()))
                .map(|r| r.size.clone())
                .unwrap_or_else(|| entry.size.trim().to_string());
            records.push(
                qc_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    batch_assignment_id: Set(assignment.id),
                    size: Set(canonical),
                    approved: Set(entry.approved),
                    rejected: Set(entry.rejected),
                    reviewed_by: Set(reviewed_by.clone()),
                    remarks: Set(remarks.clone()),
                    created_at: Set(now),
                }
                .insert(&txn)
                .await?,
            );
        }

        let mut updated_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let added = allocation::quantity_of(&reviewed, &row.size);
            if added == 0 {
                updated_rows.push(row);
                continue;
            }
            let mut model: batch_assignment_size::ActiveModel = row.clone().into();
            model.reviewed_quantity = Set(row.reviewed_quantity + added);
            updated_rows.push(model.update(&txn).await?);
        }

        let mut model: batch_assignment::ActiveModel = assignment.into();
        if updated_rows.iter().all(|r| r.left() == 0) {
            model.status = Set(BatchAssignmentStatus::Completed);
        }
        model.updated_at = Set(now);
        let assignment = model.update(&txn).await?;

        let advanced =
            advance_order(&txn, &parent, OrderStatus::Stitching, OrderStatus::QualityCheck).await?;

        txn.commit().await.map_err(|e| {
            error!(batch_assignment_id = %batch_assignment_id, error = %e, "Failed to commit QC record");
            ServiceError::DatabaseError(e)
        })?;

        let approved = request
            .entries
            .iter()
            .fold(0i32, |acc, e| acc.saturating_add(e.approved));
        let rejected = request
            .entries
            .iter()
            .fold(0i32, |acc, e| acc.saturating_add(e.rejected));
        info!(
            batch_assignment_id = %assignment.id,
            approved,
            rejected,
            status = %assignment.status,
            "QC recorded"
        );
        BUSINESS_METRICS.qc_records.inc_by(records.len() as u64);
        BUSINESS_METRICS.pieces_approved.inc_by(approved as u64);
        BUSINESS_METRICS.pieces_rejected.inc_by(rejected as u64);

        publish(
            &self.event_sender,
            Event::QcRecorded {
                batch_assignment_id: assignment.id,
                approved,
                rejected,
            },
        )
        .await;
        if let Some(event) = advanced {
            publish(&self.event_sender, event).await;
        }

        let size_order: Vec<String> = load_item_sizes(db, item.id)
            .await?
            .into_iter()
            .map(|s| s.size)
            .collect();
        let assigned: Vec<SizeQuantity> = updated_rows
            .iter()
            .map(|r| SizeQuantity::new(r.size.clone(), r.assigned_quantity))
            .collect();
        let all_records = self.list_qc_records(assignment.id).await?;
        let progress = aggregate_progress(&size_order, &assigned, &all_records);

        Ok(QcRecordResult {
            assignment,
            records,
            progress,
        })
    }

    /// QC progress of an order item across all of its batch assignments
    #[instrument(skip(self))]
    pub async fn qc_progress(&self, order_item_id: Uuid) -> Result<QcProgress, ServiceError> {
        let db = &*self.db_pool;
        load_item_with_order(db, order_item_id).await?;

        let size_order: Vec<String> = load_item_sizes(db, order_item_id)
            .await?
            .into_iter()
            .map(|s| s.size)
            .collect();
        let assignment_ids: Vec<Uuid> = batch_assignment::Entity::find()
            .filter(batch_assignment::Column::OrderItemId.eq(order_item_id))
            .all(db)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();

        let assigned = batch_sizes(db, assignment_ids.clone())
            .await?
            .into_values()
            .flatten()
            .fold(Vec::new(), |acc, row| {
                allocation::add_each(&acc, &[SizeQuantity::new(row.size, row.assigned_quantity)])
            });
        let records = if assignment_ids.is_empty() {
            Vec::new()
        } else {
            qc_record::Entity::find()
                .filter(qc_record::Column::BatchAssignmentId.is_in(assignment_ids))
                .all(db)
                .await?
        };

        Ok(aggregate_progress(&size_order, &assigned, &records))
    }

    /// QC progress of a single batch assignment
    #[instrument(skip(self))]
    pub async fn assignment_progress(
        &self,
        batch_assignment_id: Uuid,
    ) -> Result<QcProgress, ServiceError> {
        let db = &*self.db_pool;
        let assignment = batch_assignment::Entity::find_by_id(batch_assignment_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Batch assignment {} not found", batch_assignment_id))
            })?;

        let size_order: Vec<String> = load_item_sizes(db, assignment.order_item_id)
            .await?
            .into_iter()
            .map(|s| s.size)
            .collect();
        let assigned: Vec<SizeQuantity> = batch_sizes(db, vec![assignment.id])
            .await?
            .remove(&assignment.id)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SizeQuantity::new(r.size, r.assigned_quantity))
            .collect();
        let records = self.list_qc_records(assignment.id).await?;

        Ok(aggregate_progress(&size_order, &assigned, &records))
    }

    #[instrument(skip(self))]
    pub async fn list_qc_records(
        &self,
        batch_assignment_id: Uuid,
    ) -> Result<Vec<qc_record::Model>, ServiceError> {
        Ok(qc_record::Entity::find()
            .filter(qc_record::Column::BatchAssignmentId.eq(batch_assignment_id))
            .order_by_asc(qc_record::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size: &str, approved: i32, rejected: i32) -> qc_record::Model {
        qc_record::Model {
            id: Uuid::new_v4(),
            batch_assignment_id: Uuid::nil(),
            size: size.to_string(),
            approved,
            rejected,
            reviewed_by: None,
            remarks: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn aggregates_per_size_in_distribution_order() {
        let order = vec!["S".to_string(), "M".to_string(), "L".to_string()];
        let assigned = vec![SizeQuantity::new("M", 30), SizeQuantity::new("S", 20)];
        let records = vec![record("S", 10, 2), record("m", 20, 1), record("S", 3, 0)];

        let progress = aggregate_progress(&order, &assigned, &records);
        let sizes: Vec<&str> = progress.sizes.iter().map(|s| s.size.as_str()).collect();
        assert_eq!(sizes, vec!["S", "M", "L"]);

        let s = &progress.sizes[0];
        assert_eq!((s.assigned, s.approved, s.rejected, s.pending), (20, 13, 2, 5));
        assert_eq!(s.completion_percent, 75.0);

        let l = &progress.sizes[2];
        assert_eq!((l.assigned, l.pending, l.completion_percent), (0, 0, 0.0));

        assert_eq!(progress.total.assigned, 50);
        assert_eq!(progress.total.approved, 33);
        assert_eq!(progress.total.rejected, 3);
        assert_eq!(progress.total.pending, 14);
        assert_eq!(progress.total.completion_percent, 72.0);
    }

    #[test]
    fn percent_rounds_to_two_decimals() {
        assert_eq!(completion_percent(1, 3), 33.33);
        assert_eq!(completion_percent(2, 3), 66.67);
        assert_eq!(completion_percent(5, 0), 0.0);
    }
}
