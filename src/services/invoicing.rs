use crate::{
    db::DbPool,
    entities::{
        batch_assignment,
        invoice::{self, InvoiceStatus},
        invoice_line,
        order::{self, OrderStatus},
        order_item, qc_record,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::BUSINESS_METRICS,
    ListQuery, PaginatedResponse,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::orders::advance_order;
use super::{contains_ci, fetch_page, next_document_number, publish, search_term, sort_direction};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateInvoiceRequest {
    pub order_id: Uuid,
    /// Fraction between 0 and 1; the configured default when absent
    #[schema(value_type = Option<f64>)]
    pub tax_rate: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    /// Bill only QC-approved pieces instead of the ordered quantity
    #[serde(default)]
    pub approved_only: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub lines: Vec<invoice_line::Model>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Subtotal of the line amounts, tax rounded half away from zero to cents, and the total
pub fn compute_totals(amounts: &[Decimal], tax_rate: Decimal) -> InvoiceTotals {
    let subtotal: Decimal = amounts.iter().copied().sum();
    let tax_amount =
        (subtotal * tax_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    InvoiceTotals {
        subtotal,
        tax_amount,
        total: subtotal + tax_amount,
    }
}

fn line_description(item: &order_item::Model) -> String {
    let mut parts = vec![item.style.clone()];
    if let Some(color) = &item.color {
        parts.push(color.clone());
    }
    if let Some(fabric) = &item.fabric {
        parts.push(fabric.clone());
    }
    parts.join(" / ")
}

/// QC-approved pieces across every batch assignment of an item
async fn approved_pieces<C: ConnectionTrait>(
    conn: &C,
    order_item_id: Uuid,
) -> Result<i32, ServiceError> {
    let assignment_ids: Vec<Uuid> = batch_assignment::Entity::find()
        .filter(batch_assignment::Column::OrderItemId.eq(order_item_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    if assignment_ids.is_empty() {
        return Ok(0);
    }
    Ok(qc_record::Entity::find()
        .filter(qc_record::Column::BatchAssignmentId.is_in(assignment_ids))
        .all(conn)
        .await?
        .iter()
        .map(|r| r.approved)
        .sum())
}

/// Invoices raised against orders
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    default_tax_rate: Decimal,
    currency: String,
}

impl InvoiceService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        default_tax_rate: Decimal,
        currency: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_tax_rate,
            currency,
        }
    }

    /// One line per order item with pieces to bill
    #[instrument(skip(self, request), fields(order_id = %request.order_id, approved_only = request.approved_only))]
    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        let tax_rate = request.tax_rate.unwrap_or(self.default_tax_rate);
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(ServiceError::ValidationError(
                "Tax rate must be between 0 and 1".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin invoice transaction");
            ServiceError::DatabaseError(e)
        })?;

        let billed = order::Entity::find_by_id(request.order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", request.order_id)))?;
        if billed.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is cancelled",
                billed.order_number
            )));
        }

        let open_invoice = invoice::Entity::find()
            .filter(invoice::Column::OrderId.eq(billed.id))
            .filter(invoice::Column::Status.ne(InvoiceStatus::Cancelled))
            .one(&txn)
            .await?;
        if let Some(existing) = open_invoice {
            return Err(ServiceError::Conflict(format!(
                "Order {} already has invoice {}",
                billed.order_number, existing.invoice_number
            )));
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(billed.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&txn)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let quantity = if request.approved_only {
                approved_pieces(&txn, item.id).await?
            } else {
                item.total_quantity
            };
            if quantity > 0 {
                lines.push((item, quantity, item.unit_price * Decimal::from(quantity)));
            }
        }
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} has nothing to bill",
                billed.order_number
            )));
        }

        let amounts: Vec<Decimal> = lines.iter().map(|(_, _, amount)| *amount).collect();
        let totals = compute_totals(&amounts, tax_rate);

        let now = Utc::now();
        let invoice_number = next_document_number::<invoice::Entity, _>(
            &txn,
            invoice::Column::InvoiceNumber,
            "INV",
            now.date_naive(),
        )
        .await?;

        let created = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(invoice_number.clone()),
            order_id: Set(billed.id),
            customer_id: Set(billed.customer_id),
            status: Set(InvoiceStatus::Draft),
            issue_date: Set(now.date_naive()),
            due_date: Set(request.due_date),
            currency: Set(self.currency.clone()),
            subtotal: Set(totals.subtotal),
            tax_rate: Set(tax_rate),
            tax_amount: Set(totals.tax_amount),
            total: Set(totals.total),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut saved_lines = Vec::with_capacity(lines.len());
        for (item, quantity, amount) in lines {
            saved_lines.push(
                invoice_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    invoice_id: Set(created.id),
                    order_item_id: Set(Some(item.id)),
                    description: Set(line_description(item)),
                    quantity: Set(quantity),
                    unit_price: Set(item.unit_price),
                    amount: Set(amount),
                }
                .insert(&txn)
                .await?,
            );
        }

        txn.commit().await.map_err(|e| {
            error!(order_id = %billed.id, error = %e, "Failed to commit invoice");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            invoice_id = %created.id,
            invoice_number = %invoice_number,
            total = %created.total,
            "Invoice created"
        );
        BUSINESS_METRICS.invoices_created.inc();
        publish(&self.event_sender, Event::InvoiceCreated(created.id)).await;

        Ok(InvoiceDetail {
            invoice: created,
            lines: saved_lines,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let found = invoice::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        let lines = invoice_line::Entity::find()
            .filter(invoice_line::Column::InvoiceId.eq(id))
            .all(db)
            .await?;
        Ok(InvoiceDetail {
            invoice: found,
            lines,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        query: &ListQuery,
        filter: &InvoiceFilter,
    ) -> Result<PaginatedResponse<invoice::Model>, ServiceError> {
        let mut select = invoice::Entity::find();
        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(contains_ci(invoice::Column::InvoiceNumber, &term));
        }
        if let Some(status) = filter.status {
            select = select.filter(invoice::Column::Status.eq(status));
        }
        if let Some(order_id) = filter.order_id {
            select = select.filter(invoice::Column::OrderId.eq(order_id));
        }

        let direction = sort_direction(query.sort_order.as_deref(), Order::Desc);
        let column = match query.sort_by.as_deref() {
            Some("invoice_number") => invoice::Column::InvoiceNumber,
            Some("issue_date") => invoice::Column::IssueDate,
            Some("total") => invoice::Column::Total,
            _ => invoice::Column::CreatedAt,
        };
        select = select.order_by(column, direction);

        fetch_page(select, &*self.db_pool, query.page, query.limit).await
    }

    async fn transition(
        &self,
        id: Uuid,
        allowed_from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> Result<invoice::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let found = invoice::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        if !allowed_from.contains(&found.status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Invoice {} is {} and cannot become {}",
                found.invoice_number, found.status, to
            )));
        }

        let order_id = found.order_id;
        let mut model: invoice::ActiveModel = found.into();
        model.status = Set(to);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;

        // Issuing the invoice closes out a dispatched order
        let mut order_event = None;
        if to == InvoiceStatus::Issued {
            if let Some(billed) = order::Entity::find_by_id(order_id).one(&txn).await? {
                order_event =
                    advance_order(&txn, &billed, OrderStatus::Dispatched, OrderStatus::Invoiced)
                        .await?;
            }
        }

        txn.commit().await.map_err(|e| {
            error!(invoice_id = %id, error = %e, "Failed to commit invoice status change");
            ServiceError::DatabaseError(e)
        })?;

        info!(invoice_id = %id, status = %to, "Invoice status changed");
        publish(
            &self.event_sender,
            Event::InvoiceStatusChanged {
                invoice_id: id,
                new_status: to.to_string(),
            },
        )
        .await;
        if let Some(event) = order_event {
            publish(&self.event_sender, event).await;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn issue_invoice(&self, id: Uuid) -> Result<invoice::Model, ServiceError> {
        let issued = self
            .transition(id, &[InvoiceStatus::Draft], InvoiceStatus::Issued)
            .await?;
        BUSINESS_METRICS.invoices_issued.inc();
        Ok(issued)
    }

    #[instrument(skip(self))]
    pub async fn mark_paid(&self, id: Uuid) -> Result<invoice::Model, ServiceError> {
        self.transition(id, &[InvoiceStatus::Issued], InvoiceStatus::Paid)
            .await
    }

    #[instrument(skip(self))]
    pub async fn cancel_invoice(&self, id: Uuid) -> Result<invoice::Model, ServiceError> {
        self.transition(
            id,
            &[InvoiceStatus::Draft, InvoiceStatus::Issued],
            InvoiceStatus::Cancelled,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn totals_round_tax_half_away_from_zero() {
        let totals = compute_totals(&[dec!(100.10), dec!(0.15)], dec!(0.05));
        assert_eq!(totals.subtotal, dec!(100.25));
        // 5.0125 -> 5.01
        assert_eq!(totals.tax_amount, dec!(5.01));
        assert_eq!(totals.total, dec!(105.26));

        let half = compute_totals(&[dec!(0.5)], dec!(0.05));
        assert_eq!(half.tax_amount, dec!(0.03));
    }

    #[test]
    fn zero_rate_means_no_tax() {
        let totals = compute_totals(&[dec!(250)], Decimal::ZERO);
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.total, dec!(250));
    }

    #[test]
    fn description_joins_present_parts() {
        let item = order_item::Model {
            id: Uuid::nil(),
            order_id: Uuid::nil(),
            style: "Polo".into(),
            color: Some("Navy".into()),
            fabric: None,
            unit_price: dec!(4.5),
            total_quantity: 10,
            created_at: Utc::now(),
        };
        assert_eq!(line_description(&item), "Polo / Navy");
    }
}
