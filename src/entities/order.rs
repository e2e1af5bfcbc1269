use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

/// Production stage of an order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "cutting")]
    Cutting,
    #[sea_orm(string_value = "stitching")]
    Stitching,
    #[sea_orm(string_value = "quality_check")]
    QualityCheck,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "dispatched")]
    Dispatched,
    #[sea_orm(string_value = "invoiced")]
    Invoiced,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Stages in production order; `Cancelled` sits outside the pipeline
    pub const PIPELINE: [OrderStatus; 7] = [
        OrderStatus::Received,
        OrderStatus::Cutting,
        OrderStatus::Stitching,
        OrderStatus::QualityCheck,
        OrderStatus::Packed,
        OrderStatus::Dispatched,
        OrderStatus::Invoiced,
    ];

    fn stage(self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| *s == self)
    }

    pub fn next(self) -> Option<OrderStatus> {
        self.stage()
            .and_then(|idx| Self::PIPELINE.get(idx + 1))
            .copied()
    }

    /// Exactly one step forward, or cancellation before dispatch
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        match target {
            OrderStatus::Cancelled => self.stage().map(|idx| idx < 5).unwrap_or(false),
            _ => self.next() == Some(target),
        }
    }

    /// Orders at or beyond packing no longer accept item changes
    pub fn is_locked_for_changes(self) -> bool {
        match self.stage() {
            Some(idx) => idx >= 4,
            None => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Order)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub order_date: NaiveDate,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
