use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = BatchAssignmentSize)]
#[sea_orm(table_name = "batch_assignment_sizes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub batch_assignment_id: Uuid,
    pub size: String,
    pub assigned_quantity: i32,
    /// approved + rejected pieces recorded by QC
    pub reviewed_quantity: i32,
}

impl Model {
    /// Pieces not yet reviewed by QC
    pub fn left(&self) -> i32 {
        (self.assigned_quantity - self.reviewed_quantity).max(0)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batch_assignment::Entity",
        from = "Column::BatchAssignmentId",
        to = "super::batch_assignment::Column::Id"
    )]
    BatchAssignment,
}

impl Related<super::batch_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchAssignment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
