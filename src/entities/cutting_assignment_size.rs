use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = CuttingAssignmentSize)]
#[sea_orm(table_name = "cutting_assignment_sizes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub cutting_assignment_id: Uuid,
    pub size: String,
    pub assigned_quantity: i32,
    pub cut_quantity: i32,
}

impl Model {
    /// Pieces still waiting to be cut
    pub fn left(&self) -> i32 {
        (self.assigned_quantity - self.cut_quantity).max(0)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cutting_assignment::Entity",
        from = "Column::CuttingAssignmentId",
        to = "super::cutting_assignment::Column::Id"
    )]
    CuttingAssignment,
}

impl Related<super::cutting_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CuttingAssignment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
