use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = QcRecord)]
#[sea_orm(table_name = "qc_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub batch_assignment_id: Uuid,
    pub size: String,
    pub approved: i32,
    pub rejected: i32,
    pub reviewed_by: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
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
