use crate::{
    db::DbPool,
    entities::{stored_file, tutorial},
    errors::ServiceError,
    events::{ChangeAction, Event, EventSender},
    storage::Bucket,
    ListQuery, PaginatedResponse,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, Order, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, contains_ci, fetch_page, publish, search_term, sort_direction};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTutorialRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub video_file_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTutorialRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub video_file_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct TutorialFilter {
    pub category: Option<String>,
}

/// Help videos for floor staff
#[derive(Clone)]
pub struct TutorialService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl TutorialService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn check_video(&self, video_file_id: Option<Uuid>) -> Result<(), ServiceError> {
        let Some(id) = video_file_id else {
            return Ok(());
        };
        let file = stored_file::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", id)))?;
        if Bucket::parse(&file.bucket) != Some(Bucket::Videos) {
            return Err(ServiceError::InvalidInput(format!(
                "File {} is in the {} bucket, not videos",
                id, file.bucket
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_tutorial(
        &self,
        request: CreateTutorialRequest,
    ) -> Result<tutorial::Model, ServiceError> {
        request.validate()?;
        self.check_video(request.video_file_id).await?;

        let now = Utc::now();
        let created = tutorial::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(request.title.trim().to_string()),
            description: Set(clean_optional(request.description)),
            category: Set(clean_optional(request.category)),
            video_file_id: Set(request.video_file_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(tutorial_id = %created.id, "Tutorial created");
        publish(
            &self.event_sender,
            Event::record("tutorials", ChangeAction::Insert, created.id),
        )
        .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_tutorial(&self, id: Uuid) -> Result<tutorial::Model, ServiceError> {
        tutorial::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Tutorial {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_tutorials(
        &self,
        query: &ListQuery,
        filter: &TutorialFilter,
    ) -> Result<PaginatedResponse<tutorial::Model>, ServiceError> {
        let mut select = tutorial::Entity::find();
        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(contains_ci(tutorial::Column::Title, &term))
                    .add(contains_ci(tutorial::Column::Description, &term)),
            );
        }
        if let Some(category) = clean_optional(filter.category.clone()) {
            select = select.filter(tutorial::Column::Category.eq(category));
        }
        select = match query.sort_by.as_deref() {
            Some("title") => select.order_by(
                tutorial::Column::Title,
                sort_direction(query.sort_order.as_deref(), Order::Asc),
            ),
            _ => select.order_by(
                tutorial::Column::CreatedAt,
                sort_direction(query.sort_order.as_deref(), Order::Desc),
            ),
        };
        fetch_page(select, &*self.db_pool, query.page, query.limit).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_tutorial(
        &self,
        id: Uuid,
        request: UpdateTutorialRequest,
    ) -> Result<tutorial::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_tutorial(id).await?;
        self.check_video(request.video_file_id).await?;

        let mut model: tutorial::ActiveModel = existing.into();
        if let Some(title) = request.title {
            model.title = Set(title.trim().to_string());
        }
        if request.description.is_some() {
            model.description = Set(clean_optional(request.description));
        }
        if request.category.is_some() {
            model.category = Set(clean_optional(request.category));
        }
        if request.video_file_id.is_some() {
            model.video_file_id = Set(request.video_file_id);
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db_pool).await?;

        info!(tutorial_id = %id, "Tutorial updated");
        publish(
            &self.event_sender,
            Event::record("tutorials", ChangeAction::Update, id),
        )
        .await;
        Ok(updated)
    }

    /// The video file stays in storage
    #[instrument(skip(self))]
    pub async fn delete_tutorial(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = tutorial::Entity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Tutorial {} not found", id)));
        }
        info!(tutorial_id = %id, "Tutorial deleted");
        publish(
            &self.event_sender,
            Event::record("tutorials", ChangeAction::Delete, id),
        )
        .await;
        Ok(())
    }
}
