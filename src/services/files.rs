use crate::{
    db::DbPool,
    entities::{stored_file, tutorial},
    errors::ServiceError,
    events::{ChangeAction, Event, EventSender},
    metrics::BUSINESS_METRICS,
    storage::{sanitize_file_name, BlobStore, Bucket},
};
use bytes::Bytes;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::publish;

/// A downloaded object with the metadata needed to serve it
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub file: stored_file::Model,
    pub data: Bytes,
}

/// Blob uploads with a metadata row per object
#[derive(Clone)]
pub struct FileService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    store: Arc<dyn BlobStore>,
    max_upload_bytes: usize,
}

impl FileService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        store: Arc<dyn BlobStore>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            store,
            max_upload_bytes,
        }
    }

    /// Stores the bytes under `{uuid}-{sanitised name}`; the row is written after the blob
    #[instrument(skip(self, data), fields(bucket = %bucket, size = data.len()))]
    pub async fn upload(
        &self,
        bucket: Bucket,
        file_name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<stored_file::Model, ServiceError> {
        if data.is_empty() {
            return Err(ServiceError::ValidationError("Uploaded file is empty".to_string()));
        }
        if data.len() > self.max_upload_bytes {
            return Err(ServiceError::PayloadTooLarge(format!(
                "File is {} bytes; the limit is {}",
                data.len(),
                self.max_upload_bytes
            )));
        }

        let id = Uuid::new_v4();
        let clean_name = sanitize_file_name(file_name);
        let object_key = format!("{}-{}", id, clean_name);
        let content_type = content_type
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        let size_bytes = data.len() as i64;

        self.store.put(bucket, &object_key, data).await?;

        let saved = stored_file::ActiveModel {
            id: Set(id),
            bucket: Set(bucket.to_string()),
            object_key: Set(object_key.clone()),
            file_name: Set(clean_name),
            content_type: Set(content_type),
            size_bytes: Set(size_bytes),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await;

        let saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                error!(object_key = %object_key, error = %e, "Failed to record upload");
                if let Err(cleanup) = self.store.delete(bucket, &object_key).await {
                    warn!(object_key = %object_key, error = %cleanup, "Orphaned blob left behind");
                }
                return Err(ServiceError::DatabaseError(e));
            }
        };

        info!(file_id = %saved.id, object_key = %saved.object_key, "File uploaded");
        BUSINESS_METRICS.files_uploaded.inc();
        publish(
            &self.event_sender,
            Event::record("stored_files", ChangeAction::Insert, saved.id),
        )
        .await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn get_file(&self, id: Uuid) -> Result<stored_file::Model, ServiceError> {
        stored_file::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", id)))
    }

    fn bucket_of(file: &stored_file::Model) -> Result<Bucket, ServiceError> {
        Bucket::parse(&file.bucket).ok_or_else(|| {
            ServiceError::InternalError(format!("File {} has unknown bucket {}", file.id, file.bucket))
        })
    }

    #[instrument(skip(self))]
    pub async fn download(&self, id: Uuid) -> Result<FileDownload, ServiceError> {
        let file = self.get_file(id).await?;
        let bucket = Self::bucket_of(&file)?;
        let data = self.store.get(bucket, &file.object_key).await?;
        Ok(FileDownload { file, data })
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list(&self, bucket: Option<Bucket>) -> Result<Vec<stored_file::Model>, ServiceError> {
        let mut select = stored_file::Entity::find();
        if let Some(bucket) = bucket {
            select = select.filter(stored_file::Column::Bucket.eq(bucket.to_string()));
        }
        Ok(select
            .order_by_desc(stored_file::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Removes the row and the blob; refused while a tutorial plays the file
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let file = self.get_file(id).await?;
        let bucket = Self::bucket_of(&file)?;

        let users = tutorial::Entity::find()
            .filter(tutorial::Column::VideoFileId.eq(id))
            .count(&*self.db_pool)
            .await?;
        if users > 0 {
            return Err(ServiceError::Conflict(format!(
                "File {} is used by {} tutorial(s)",
                id, users
            )));
        }

        stored_file::Entity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await?;
        self.store.delete(bucket, &file.object_key).await?;

        info!(file_id = %id, "File deleted");
        publish(
            &self.event_sender,
            Event::record("stored_files", ChangeAction::Delete, id),
        )
        .await;
        Ok(())
    }
}
