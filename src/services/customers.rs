use crate::{
    db::DbPool,
    entities::{customer, order},
    errors::ServiceError,
    events::{ChangeAction, Event, EventSender},
    ListQuery, PaginatedResponse,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, contains_ci, fetch_page, publish, search_term, sort_direction};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
}

/// Service for managing customers
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name is required".to_string(),
            ));
        }

        let now = Utc::now();
        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            contact_person: Set(clean_optional(request.contact_person)),
            phone: Set(clean_optional(request.phone)),
            email: Set(clean_optional(request.email)),
            address: Set(clean_optional(request.address)),
            tax_id: Set(clean_optional(request.tax_id)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "Failed to create customer");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = %created.id, "Customer created");
        publish(
            &self.event_sender,
            Event::record("customers", ChangeAction::Insert, created.id),
        )
        .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    /// Search covers name, phone and email; sorts by `name` or `created_at`
    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        query: &ListQuery,
    ) -> Result<PaginatedResponse<customer::Model>, ServiceError> {
        let mut select = customer::Entity::find();

        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(contains_ci(customer::Column::Name, &term))
                    .add(contains_ci(customer::Column::Phone, &term))
                    .add(contains_ci(customer::Column::Email, &term)),
            );
        }

        select = match query.sort_by.as_deref() {
            Some("name") => select.order_by(
                customer::Column::Name,
                sort_direction(query.sort_order.as_deref(), Order::Asc),
            ),
            _ => select.order_by(
                customer::Column::CreatedAt,
                sort_direction(query.sort_order.as_deref(), Order::Desc),
            ),
        };

        fetch_page(select, &*self.db_pool, query.page, query.limit).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_customer(
        &self,
        id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_customer(id).await?;
        let mut model: customer::ActiveModel = existing.into();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Customer name is required".to_string(),
                ));
            }
            model.name = Set(name);
        }
        if request.contact_person.is_some() {
            model.contact_person = Set(clean_optional(request.contact_person));
        }
        if request.phone.is_some() {
            model.phone = Set(clean_optional(request.phone));
        }
        if request.email.is_some() {
            model.email = Set(clean_optional(request.email));
        }
        if request.address.is_some() {
            model.address = Set(clean_optional(request.address));
        }
        if request.tax_id.is_some() {
            model.tax_id = Set(clean_optional(request.tax_id));
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(&*self.db_pool).await.map_err(|e| {
            error!(customer_id = %id, error = %e, "Failed to update customer");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = %id, "Customer updated");
        publish(
            &self.event_sender,
            Event::record("customers", ChangeAction::Update, id),
        )
        .await;
        Ok(updated)
    }

    /// Customers with orders cannot be deleted
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.get_customer(id).await?;

        let orders = order::Entity::find()
            .filter(order::Column::CustomerId.eq(id))
            .count(db)
            .await?;
        if orders > 0 {
            return Err(ServiceError::Conflict(format!(
                "Customer {} has {} order(s) and cannot be deleted",
                existing.name, orders
            )));
        }

        customer::Entity::delete_by_id(id).exec(db).await?;
        info!(customer_id = %id, "Customer deleted");
        publish(
            &self.event_sender,
            Event::record("customers", ChangeAction::Delete, id),
        )
        .await;
        Ok(())
    }
}
