//! Staff accounts, departments, designations and the permission tree behind the sidebar.

use crate::{
    auth::password::hash_password_blocking,
    auth::permissions::{effective_permissions, flatten_sidebar, PermissionNode, SidebarEntry},
    cache::QueryCache,
    db::DbPool,
    entities::{department, designation, designation_permission, permission, user},
    errors::ServiceError,
    events::{ChangeAction, Event, EventSender},
    ListQuery, PaginatedResponse,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{contains_ci, fetch_page, publish, search_term, sort_direction};

const DEPARTMENTS_KEY: &str = "departments:all";
const DESIGNATIONS_KEY: &str = "designations:all";
const PERMISSION_TREE_KEY: &str = "permissions:tree";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DepartmentRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateDesignationRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateDesignationRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub department_id: Option<Uuid>,
}

/// Replaces the designation's permission set
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetPermissionsRequest {
    pub permission_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DesignationDetail {
    #[serde(flatten)]
    pub designation: designation::Model,
    pub department_name: Option<String>,
    pub permission_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub designation_id: Option<Uuid>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub designation_id: Option<Uuid>,
    pub is_admin: Option<bool>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct UserFilter {
    pub designation_id: Option<Uuid>,
    pub active: Option<bool>,
}

/// A user as shown to clients; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub designation_id: Option<Uuid>,
    pub designation_name: Option<String>,
    pub department_name: Option<String>,
    pub is_admin: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub profile: UserProfile,
    pub permissions: Vec<String>,
}

async fn load_permission_nodes<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<PermissionNode>, ServiceError> {
    Ok(permission::Entity::find()
        .order_by_asc(permission::Column::SortOrder)
        .all(conn)
        .await?
        .into_iter()
        .map(PermissionNode::from)
        .collect())
}

/// Permission keys granted directly to a designation
async fn designation_keys<C: ConnectionTrait>(
    conn: &C,
    designation_id: Uuid,
) -> Result<Vec<String>, ServiceError> {
    let permission_ids: Vec<Uuid> = designation_permission::Entity::find()
        .filter(designation_permission::Column::DesignationId.eq(designation_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.permission_id)
        .collect();
    if permission_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut keys: Vec<String> = permission::Entity::find()
        .filter(permission::Column::Id.is_in(permission_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| p.key)
        .collect();
    keys.sort();
    Ok(keys)
}

/// Keys a user holds: every key for admins, otherwise the designation's grants and their subtrees
pub async fn load_effective_permissions(
    db: &DbPool,
    account: &user::Model,
) -> Result<Vec<String>, ServiceError> {
    let nodes = load_permission_nodes(db).await?;
    let granted = match account.designation_id {
        Some(designation_id) if !account.is_admin => designation_keys(db, designation_id).await?,
        _ => Vec::new(),
    };
    Ok(effective_permissions(&nodes, &granted, account.is_admin))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Service for staff access management
#[derive(Clone)]
pub struct AccessService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    cache: QueryCache,
}

impl AccessService {
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

    async fn changed(&self, table: &'static str, action: ChangeAction, id: Uuid) {
        publish(&self.event_sender, Event::record(table, action, id)).await;
    }

    // Departments

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_department(
        &self,
        request: DepartmentRequest,
    ) -> Result<department::Model, ServiceError> {
        request.validate()?;
        let name = request.name.trim().to_string();
        self.ensure_department_name_free(&name, None).await?;

        let created = department::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create department");
            ServiceError::DatabaseError(e)
        })?;

        self.cache.invalidate("departments:").await;
        info!(department_id = %created.id, "Department created");
        self.changed("departments", ChangeAction::Insert, created.id)
            .await;
        Ok(created)
    }

    async fn ensure_department_name_free(
        &self,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut select = department::Entity::find().filter(department::Column::Name.eq(name));
        if let Some(id) = except {
            select = select.filter(department::Column::Id.ne(id));
        }
        if select.one(&*self.db_pool).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Department {} already exists",
                name
            )));
        }
        Ok(())
    }

    /// All departments by name
    #[instrument(skip(self))]
    pub async fn list_departments(&self) -> Result<Vec<department::Model>, ServiceError> {
        let db = self.db_pool.clone();
        self.cache
            .get_or_load(DEPARTMENTS_KEY, || async move {
                Ok(department::Entity::find()
                    .order_by_asc(department::Column::Name)
                    .all(&*db)
                    .await?)
            })
            .await
    }

    #[instrument(skip(self, request))]
    pub async fn update_department(
        &self,
        id: Uuid,
        request: DepartmentRequest,
    ) -> Result<department::Model, ServiceError> {
        request.validate()?;
        let existing = department::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Department {} not found", id)))?;
        let name = request.name.trim().to_string();
        self.ensure_department_name_free(&name, Some(id)).await?;

        let mut model: department::ActiveModel = existing.into();
        model.name = Set(name);
        let updated = model.update(&*self.db_pool).await?;

        // designation listings carry the department name
        self.cache.invalidate("departments:").await;
        self.cache.invalidate("designations:").await;
        info!(department_id = %id, "Department updated");
        self.changed("departments", ChangeAction::Update, id).await;
        Ok(updated)
    }

    /// Refused while designations still belong to the department
    #[instrument(skip(self))]
    pub async fn delete_department(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        department::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Department {} not found", id)))?;

        let members = designation::Entity::find()
            .filter(designation::Column::DepartmentId.eq(id))
            .count(db)
            .await?;
        if members > 0 {
            return Err(ServiceError::Conflict(format!(
                "Department {} still has {} designation(s)",
                id, members
            )));
        }

        department::Entity::delete_by_id(id).exec(db).await?;
        self.cache.invalidate("departments:").await;
        info!(department_id = %id, "Department deleted");
        self.changed("departments", ChangeAction::Delete, id).await;
        Ok(())
    }

    // Designations

    async fn check_department(&self, department_id: Option<Uuid>) -> Result<(), ServiceError> {
        if let Some(id) = department_id {
            department::Entity::find_by_id(id)
                .one(&*self.db_pool)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Department {} not found", id)))?;
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_designation(
        &self,
        request: CreateDesignationRequest,
    ) -> Result<designation::Model, ServiceError> {
        request.validate()?;
        self.check_department(request.department_id).await?;

        let created = designation::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            department_id: Set(request.department_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await?;

        self.cache.invalidate("designations:").await;
        info!(designation_id = %created.id, "Designation created");
        self.changed("designations", ChangeAction::Insert, created.id)
            .await;
        Ok(created)
    }

    async fn load_designation_details<C: ConnectionTrait>(
        conn: &C,
        rows: Vec<designation::Model>,
    ) -> Result<Vec<DesignationDetail>, ServiceError> {
        let departments: HashMap<Uuid, String> = department::Entity::find()
            .all(conn)
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect();

        let mut details = Vec::with_capacity(rows.len());
        for row in rows {
            let permission_keys = designation_keys(conn, row.id).await?;
            details.push(DesignationDetail {
                department_name: row
                    .department_id
                    .and_then(|id| departments.get(&id).cloned()),
                designation: row,
                permission_keys,
            });
        }
        Ok(details)
    }

    /// All designations with their department and granted keys
    #[instrument(skip(self))]
    pub async fn list_designations(&self) -> Result<Vec<DesignationDetail>, ServiceError> {
        let db = self.db_pool.clone();
        self.cache
            .get_or_load(DESIGNATIONS_KEY, || async move {
                let rows = designation::Entity::find()
                    .order_by_asc(designation::Column::Name)
                    .all(&*db)
                    .await?;
                Self::load_designation_details(&*db, rows).await
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_designation(&self, id: Uuid) -> Result<DesignationDetail, ServiceError> {
        let db = &*self.db_pool;
        let row = designation::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Designation {} not found", id)))?;
        let mut details = Self::load_designation_details(db, vec![row]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Designation vanished".to_string()))
    }

    #[instrument(skip(self, request))]
    pub async fn update_designation(
        &self,
        id: Uuid,
        request: UpdateDesignationRequest,
    ) -> Result<designation::Model, ServiceError> {
        request.validate()?;
        let existing = designation::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Designation {} not found", id)))?;
        self.check_department(request.department_id).await?;

        let mut model: designation::ActiveModel = existing.into();
        if let Some(name) = request.name {
            model.name = Set(name.trim().to_string());
        }
        if request.department_id.is_some() {
            model.department_id = Set(request.department_id);
        }
        let updated = model.update(&*self.db_pool).await?;

        self.cache.invalidate("designations:").await;
        info!(designation_id = %id, "Designation updated");
        self.changed("designations", ChangeAction::Update, id).await;
        Ok(updated)
    }

    /// Refused while users hold the designation; its grants go with it
    #[instrument(skip(self))]
    pub async fn delete_designation(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;
        designation::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Designation {} not found", id)))?;

        let holders = user::Entity::find()
            .filter(user::Column::DesignationId.eq(id))
            .count(&txn)
            .await?;
        if holders > 0 {
            return Err(ServiceError::Conflict(format!(
                "Designation {} is held by {} user(s)",
                id, holders
            )));
        }

        designation_permission::Entity::delete_many()
            .filter(designation_permission::Column::DesignationId.eq(id))
            .exec(&txn)
            .await?;
        designation::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await.map_err(|e| {
            error!(designation_id = %id, error = %e, "Failed to commit designation delete");
            ServiceError::DatabaseError(e)
        })?;

        self.cache.invalidate("designations:").await;
        info!(designation_id = %id, "Designation deleted");
        self.changed("designations", ChangeAction::Delete, id).await;
        Ok(())
    }

    /// Replaces the grant set in one transaction; every key must exist in the tree
    #[instrument(skip(self, request), fields(keys = request.permission_keys.len()))]
    pub async fn set_designation_permissions(
        &self,
        id: Uuid,
        request: SetPermissionsRequest,
    ) -> Result<DesignationDetail, ServiceError> {
        let wanted: BTreeSet<String> = request
            .permission_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin permission transaction");
            ServiceError::DatabaseError(e)
        })?;

        designation::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Designation {} not found", id)))?;

        let known: HashMap<String, Uuid> = if wanted.is_empty() {
            HashMap::new()
        } else {
            permission::Entity::find()
                .filter(permission::Column::Key.is_in(wanted.iter().cloned()))
                .all(&txn)
                .await?
                .into_iter()
                .map(|p| (p.key, p.id))
                .collect()
        };
        let unknown: Vec<&str> = wanted
            .iter()
            .filter(|k| !known.contains_key(*k))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "Unknown permission key(s): {}",
                unknown.join(", ")
            )));
        }

        designation_permission::Entity::delete_many()
            .filter(designation_permission::Column::DesignationId.eq(id))
            .exec(&txn)
            .await?;
        if !known.is_empty() {
            let links = known
                .values()
                .map(|permission_id| designation_permission::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    designation_id: Set(id),
                    permission_id: Set(*permission_id),
                });
            designation_permission::Entity::insert_many(links)
                .exec(&txn)
                .await?;
        }

        txn.commit().await.map_err(|e| {
            error!(designation_id = %id, error = %e, "Failed to commit permission set");
            ServiceError::DatabaseError(e)
        })?;

        self.cache.invalidate("designations:").await;
        info!(designation_id = %id, granted = known.len(), "Designation permissions replaced");
        self.changed("designation_permissions", ChangeAction::Update, id)
            .await;
        self.get_designation(id).await
    }

    // Permission tree and sidebar

    /// Every permission node, served from the reference cache
    #[instrument(skip(self))]
    pub async fn permission_tree(&self) -> Result<Vec<PermissionNode>, ServiceError> {
        let db = self.db_pool.clone();
        self.cache
            .get_or_load(PERMISSION_TREE_KEY, || async move {
                load_permission_nodes(&*db).await
            })
            .await
    }

    async fn active_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    async fn granted_keys(&self, account: &user::Model) -> Result<Vec<String>, ServiceError> {
        match account.designation_id {
            Some(designation_id) if !account.is_admin => {
                designation_keys(&*self.db_pool, designation_id).await
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Profile and effective permissions of the signed-in user
    #[instrument(skip(self))]
    pub async fn me(&self, user_id: Uuid) -> Result<MeResponse, ServiceError> {
        let account = self.active_user(user_id).await?;
        let nodes = self.permission_tree().await?;
        let granted = self.granted_keys(&account).await?;
        let permissions = effective_permissions(&nodes, &granted, account.is_admin);
        let profile = self.profiles(vec![account]).await?.pop().ok_or_else(|| {
            ServiceError::InternalError("Profile could not be built".to_string())
        })?;
        Ok(MeResponse {
            profile,
            permissions,
        })
    }

    /// Sidebar rows the signed-in user may see, in display order
    #[instrument(skip(self))]
    pub async fn sidebar(&self, user_id: Uuid) -> Result<Vec<SidebarEntry>, ServiceError> {
        let account = self.active_user(user_id).await?;
        let nodes = self.permission_tree().await?;
        let granted = self.granted_keys(&account).await?;
        Ok(flatten_sidebar(&nodes, &granted, account.is_admin))
    }

    // Users

    async fn profiles(&self, users: Vec<user::Model>) -> Result<Vec<UserProfile>, ServiceError> {
        let db = &*self.db_pool;
        let designations: HashMap<Uuid, designation::Model> = designation::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();
        let departments: HashMap<Uuid, String> = department::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect();

        Ok(users
            .into_iter()
            .map(|u| {
                let held = u.designation_id.and_then(|id| designations.get(&id));
                UserProfile {
                    id: u.id,
                    name: u.name,
                    email: u.email,
                    designation_id: u.designation_id,
                    designation_name: held.map(|d| d.name.clone()),
                    department_name: held
                        .and_then(|d| d.department_id)
                        .and_then(|id| departments.get(&id).cloned()),
                    is_admin: u.is_admin,
                    active: u.active,
                    created_at: u.created_at,
                    updated_at: u.updated_at,
                }
            })
            .collect())
    }

    async fn ensure_email_free(&self, email: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut select = user::Entity::find().filter(user::Column::Email.eq(email));
        if let Some(id) = except {
            select = select.filter(user::Column::Id.ne(id));
        }
        if select.one(&*self.db_pool).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A user with email {} already exists",
                email
            )));
        }
        Ok(())
    }

    async fn check_designation(&self, designation_id: Option<Uuid>) -> Result<(), ServiceError> {
        if let Some(id) = designation_id {
            designation::Entity::find_by_id(id)
                .one(&*self.db_pool)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Designation {} not found", id)))?;
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserProfile, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        self.ensure_email_free(&email, None).await?;
        self.check_designation(request.designation_id).await?;

        let password_hash = hash_password_blocking(request.password).await?;
        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            designation_id: Set(request.designation_id),
            is_admin: Set(request.is_admin),
            active: Set(request.active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create user");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id = %created.id, is_admin = created.is_admin, "User created");
        self.changed("users", ChangeAction::Insert, created.id).await;
        self.get_user(created.id).await
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> Result<UserProfile, ServiceError> {
        let account = user::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))?;
        self.profiles(vec![account])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Profile could not be built".to_string()))
    }

    /// Search covers name and email; sorts by `name`, `email` or `created_at`
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        query: &ListQuery,
        filter: &UserFilter,
    ) -> Result<PaginatedResponse<UserProfile>, ServiceError> {
        let mut select = user::Entity::find();
        if let Some(term) = search_term(query.search.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(contains_ci(user::Column::Name, &term))
                    .add(contains_ci(user::Column::Email, &term)),
            );
        }
        if let Some(designation_id) = filter.designation_id {
            select = select.filter(user::Column::DesignationId.eq(designation_id));
        }
        if let Some(active) = filter.active {
            select = select.filter(user::Column::Active.eq(active));
        }

        select = match query.sort_by.as_deref() {
            Some("name") => select.order_by(
                user::Column::Name,
                sort_direction(query.sort_order.as_deref(), Order::Asc),
            ),
            Some("email") => select.order_by(
                user::Column::Email,
                sort_direction(query.sort_order.as_deref(), Order::Asc),
            ),
            _ => select.order_by(
                user::Column::CreatedAt,
                sort_direction(query.sort_order.as_deref(), Order::Desc),
            ),
        };

        let page = fetch_page(select, &*self.db_pool, query.page, query.limit).await?;
        let items = self.profiles(page.items).await?;
        Ok(PaginatedResponse::new(items, page.total, page.page, page.limit))
    }

    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        id: Uuid,
        request: UpdateUserRequest,
    ) -> Result<UserProfile, ServiceError> {
        request.validate()?;
        let existing = user::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))?;
        self.check_designation(request.designation_id).await?;

        let mut model: user::ActiveModel = existing.into();
        if let Some(name) = request.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(email) = request.email {
            let email = normalize_email(&email);
            self.ensure_email_free(&email, Some(id)).await?;
            model.email = Set(email);
        }
        if let Some(password) = request.password {
            model.password_hash = Set(hash_password_blocking(password).await?);
        }
        if request.designation_id.is_some() {
            model.designation_id = Set(request.designation_id);
        }
        if let Some(is_admin) = request.is_admin {
            model.is_admin = Set(is_admin);
        }
        if let Some(active) = request.active {
            model.active = Set(active);
        }
        model.updated_at = Set(Utc::now());
        model.update(&*self.db_pool).await?;

        info!(user_id = %id, "User updated");
        self.changed("users", ChangeAction::Update, id).await;
        self.get_user(id).await
    }

    /// Users cannot delete their own account
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid, acting_user: Uuid) -> Result<(), ServiceError> {
        if id == acting_user {
            warn!(user_id = %id, "Refusing self-deletion");
            return Err(ServiceError::InvalidOperation(
                "You cannot delete your own account".to_string(),
            ));
        }
        let result = user::Entity::delete_by_id(id).exec(&*self.db_pool).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("User {} not found", id)));
        }
        info!(user_id = %id, "User deleted");
        self.changed("users", ChangeAction::Delete, id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalised() {
        assert_eq!(normalize_email("  Meena@Factory.Example "), "meena@factory.example");
    }

    #[test]
    fn short_passwords_fail_validation() {
        let request = CreateUserRequest {
            name: "Ravi".into(),
            email: "ravi@factory.example".into(),
            password: "short".into(),
            designation_id: None,
            is_admin: false,
            active: true,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn new_users_default_to_active_staff() {
        let request: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Ravi",
            "email": "ravi@factory.example",
            "password": "long-enough"
        }))
        .unwrap();
        assert!(request.active);
        assert!(!request.is_admin);
    }
}
