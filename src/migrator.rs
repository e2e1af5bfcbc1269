use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_order_tables::Migration),
            Box::new(m20240601_000002_create_production_tables::Migration),
            Box::new(m20240601_000003_create_inventory_tables::Migration),
            Box::new(m20240601_000004_create_billing_tables::Migration),
            Box::new(m20240601_000005_create_access_tables::Migration),
            Box::new(m20240601_000006_seed_permission_tree::Migration),
        ]
    }
}

// Tables are derived from the entity definitions so the schema cannot drift from the models.

mod m20240601_000001_create_order_tables {
    use crate::entities::{customer, order, order_item, size_distribution};
    use sea_orm::Schema;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());

            manager
                .create_table(
                    schema
                        .create_table_from_entity(customer::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(order::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(order_item::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(size_distribution::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_customer_id")
                        .table(order::Entity)
                        .col(order::Column::CustomerId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_status")
                        .table(order::Entity)
                        .col(order::Column::Status)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order_id")
                        .table(order_item::Entity)
                        .col(order_item::Column::OrderId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_size_distributions_item_size")
                        .table(size_distribution::Entity)
                        .col(size_distribution::Column::OrderItemId)
                        .col(size_distribution::Column::Size)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(size_distribution::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(order_item::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(order::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(customer::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000002_create_production_tables {
    use crate::entities::{
        batch, batch_assignment, batch_assignment_size, cutting_assignment,
        cutting_assignment_size, qc_record,
    };
    use sea_orm::Schema;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_production_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());

            manager
                .create_table(
                    schema
                        .create_table_from_entity(cutting_assignment::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(cutting_assignment_size::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(batch::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(batch_assignment::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(batch_assignment_size::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(qc_record::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_cutting_assignments_item")
                        .table(cutting_assignment::Entity)
                        .col(cutting_assignment::Column::OrderItemId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_batch_assignments_item")
                        .table(batch_assignment::Entity)
                        .col(batch_assignment::Column::OrderItemId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_batch_assignments_batch")
                        .table(batch_assignment::Entity)
                        .col(batch_assignment::Column::BatchId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_qc_records_assignment")
                        .table(qc_record::Entity)
                        .col(qc_record::Column::BatchAssignmentId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(qc_record::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(batch_assignment_size::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(batch_assignment::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(batch::Entity).to_owned())
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(cutting_assignment_size::Entity)
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(cutting_assignment::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000003_create_inventory_tables {
    use crate::entities::{
        goods_receipt, goods_receipt_line, inventory_item, purchase_order, purchase_order_line,
        stock_movement,
    };
    use sea_orm::Schema;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());

            manager
                .create_table(
                    schema
                        .create_table_from_entity(inventory_item::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(stock_movement::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(purchase_order::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(purchase_order_line::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(goods_receipt::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(goods_receipt_line::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_movements_item")
                        .table(stock_movement::Entity)
                        .col(stock_movement::Column::InventoryItemId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_purchase_order_lines_po")
                        .table(purchase_order_line::Entity)
                        .col(purchase_order_line::Column::PurchaseOrderId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(goods_receipt_line::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(goods_receipt::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(purchase_order_line::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(purchase_order::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(stock_movement::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(inventory_item::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000004_create_billing_tables {
    use crate::entities::{invoice, invoice_line};
    use sea_orm::Schema;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_billing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());

            manager
                .create_table(
                    schema
                        .create_table_from_entity(invoice::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(invoice_line::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_invoices_order_id")
                        .table(invoice::Entity)
                        .col(invoice::Column::OrderId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(invoice_line::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(invoice::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000005_create_access_tables {
    use crate::entities::{
        department, designation, designation_permission, permission, stored_file, tutorial, user,
    };
    use sea_orm::Schema;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_access_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());

            manager
                .create_table(
                    schema
                        .create_table_from_entity(department::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(designation::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(permission::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(designation_permission::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(user::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(stored_file::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .create_table(
                    schema
                        .create_table_from_entity(tutorial::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_designation_permissions_pair")
                        .table(designation_permission::Entity)
                        .col(designation_permission::Column::DesignationId)
                        .col(designation_permission::Column::PermissionId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(tutorial::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(stored_file::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(user::Entity).to_owned())
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(designation_permission::Entity)
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(permission::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(designation::Entity).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(department::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000006_seed_permission_tree {
    use crate::auth::permissions::DEFAULT_PERMISSION_TREE;
    use crate::entities::permission;
    use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
    use sea_orm_migration::prelude::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_seed_permission_tree"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            let mut ids: HashMap<&str, Uuid> = HashMap::new();

            // parents precede their children in the seed table
            for node in DEFAULT_PERMISSION_TREE {
                let existing = permission::Entity::find()
                    .filter(permission::Column::Key.eq(node.key))
                    .one(db)
                    .await?;
                if let Some(existing) = existing {
                    ids.insert(node.key, existing.id);
                    continue;
                }

                let parent_id = match node.parent {
                    Some(parent) => Some(*ids.get(parent).ok_or_else(|| {
                        DbErr::Migration(format!(
                            "permission {} references unknown parent {}",
                            node.key, parent
                        ))
                    })?),
                    None => None,
                };

                let id = Uuid::new_v4();
                permission::ActiveModel {
                    id: Set(id),
                    key: Set(node.key.to_string()),
                    label: Set(node.label.to_string()),
                    parent_id: Set(parent_id),
                    route: Set(node.route.map(str::to_string)),
                    sort_order: Set(node.sort_order),
                }
                .insert(db)
                .await?;
                ids.insert(node.key, id);
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let keys: Vec<&str> = DEFAULT_PERMISSION_TREE.iter().map(|n| n.key).collect();
            permission::Entity::delete_many()
                .filter(permission::Column::Key.is_in(keys))
                .exec(manager.get_connection())
                .await?;
            Ok(())
        }
    }
}
