//! sea-orm entities, one module per table.

// Orders
pub mod customer;
pub mod order;
pub mod order_item;
pub mod size_distribution;

// Production floor
pub mod batch;
pub mod batch_assignment;
pub mod batch_assignment_size;
pub mod cutting_assignment;
pub mod cutting_assignment_size;
pub mod qc_record;

// Stores and purchasing
pub mod goods_receipt;
pub mod goods_receipt_line;
pub mod inventory_item;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod stock_movement;

// Billing
pub mod invoice;
pub mod invoice_line;

// Staff and access
pub mod department;
pub mod designation;
pub mod designation_permission;
pub mod permission;
pub mod user;

pub mod stored_file;
pub mod tutorial;
