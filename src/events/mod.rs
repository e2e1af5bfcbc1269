use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::realtime::ChangeFeed;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Kind of row change carried by the realtime feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// Row-level change published to realtime subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub action: ChangeAction,
    pub id: Uuid,
    pub at: DateTime<Utc>,
}

// Domain events raised by the services after a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderDeleted(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderItemAdded {
        order_id: Uuid,
        order_item_id: Uuid,
    },
    SizeDistributionUpdated(Uuid),

    // Production events
    CuttingAssigned {
        cutting_assignment_id: Uuid,
        order_item_id: Uuid,
    },
    CuttingProgressUpdated(Uuid),
    CuttingMasterReassigned {
        from_assignment_id: Uuid,
        to_assignment_id: Uuid,
    },
    BatchesAssigned {
        order_item_id: Uuid,
        batch_assignment_ids: Vec<Uuid>,
    },
    BatchReassigned {
        from_assignment_id: Uuid,
        to_assignment_id: Uuid,
    },
    QcRecorded {
        batch_assignment_id: Uuid,
        approved: i32,
        rejected: i32,
    },

    // Stores events
    StockAdjusted {
        item_id: Uuid,
        movement_id: Uuid,
    },
    PurchaseOrderCreated(Uuid),
    PurchaseOrderCancelled(Uuid),
    GoodsReceived {
        purchase_order_id: Uuid,
        goods_receipt_id: Uuid,
    },

    // Billing events
    InvoiceCreated(Uuid),
    InvoiceStatusChanged {
        invoice_id: Uuid,
        new_status: String,
    },

    /// Plain CRUD on reference data (customers, batches, users, tutorials, ...)
    RecordChanged {
        table: String,
        action: ChangeAction,
        id: Uuid,
    },
}

impl Event {
    pub fn record(table: &str, action: ChangeAction, id: Uuid) -> Self {
        Event::RecordChanged {
            table: table.to_string(),
            action,
            id,
        }
    }

    /// Row changes implied by this event, in the order they happened
    pub fn changes(&self) -> Vec<(&str, ChangeAction, Uuid)> {
        use ChangeAction::*;

        match self {
            Event::OrderCreated(id) => vec![("orders", Insert, *id)],
            Event::OrderUpdated(id) => vec![("orders", Update, *id)],
            Event::OrderDeleted(id) => vec![("orders", Delete, *id)],
            Event::OrderStatusChanged { order_id, .. } => vec![("orders", Update, *order_id)],
            Event::OrderItemAdded {
                order_id,
                order_item_id,
            } => vec![
                ("order_items", Insert, *order_item_id),
                ("orders", Update, *order_id),
            ],
            Event::SizeDistributionUpdated(item_id) => {
                vec![("size_distributions", Update, *item_id)]
            }
            Event::CuttingAssigned {
                cutting_assignment_id,
                ..
            } => vec![("cutting_assignments", Insert, *cutting_assignment_id)],
            Event::CuttingProgressUpdated(id) => vec![("cutting_assignments", Update, *id)],
            Event::CuttingMasterReassigned {
                from_assignment_id,
                to_assignment_id,
            } => vec![
                ("cutting_assignments", Update, *from_assignment_id),
                ("cutting_assignments", Insert, *to_assignment_id),
            ],
            Event::BatchesAssigned {
                batch_assignment_ids,
                ..
            } => batch_assignment_ids
                .iter()
                .map(|id| ("batch_assignments", Insert, *id))
                .collect(),
            Event::BatchReassigned {
                from_assignment_id,
                to_assignment_id,
            } => vec![
                ("batch_assignments", Update, *from_assignment_id),
                ("batch_assignments", Update, *to_assignment_id),
            ],
            Event::QcRecorded {
                batch_assignment_id,
                ..
            } => vec![
                ("qc_records", Insert, *batch_assignment_id),
                ("batch_assignments", Update, *batch_assignment_id),
            ],
            Event::StockAdjusted {
                item_id,
                movement_id,
            } => vec![
                ("stock_movements", Insert, *movement_id),
                ("inventory_items", Update, *item_id),
            ],
            Event::PurchaseOrderCreated(id) => vec![("purchase_orders", Insert, *id)],
            Event::PurchaseOrderCancelled(id) => vec![("purchase_orders", Update, *id)],
            Event::GoodsReceived {
                purchase_order_id,
                goods_receipt_id,
            } => vec![
                ("goods_receipts", Insert, *goods_receipt_id),
                ("purchase_orders", Update, *purchase_order_id),
            ],
            Event::InvoiceCreated(id) => vec![("invoices", Insert, *id)],
            Event::InvoiceStatusChanged { invoice_id, .. } => {
                vec![("invoices", Update, *invoice_id)]
            }
            Event::RecordChanged { table, action, id } => vec![(table.as_str(), *action, *id)],
        }
    }
}

// Drains the service event channel: logs each event and republishes it on the change feed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, feed: ChangeFeed) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "Order status changed"),
            Event::QcRecorded {
                batch_assignment_id,
                approved,
                rejected,
            } => info!(%batch_assignment_id, approved, rejected, "QC recorded"),
            Event::GoodsReceived {
                purchase_order_id,
                goods_receipt_id,
            } => info!(%purchase_order_id, %goods_receipt_id, "Goods received"),
            other => debug!(event = ?other, "Received event"),
        }

        let at = Utc::now();
        for (table, action, id) in event.changes() {
            let delivered = feed.publish(ChangeEvent {
                table: table.to_string(),
                action,
                id,
                at,
            });
            if delivered == 0 {
                debug!(table, %id, "No realtime subscribers for change");
            }
        }
    }

    warn!("Event channel closed; event processing loop stopped");
}
