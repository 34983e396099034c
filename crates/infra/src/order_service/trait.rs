use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shipplan_core::{
    AggregateRoot, DomainError, ExpectedVersion, OrderId, OrderItemId, PlannedShipmentId,
};
use shipplan_planning::CollectionId;

/// Lifecycle state of a submitted order, as reported by the order service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    Processing,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    /// Only orders nobody started working on can be reopened for edit.
    pub fn is_editable(self) -> bool {
        matches!(self, OrderStatus::Submitted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Submitted => "submitted",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(OrderStatus::Submitted),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Order header: identity, status and the version used for edit-session checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub id: OrderId,
    pub status: OrderStatus,
    pub version: u64,
}

impl AggregateRoot for OrderHeader {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Explicit planned-shipment record of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedShipmentRecord {
    pub id: PlannedShipmentId,
    /// `None` for unconstrained and combined shipments.
    pub collection_id: Option<CollectionId>,
    pub collection_name: String,
    pub planned_ship_start: Option<NaiveDate>,
    pub planned_ship_end: Option<NaiveDate>,
    /// Items attached to this shipment, in display order.
    pub item_ids: Vec<OrderItemId>,
}

/// Persisted order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub sku: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: u64,
    pub collection_id: Option<CollectionId>,
    pub collection_name: Option<String>,
    pub planned_shipment_id: Option<PlannedShipmentId>,
    /// Grouping key of the shipment the item originally belonged to
    /// (`collection-{id}` or `default`).
    pub group_marker: Option<String>,
}

/// Full replacement of an order's shipments and items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub order_id: OrderId,
    /// `Any` creates the order; `Exact` updates an order reopened for edit.
    pub expected_version: ExpectedVersion,
    pub shipments: Vec<PlannedShipmentRecord>,
    pub items: Vec<OrderItemRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub order_ids: Vec<OrderId>,
    /// Order version after the commit.
    pub version: u64,
}

/// Order service operation error.
///
/// Infrastructure errors, as opposed to planning errors (dates, combinations).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderServiceError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order {order_id} is {} and can no longer be edited", .status.as_str())]
    NotEditable { order_id: OrderId, status: OrderStatus },

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Transient: the backend could not be reached.
    #[error("order service unavailable: {0}")]
    Unavailable(String),
}

impl From<DomainError> for OrderServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Conflict(message) => OrderServiceError::Concurrency(message),
            other => OrderServiceError::Storage(other.to_string()),
        }
    }
}

impl OrderServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderServiceError::Unavailable(_))
    }
}

/// Order service boundary: the system of record for submitted orders.
///
/// Implementations must commit a request atomically: either every shipment
/// and item record of the request is stored and the order version advances by
/// one, or nothing changes.
#[async_trait::async_trait]
pub trait OrderService: Send + Sync {
    /// Store the order's shipments and items, replacing any previous ones.
    async fn commit_order(
        &self,
        request: CommitRequest,
    ) -> Result<CommitReceipt, OrderServiceError>;

    async fn load_order(&self, order_id: OrderId) -> Result<OrderHeader, OrderServiceError>;

    /// Planned-shipment records in the order they were committed.
    async fn load_planned_shipments(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PlannedShipmentRecord>, OrderServiceError>;

    /// Items in the order they were committed.
    async fn load_order_items(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemRecord>, OrderServiceError>;
}

#[async_trait::async_trait]
impl<S> OrderService for Arc<S>
where
    S: OrderService + ?Sized,
{
    async fn commit_order(
        &self,
        request: CommitRequest,
    ) -> Result<CommitReceipt, OrderServiceError> {
        (**self).commit_order(request).await
    }

    async fn load_order(&self, order_id: OrderId) -> Result<OrderHeader, OrderServiceError> {
        (**self).load_order(order_id).await
    }

    async fn load_planned_shipments(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PlannedShipmentRecord>, OrderServiceError> {
        (**self).load_planned_shipments(order_id).await
    }

    async fn load_order_items(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemRecord>, OrderServiceError> {
        (**self).load_order_items(order_id).await
    }
}

/// Check that every shipment's items exist in the request and point back at it.
pub(crate) fn check_request(request: &CommitRequest) -> Result<(), OrderServiceError> {
    for shipment in &request.shipments {
        for item_id in &shipment.item_ids {
            let attached = request
                .items
                .iter()
                .any(|i| i.id == *item_id && i.planned_shipment_id == Some(shipment.id));
            if !attached {
                return Err(OrderServiceError::Storage(format!(
                    "shipment {} lists item {item_id} that is not attached to it",
                    shipment.id
                )));
            }
        }
    }
    Ok(())
}

/// Version and editability checks shared by the implementations.
pub(crate) fn check_commit_target(
    order_id: OrderId,
    current: Option<&OrderHeader>,
    expected: ExpectedVersion,
) -> Result<(), OrderServiceError> {
    match (current, expected) {
        (None, ExpectedVersion::Any) => Ok(()),
        (None, ExpectedVersion::Exact(_)) => Err(OrderServiceError::NotFound(order_id)),
        (Some(header), _) if !header.status.is_editable() => Err(OrderServiceError::NotEditable {
            order_id,
            status: header.status,
        }),
        (Some(header), expected) => Ok(expected.check(header.version)?),
    }
}
