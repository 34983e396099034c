use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use shipplan_core::OrderId;

use super::r#trait::{
    check_commit_target, check_request, CommitReceipt, CommitRequest, OrderHeader, OrderItemRecord,
    OrderService, OrderServiceError, OrderStatus, PlannedShipmentRecord,
};

#[derive(Debug, Clone)]
struct StoredOrder {
    header: OrderHeader,
    shipments: Vec<PlannedShipmentRecord>,
    items: Vec<OrderItemRecord>,
}

/// In-memory order service.
///
/// Intended for tests/dev. Supports simulating an unreachable backend and
/// orders changing state behind an editing session's back.
#[derive(Debug, Default)]
pub struct InMemoryOrderService {
    orders: RwLock<HashMap<OrderId, StoredOrder>>,
    unavailable: AtomicBool,
}

impl InMemoryOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Move an order to another status (e.g. warehouse picked it up). Bumps the version.
    pub fn set_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), OrderServiceError> {
        let mut orders = self.write()?;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderServiceError::NotFound(order_id))?;
        order.header.status = status;
        order.header.version += 1;
        Ok(())
    }

    /// Delete an order outright.
    pub fn remove_order(&self, order_id: OrderId) -> bool {
        self.write().map(|mut o| o.remove(&order_id).is_some()).unwrap_or(false)
    }

    pub fn order_count(&self) -> usize {
        self.orders.read().map(|o| o.len()).unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), OrderServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(OrderServiceError::Unavailable(
                "in-memory order service switched off".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<OrderId, StoredOrder>>, OrderServiceError> {
        self.orders
            .write()
            .map_err(|_| OrderServiceError::Storage("lock poisoned".to_string()))
    }

    fn read_order<T>(
        &self,
        order_id: OrderId,
        f: impl FnOnce(&StoredOrder) -> T,
    ) -> Result<T, OrderServiceError> {
        self.ensure_available()?;
        let orders = self
            .orders
            .read()
            .map_err(|_| OrderServiceError::Storage("lock poisoned".to_string()))?;
        orders
            .get(&order_id)
            .map(f)
            .ok_or(OrderServiceError::NotFound(order_id))
    }
}

#[async_trait::async_trait]
impl OrderService for InMemoryOrderService {
    async fn commit_order(
        &self,
        request: CommitRequest,
    ) -> Result<CommitReceipt, OrderServiceError> {
        self.ensure_available()?;
        check_request(&request)?;

        let mut orders = self.write()?;
        let current = orders.get(&request.order_id).map(|o| &o.header);
        check_commit_target(request.order_id, current, request.expected_version)?;

        let version = current.map(|h| h.version + 1).unwrap_or(1);
        let header = OrderHeader {
            id: request.order_id,
            status: OrderStatus::Submitted,
            version,
        };
        // Single insert under the write lock: all or nothing.
        orders.insert(
            request.order_id,
            StoredOrder {
                header,
                shipments: request.shipments,
                items: request.items,
            },
        );

        Ok(CommitReceipt {
            order_ids: vec![request.order_id],
            version,
        })
    }

    async fn load_order(&self, order_id: OrderId) -> Result<OrderHeader, OrderServiceError> {
        self.read_order(order_id, |o| o.header.clone())
    }

    async fn load_planned_shipments(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PlannedShipmentRecord>, OrderServiceError> {
        self.read_order(order_id, |o| o.shipments.clone())
    }

    async fn load_order_items(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemRecord>, OrderServiceError> {
        self.read_order(order_id, |o| o.items.clone())
    }
}
