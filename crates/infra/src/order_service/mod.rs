//! Order service boundary.
//!
//! The order service owns submitted orders. The planning core talks to it only
//! through the persistence adapter; this module defines the boundary and its
//! in-memory and Postgres implementations.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryOrderService;
pub use postgres::PostgresOrderService;
pub use r#trait::{
    CommitReceipt, CommitRequest, OrderHeader, OrderItemRecord, OrderService, OrderServiceError,
    OrderStatus, PlannedShipmentRecord,
};
