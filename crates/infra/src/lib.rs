//! Infrastructure layer: order service boundary, persistence adapter, draft
//! recovery, configuration.

pub mod adapter;
pub mod config;
pub mod draft_store;
pub mod order_service;

pub use adapter::{AdapterError, CommittedPlan, CommittedShipment, OrderPersistenceAdapter};
pub use config::{apply_schema, build_order_service, PersistenceConfig};
pub use draft_store::{restore_plan, save_plan, DraftStore, DraftStoreError, InMemoryDraftStore};
pub use order_service::{
    CommitReceipt, CommitRequest, InMemoryOrderService, OrderHeader, OrderItemRecord, OrderService,
    OrderServiceError, OrderStatus, PlannedShipmentRecord, PostgresOrderService,
};
