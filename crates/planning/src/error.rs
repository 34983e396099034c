//! Planning errors.

use thiserror::Error;

use shipplan_core::DomainError;

use crate::group::ShipmentId;
use crate::validate::ShipmentValidation;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// One or more shipments fail date validation (blocks submission only).
    #[error("{} shipment(s) have invalid ship dates", .0.len())]
    Validation(Vec<ShipmentValidation>),

    /// The combination was rejected; nothing changed.
    #[error("combine conflict: {0}")]
    CombineConflict(String),

    #[error("unknown shipment: {0}")]
    UnknownShipment(ShipmentId),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
