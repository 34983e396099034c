//! Shipment planning domain module.
//!
//! Turns a flat wholesale cart into shipment groups, resolves and validates
//! their ship-date constraints, and lets a buyer combine or split groups.
//! Everything here is deterministic domain logic (no IO, no storage).

pub mod aggregator;
pub mod combine;
pub mod constraint;
pub mod error;
pub mod group;
pub mod line;
pub mod plan;
pub mod validate;
pub mod view;
pub mod window;

pub use aggregator::{aggregate, Aggregation};
pub use combine::{combine, composite_name, split, CombineEngine};
pub use constraint::{resolve, DateConstraint, OriginConstraint, ResolvedConstraints};
pub use error::PlanningError;
pub use group::{Origin, ShipmentGroup, ShipmentId, UNCONSTRAINED_NAME};
pub use line::{CartLine, GroupKey};
pub use plan::{DraftSnapshot, PlanContext, ShipmentPlan};
pub use validate::{
    format_date, validate, validate_for_submit, validate_group, DateField, FieldError,
    ShipmentValidation, ValidationReport, END_BEFORE_START, END_REQUIRED, START_REQUIRED,
};
pub use view::{grouped_view, ShipWindow, ShipmentView, ShipmentViewItem};
pub use window::{CollectionCatalog, CollectionId, CollectionRef, CollectionWindow, WindowProvider};
