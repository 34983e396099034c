//! Constraint Resolver: which ship-date bounds a group owes to whom.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shipplan_core::ValueObject;

use crate::group::{ShipmentGroup, ShipmentId};
use crate::window::{CollectionId, CollectionWindow};

/// Constraint of one origin of a combined group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginConstraint {
    pub origin: ShipmentId,
    pub window: CollectionWindow,
}

/// Constraints of a shipment group.
///
/// Combined groups keep one entry per constrained origin; the bounds are never
/// merged into a single window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedConstraints {
    Unconstrained,
    Single(CollectionWindow),
    PerOrigin(Vec<OriginConstraint>),
}

/// A bound checked by the date validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateConstraint {
    /// Collection name shown in messages; absent for a group's own window.
    pub label: Option<String>,
    pub collection_id: Option<CollectionId>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ValueObject for DateConstraint {}

impl ResolvedConstraints {
    pub fn is_unconstrained(&self) -> bool {
        match self {
            ResolvedConstraints::Unconstrained => true,
            ResolvedConstraints::Single(_) => false,
            ResolvedConstraints::PerOrigin(list) => list.is_empty(),
        }
    }

    pub fn to_date_constraints(&self) -> Vec<DateConstraint> {
        match self {
            ResolvedConstraints::Unconstrained => Vec::new(),
            ResolvedConstraints::Single(window) => vec![DateConstraint {
                label: None,
                collection_id: Some(window.collection_id.clone()),
                start: window.ship_window_start,
                end: window.ship_window_end,
            }],
            ResolvedConstraints::PerOrigin(list) => list
                .iter()
                .map(|c| DateConstraint {
                    label: Some(c.window.name.clone()),
                    collection_id: Some(c.window.collection_id.clone()),
                    start: c.window.ship_window_start,
                    end: c.window.ship_window_end,
                })
                .collect(),
        }
    }
}

/// Resolve the constraints a group must honor.
pub fn resolve(group: &ShipmentGroup) -> ResolvedConstraints {
    if group.is_combined() {
        let per_origin = group
            .origins()
            .iter()
            .filter_map(|origin| {
                origin.window().map(|window| OriginConstraint {
                    origin: origin.shipment_id,
                    window,
                })
            })
            .collect();
        return ResolvedConstraints::PerOrigin(per_origin);
    }

    match group.as_origin().window() {
        Some(window) => ResolvedConstraints::Single(window),
        None => ResolvedConstraints::Unconstrained,
    }
}
