//! Read-only grouped view for document and report rendering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::group::ShipmentGroup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentViewItem {
    pub sku: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: u64,
    pub line_total: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentView {
    pub shipment_label: String,
    pub items: Vec<ShipmentViewItem>,
    pub subtotal: u64,
    pub ship_window: Option<ShipWindow>,
}

/// One view entry per group, in plan order.
///
/// Labels read `Shipment 2 of 3: Spring` when there is more than one
/// shipment and just the collection name otherwise.
pub fn grouped_view(groups: &[ShipmentGroup]) -> Vec<ShipmentView> {
    let total = groups.len();
    groups
        .iter()
        .enumerate()
        .map(|(idx, group)| {
            let shipment_label = if total > 1 {
                format!("Shipment {} of {}: {}", idx + 1, total, group.collection_name())
            } else {
                group.collection_name().to_string()
            };

            let items = group
                .lines()
                .iter()
                .map(|l| ShipmentViewItem {
                    sku: l.sku.clone(),
                    description: l.description.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    line_total: l.line_total(),
                })
                .collect();

            let ship_window = match (group.planned_ship_start(), group.planned_ship_end()) {
                (None, None) => None,
                (start, end) => Some(ShipWindow { start, end }),
            };

            ShipmentView {
                shipment_label,
                items,
                subtotal: group.subtotal(),
                ship_window,
            }
        })
        .collect()
}
