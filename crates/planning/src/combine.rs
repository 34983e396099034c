//! Combine/Split Engine.
//!
//! `combine` merges two groups into one whose lines are provenance-tagged with
//! the shipment they came from; `split` undoes it. [`CombineEngine`] keeps an
//! undo log of the pre-combine snapshots so a split within the same session
//! restores them verbatim. Without a log entry (after a draft reload or a
//! reconstruction) split falls back to the provenance tags.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::PlanningError;
use crate::group::{Origin, ShipmentGroup, ShipmentId};
use crate::line::CartLine;

fn later(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn earlier(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Origins a group brings into a combination (flattened).
fn origins_of(group: &ShipmentGroup) -> Vec<Origin> {
    if group.is_combined() {
        group.origins().to_vec()
    } else {
        vec![group.as_origin()]
    }
}

fn tagged_lines(group: &ShipmentGroup) -> Vec<CartLine> {
    let id = group.id_typed();
    group.lines().iter().cloned().map(|l| l.tagged(id)).collect()
}

/// Composite display name, e.g. `Spring + Summer`.
pub fn composite_name(origins: &[Origin]) -> String {
    origins
        .iter()
        .map(|o| o.collection_name.as_str())
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Merge two groups into a new combined group.
///
/// Fails with [`PlanningError::CombineConflict`] when both inputs are the same
/// group or share an origin (one of them is already part of the other's
/// combination).
pub fn combine(a: &ShipmentGroup, b: &ShipmentGroup) -> Result<ShipmentGroup, PlanningError> {
    if a.id_typed() == b.id_typed() {
        return Err(PlanningError::CombineConflict(format!(
            "shipment {} cannot be combined with itself",
            a.id_typed()
        )));
    }

    let mut origins = origins_of(a);
    let incoming = origins_of(b);
    if let Some(shared) = incoming
        .iter()
        .find(|o| origins.iter().any(|x| x.shipment_id == o.shipment_id))
    {
        return Err(PlanningError::CombineConflict(format!(
            "shipment {} is already part of another combination",
            shared.shipment_id
        )));
    }
    origins.extend(incoming);

    let mut lines = tagged_lines(a);
    lines.extend(tagged_lines(b));

    let name = composite_name(&origins);
    let start = later(a.planned_ship_start(), b.planned_ship_start());
    let end = earlier(a.planned_ship_end(), b.planned_ship_end());

    let combined = ShipmentGroup::combined(ShipmentId::new_draft(), name, origins, lines)?
        .with_planned_dates(start, end);

    debug!(
        shipment_id = %combined.id_typed(),
        origins = combined.origins().len(),
        lines = combined.lines().len(),
        "combined shipments"
    );
    Ok(combined)
}

/// Split a combined group by line provenance. Non-combined groups come back unchanged.
pub fn split(group: &ShipmentGroup) -> Vec<ShipmentGroup> {
    if !group.is_combined() {
        return vec![group.clone()];
    }

    let restored = group
        .origins()
        .iter()
        .map(|origin| {
            let lines = group
                .lines()
                .iter()
                .filter(|l| l.origin == Some(origin.shipment_id))
                .cloned()
                .collect();
            ShipmentGroup::from_origin(origin, lines)
        })
        .collect();

    propagate_dates(group, restored)
}

/// Carry the combined group's dates onto split-out groups, clamped so they do
/// not fall before each group's own min-allowed dates.
fn propagate_dates(combined: &ShipmentGroup, restored: Vec<ShipmentGroup>) -> Vec<ShipmentGroup> {
    restored
        .into_iter()
        .map(|mut g| {
            let start = combined
                .planned_ship_start()
                .map(|d| later(Some(d), g.min_allowed_start()).unwrap_or(d))
                .or(g.planned_ship_start());
            let end = combined
                .planned_ship_end()
                .map(|d| later(Some(d), g.min_allowed_end()).unwrap_or(d))
                .or(g.planned_ship_end());
            g.set_planned_dates(start, end);
            g
        })
        .collect()
}

/// Combine/split with an undo log keyed by the combined group's id.
#[derive(Debug, Clone, Default)]
pub struct CombineEngine {
    undo: HashMap<ShipmentId, Vec<ShipmentGroup>>,
}

impl CombineEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_undo_entry(&self, id: &ShipmentId) -> bool {
        self.undo.contains_key(id)
    }

    /// Forget every recorded combination (cart refreshed or cleared).
    pub fn reset(&mut self) {
        self.undo.clear();
    }

    /// Pre-combine snapshots of a group, one per origin.
    fn snapshots_of(&mut self, group: ShipmentGroup) -> Vec<ShipmentGroup> {
        if !group.is_combined() {
            return vec![group];
        }
        match self.undo.remove(&group.id_typed()) {
            Some(snapshots) => snapshots,
            None => split(&group),
        }
    }

    /// Combine two groups, recording the undo snapshots.
    ///
    /// If every origin of one input is already inside the other, the containing
    /// group is returned as-is, so retrying a combine is harmless.
    pub fn combine(
        &mut self,
        a: ShipmentGroup,
        b: ShipmentGroup,
    ) -> Result<ShipmentGroup, PlanningError> {
        let a_ids: Vec<ShipmentId> = origins_of(&a).iter().map(|o| o.shipment_id).collect();
        let b_ids: Vec<ShipmentId> = origins_of(&b).iter().map(|o| o.shipment_id).collect();
        if a.id_typed() != b.id_typed() {
            if a.is_combined() && b_ids.iter().all(|id| a_ids.contains(id)) {
                return Ok(a);
            }
            if b.is_combined() && a_ids.iter().all(|id| b_ids.contains(id)) {
                return Ok(b);
            }
        }

        let combined = combine(&a, &b)?;

        let mut snapshots = self.snapshots_of(a);
        snapshots.extend(self.snapshots_of(b));
        self.undo.insert(combined.id_typed(), snapshots);
        Ok(combined)
    }

    /// Split a combined group back into its origins.
    pub fn split(&mut self, group: ShipmentGroup) -> Vec<ShipmentGroup> {
        if !group.is_combined() {
            return vec![group];
        }

        match self.undo.remove(&group.id_typed()) {
            Some(snapshots) => {
                debug!(shipment_id = %group.id_typed(), "split from undo log");
                propagate_dates(&group, snapshots)
            }
            None => {
                debug!(shipment_id = %group.id_typed(), "split from line provenance");
                split(&group)
            }
        }
    }
}
