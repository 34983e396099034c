//! Shipment model: one group of cart lines sharing a ship-date commitment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shipplan_core::{DomainError, DomainResult, DraftShipmentId, Entity, PlannedShipmentId};

use crate::line::{CartLine, GroupKey};
use crate::window::{CollectionId, CollectionRef, CollectionWindow};

/// Display name of the group holding lines without a collection.
pub const UNCONSTRAINED_NAME: &str = "Available to Ship";

/// Shipment identity: client-generated before submission, persisted after.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ShipmentId {
    Draft(DraftShipmentId),
    Persisted(PlannedShipmentId),
}

impl ShipmentId {
    pub fn new_draft() -> Self {
        Self::Draft(DraftShipmentId::new())
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, ShipmentId::Persisted(_))
    }

    pub fn as_persisted(&self) -> Option<PlannedShipmentId> {
        match self {
            ShipmentId::Persisted(id) => Some(*id),
            ShipmentId::Draft(_) => None,
        }
    }
}

impl From<PlannedShipmentId> for ShipmentId {
    fn from(value: PlannedShipmentId) -> Self {
        Self::Persisted(value)
    }
}

impl From<DraftShipmentId> for ShipmentId {
    fn from(value: DraftShipmentId) -> Self {
        Self::Draft(value)
    }
}

impl core::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ShipmentId::Draft(id) => write!(f, "draft:{id}"),
            ShipmentId::Persisted(id) => write!(f, "{id}"),
        }
    }
}

/// Pre-combine identity and constraint of one constituent of a combined group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub shipment_id: ShipmentId,
    pub collection_id: Option<CollectionId>,
    pub collection_name: String,
    pub min_allowed_start: Option<NaiveDate>,
    pub min_allowed_end: Option<NaiveDate>,
}

impl Origin {
    pub fn key(&self) -> GroupKey {
        match &self.collection_id {
            Some(id) => GroupKey::Collection(id.clone()),
            None => GroupKey::Default,
        }
    }

    /// The origin's own ship window, if it has any bound at all.
    pub fn window(&self) -> Option<CollectionWindow> {
        let collection_id = self.collection_id.clone()?;
        if self.min_allowed_start.is_none() && self.min_allowed_end.is_none() {
            return None;
        }
        Some(CollectionWindow {
            collection_id,
            name: self.collection_name.clone(),
            ship_window_start: self.min_allowed_start,
            ship_window_end: self.min_allowed_end,
        })
    }
}

/// Shipment group entity.
///
/// Invariants enforced by the constructors:
/// - no collection ⇒ no min-allowed dates;
/// - `origins` is non-empty only for combined groups, and every line of a
///   combined group carries a provenance tag naming one of them;
/// - lines of a non-combined group carry no provenance tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentGroup {
    id: ShipmentId,
    collection_id: Option<CollectionId>,
    collection_name: String,
    planned_ship_start: Option<NaiveDate>,
    planned_ship_end: Option<NaiveDate>,
    min_allowed_start: Option<NaiveDate>,
    min_allowed_end: Option<NaiveDate>,
    lines: Vec<CartLine>,
    origins: Vec<Origin>,
}

impl ShipmentGroup {
    /// Group for one collection; planned dates start out at the ship window.
    pub fn for_collection(
        id: ShipmentId,
        collection: CollectionRef,
        window: Option<&CollectionWindow>,
        lines: Vec<CartLine>,
    ) -> Self {
        let (start, end) = window
            .map(|w| (w.ship_window_start, w.ship_window_end))
            .unwrap_or((None, None));
        let collection_name = window
            .map(|w| w.name.clone())
            .unwrap_or(collection.name);

        Self {
            id,
            collection_id: Some(collection.id),
            collection_name,
            planned_ship_start: start,
            planned_ship_end: end,
            min_allowed_start: start,
            min_allowed_end: end,
            lines: lines.into_iter().map(CartLine::untagged).collect(),
            origins: Vec::new(),
        }
    }

    /// Group for lines without a collection ("available to ship").
    pub fn unconstrained(id: ShipmentId, lines: Vec<CartLine>) -> Self {
        Self {
            id,
            collection_id: None,
            collection_name: UNCONSTRAINED_NAME.to_string(),
            planned_ship_start: None,
            planned_ship_end: None,
            min_allowed_start: None,
            min_allowed_end: None,
            lines: lines.into_iter().map(CartLine::untagged).collect(),
            origins: Vec::new(),
        }
    }

    /// Rebuild a non-combined group from one of its origin records.
    pub fn from_origin(origin: &Origin, lines: Vec<CartLine>) -> Self {
        let lines = lines.into_iter().map(CartLine::untagged).collect();
        match &origin.collection_id {
            Some(collection_id) => Self {
                id: origin.shipment_id,
                collection_id: Some(collection_id.clone()),
                collection_name: origin.collection_name.clone(),
                planned_ship_start: origin.min_allowed_start,
                planned_ship_end: origin.min_allowed_end,
                min_allowed_start: origin.min_allowed_start,
                min_allowed_end: origin.min_allowed_end,
                lines,
                origins: Vec::new(),
            },
            None => Self {
                collection_name: origin.collection_name.clone(),
                ..Self::unconstrained(origin.shipment_id, lines)
            },
        }
    }

    /// Assemble a combined group from origin records and provenance-tagged lines.
    pub fn combined(
        id: ShipmentId,
        collection_name: impl Into<String>,
        origins: Vec<Origin>,
        lines: Vec<CartLine>,
    ) -> DomainResult<Self> {
        if origins.len() < 2 {
            return Err(DomainError::invariant(
                "a combined shipment needs at least two origins",
            ));
        }
        for (idx, origin) in origins.iter().enumerate() {
            if origins[..idx].iter().any(|o| o.shipment_id == origin.shipment_id) {
                return Err(DomainError::invariant(format!(
                    "origin {} listed twice",
                    origin.shipment_id
                )));
            }
        }
        for line in &lines {
            let known = line
                .origin
                .is_some_and(|tag| origins.iter().any(|o| o.shipment_id == tag));
            if !known {
                return Err(DomainError::invariant(format!(
                    "line {} has no provenance tag naming an origin",
                    line.sku
                )));
            }
        }

        Ok(Self {
            id,
            collection_id: None,
            collection_name: collection_name.into(),
            planned_ship_start: None,
            planned_ship_end: None,
            min_allowed_start: None,
            min_allowed_end: None,
            lines,
            origins,
        })
    }

    /// Rebuild a combined group from origins and the lines each one contributed.
    ///
    /// Used when the undo log is long gone (a persisted order reopened for edit).
    pub fn rebuild_combined(
        id: ShipmentId,
        collection_name: impl Into<String>,
        parts: Vec<(Origin, Vec<CartLine>)>,
    ) -> DomainResult<Self> {
        let mut origins = Vec::with_capacity(parts.len());
        let mut lines = Vec::new();
        for (origin, part_lines) in parts {
            let tag = origin.shipment_id;
            lines.extend(part_lines.into_iter().map(|mut l| {
                l.origin = Some(tag);
                l
            }));
            origins.push(origin);
        }
        Self::combined(id, collection_name, origins, lines)
    }

    pub fn with_planned_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.set_planned_dates(start, end);
        self
    }

    /// Re-key a group (e.g. a draft group that now has a persisted record).
    pub fn with_id(mut self, id: ShipmentId) -> Self {
        self.id = id;
        self
    }

    pub fn id_typed(&self) -> ShipmentId {
        self.id
    }

    pub fn collection_id(&self) -> Option<&CollectionId> {
        self.collection_id.as_ref()
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn planned_ship_start(&self) -> Option<NaiveDate> {
        self.planned_ship_start
    }

    pub fn planned_ship_end(&self) -> Option<NaiveDate> {
        self.planned_ship_end
    }

    pub fn min_allowed_start(&self) -> Option<NaiveDate> {
        self.min_allowed_start
    }

    pub fn min_allowed_end(&self) -> Option<NaiveDate> {
        self.min_allowed_end
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    pub fn is_combined(&self) -> bool {
        !self.origins.is_empty()
    }

    pub fn origins(&self) -> &[Origin] {
        &self.origins
    }

    pub fn origin_shipment_ids(&self) -> Vec<ShipmentId> {
        self.origins.iter().map(|o| o.shipment_id).collect()
    }

    /// No collection and not combined: nothing constrains its dates.
    pub fn is_unconstrained(&self) -> bool {
        self.collection_id.is_none() && !self.is_combined()
    }

    /// Grouping key of a non-combined group.
    pub fn grouping_key(&self) -> Option<GroupKey> {
        if self.is_combined() {
            return None;
        }
        Some(match &self.collection_id {
            Some(id) => GroupKey::Collection(id.clone()),
            None => GroupKey::Default,
        })
    }

    pub fn subtotal(&self) -> u64 {
        self.lines
            .iter()
            .fold(0u64, |acc, l| acc.saturating_add(l.line_total()))
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Date edits are advisory; ordering is only enforced at submission.
    pub fn set_planned_dates(&mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        self.planned_ship_start = start;
        self.planned_ship_end = end;
    }

    /// This group described as an origin of a future combination.
    ///
    /// Only meaningful for non-combined groups; a combined group contributes
    /// its own origin list instead.
    pub fn as_origin(&self) -> Origin {
        Origin {
            shipment_id: self.id,
            collection_id: self.collection_id.clone(),
            collection_name: self.collection_name.clone(),
            min_allowed_start: self.min_allowed_start,
            min_allowed_end: self.min_allowed_end,
        }
    }
}

impl Entity for ShipmentGroup {
    type Id = ShipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn spring() -> CollectionWindow {
        CollectionWindow::new("A", "Spring", Some(date(3, 1)), Some(date(3, 15)))
    }

    #[test]
    fn collection_group_starts_at_its_window() {
        let group = ShipmentGroup::for_collection(
            ShipmentId::new_draft(),
            CollectionRef::new("A", "Spring (cart)"),
            Some(&spring()),
            vec![CartLine::new("S1", "Coat", 2, 1000)],
        );
        assert_eq!(group.collection_name(), "Spring");
        assert_eq!(group.planned_ship_start(), Some(date(3, 1)));
        assert_eq!(group.planned_ship_end(), Some(date(3, 15)));
        assert_eq!(group.min_allowed_start(), Some(date(3, 1)));
        assert_eq!(group.subtotal(), 2000);
        assert!(!group.is_unconstrained());
    }

    #[test]
    fn unconstrained_group_never_has_min_allowed_dates() {
        let mut group = ShipmentGroup::unconstrained(
            ShipmentId::new_draft(),
            vec![CartLine::new("S1", "Scarf", 1, 500)],
        );
        group.set_planned_dates(Some(date(1, 1)), Some(date(1, 2)));
        assert!(group.is_unconstrained());
        assert_eq!(group.min_allowed_start(), None);
        assert_eq!(group.min_allowed_end(), None);
        assert_eq!(group.grouping_key(), Some(GroupKey::Default));
    }

    #[test]
    fn combined_requires_tagged_lines() {
        let a = ShipmentGroup::unconstrained(ShipmentId::new_draft(), vec![]);
        let b = ShipmentGroup::unconstrained(ShipmentId::new_draft(), vec![]);
        let err = ShipmentGroup::combined(
            ShipmentId::new_draft(),
            "A + B",
            vec![a.as_origin(), b.as_origin()],
            vec![CartLine::new("S1", "Untagged", 1, 1)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn combined_requires_two_distinct_origins() {
        let a = ShipmentGroup::unconstrained(ShipmentId::new_draft(), vec![]);
        let err = ShipmentGroup::combined(
            ShipmentId::new_draft(),
            "A + A",
            vec![a.as_origin(), a.as_origin()],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("twice")));
    }

    #[test]
    fn origin_window_is_absent_for_unconstrained_origins() {
        let group = ShipmentGroup::unconstrained(ShipmentId::new_draft(), vec![]);
        assert!(group.as_origin().window().is_none());

        let constrained = ShipmentGroup::for_collection(
            ShipmentId::new_draft(),
            CollectionRef::new("A", "Spring"),
            Some(&spring()),
            vec![],
        );
        assert_eq!(constrained.as_origin().window(), Some(spring()));
    }

    #[test]
    fn rebuilt_combination_tags_each_part() {
        let spring_group = ShipmentGroup::for_collection(
            ShipmentId::new_draft(),
            CollectionRef::new("A", "Spring"),
            Some(&spring()),
            vec![],
        );
        let default_group = ShipmentGroup::unconstrained(ShipmentId::new_draft(), vec![]);
        let a = spring_group.as_origin();
        let d = default_group.as_origin();

        let group = ShipmentGroup::rebuild_combined(
            ShipmentId::Persisted(PlannedShipmentId::new()),
            "Spring + Available to Ship",
            vec![
                (a.clone(), vec![CartLine::new("A1", "Coat", 1, 100)]),
                (d.clone(), vec![CartLine::new("U1", "Scarf", 1, 100)]),
            ],
        )
        .unwrap();

        assert!(group.is_combined());
        assert_eq!(group.origin_shipment_ids(), vec![a.shipment_id, d.shipment_id]);
        assert_eq!(group.lines()[0].origin, Some(a.shipment_id));
        assert_eq!(group.lines()[1].origin, Some(d.shipment_id));
    }

    #[test]
    fn shipment_id_serializes_as_tagged_variant() {
        let id = ShipmentId::Persisted(PlannedShipmentId::new());
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json["kind"], "persisted");
        assert!(id.is_persisted());
        assert!(!ShipmentId::new_draft().is_persisted());
    }
}
