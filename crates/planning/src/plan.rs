//! Shipment plan: the explicitly owned editing session for one cart or order.
//!
//! Every command handler maps to exactly one engine operation and touches
//! nothing but the plan it is called on. The durable draft-recovery store is
//! reached only through [`ShipmentPlan::snapshot`] / [`ShipmentPlan::restore`].

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shipplan_core::{DomainError, DomainResult, ExpectedVersion, OrderId};

use crate::aggregator::aggregate;
use crate::combine::CombineEngine;
use crate::error::PlanningError;
use crate::group::{ShipmentGroup, ShipmentId};
use crate::line::CartLine;
use crate::validate::{validate_for_submit, validate_group, ShipmentValidation, ValidationReport};
use crate::view::{grouped_view, ShipmentView};
use crate::window::WindowProvider;

/// What the plan is editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PlanContext {
    /// A cart that has never been submitted.
    Cart { session_id: String },
    /// A submitted order reopened for editing, at the version it was loaded.
    EditOrder { order_id: OrderId, order_version: u64 },
}

/// Serializable state handed to the draft-recovery store.
///
/// The undo log is deliberately absent: a restored plan splits by provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub context: PlanContext,
    pub groups: Vec<ShipmentGroup>,
}

#[derive(Debug, Clone)]
pub struct ShipmentPlan {
    context: PlanContext,
    groups: Vec<ShipmentGroup>,
    engine: CombineEngine,
    /// Combined ids already split, with the ids they split into.
    split_history: HashMap<ShipmentId, Vec<ShipmentId>>,
}

impl ShipmentPlan {
    /// Start a plan from cart lines.
    pub fn from_cart<P>(
        session_id: impl Into<String>,
        lines: Vec<CartLine>,
        provider: &P,
    ) -> DomainResult<Self>
    where
        P: WindowProvider + ?Sized,
    {
        let aggregation = aggregate(lines, provider)?;
        Ok(Self::new(
            PlanContext::Cart {
                session_id: session_id.into(),
            },
            aggregation.groups,
        ))
    }

    /// Plan for a reopened order, built from reconstructed groups.
    pub fn for_order(order_id: OrderId, order_version: u64, groups: Vec<ShipmentGroup>) -> Self {
        Self::new(
            PlanContext::EditOrder {
                order_id,
                order_version,
            },
            groups,
        )
    }

    fn new(context: PlanContext, groups: Vec<ShipmentGroup>) -> Self {
        Self {
            context,
            groups,
            engine: CombineEngine::new(),
            split_history: HashMap::new(),
        }
    }

    /// Restore a plan from the draft-recovery store.
    pub fn restore(snapshot: DraftSnapshot) -> Self {
        Self::new(snapshot.context, snapshot.groups)
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            context: self.context.clone(),
            groups: self.groups.clone(),
        }
    }

    /// Recompute groups after the cart changed. Combinations and date edits are dropped.
    pub fn refresh_cart<P>(&mut self, lines: Vec<CartLine>, provider: &P) -> DomainResult<()>
    where
        P: WindowProvider + ?Sized,
    {
        let aggregation = aggregate(lines, provider)?;
        self.groups = aggregation.groups;
        self.engine.reset();
        self.split_history.clear();
        Ok(())
    }

    /// Cart cleared: every group is destroyed.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.engine.reset();
        self.split_history.clear();
    }

    pub fn context(&self) -> &PlanContext {
        &self.context
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match &self.context {
            PlanContext::EditOrder { order_id, .. } => Some(*order_id),
            PlanContext::Cart { .. } => None,
        }
    }

    /// Version a commit must find the order at.
    pub fn expected_version(&self) -> ExpectedVersion {
        match &self.context {
            PlanContext::EditOrder { order_version, .. } => ExpectedVersion::Exact(*order_version),
            PlanContext::Cart { .. } => ExpectedVersion::Any,
        }
    }

    pub fn groups(&self) -> &[ShipmentGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<ShipmentGroup> {
        self.groups
    }

    pub fn group(&self, id: &ShipmentId) -> Option<&ShipmentGroup> {
        self.groups.iter().find(|g| g.id_typed() == *id)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.groups.iter().map(|g| g.lines().len()).sum()
    }

    pub fn will_split_order(&self) -> bool {
        self.groups.len() > 1
    }

    fn position(&self, id: &ShipmentId) -> Option<usize> {
        self.groups.iter().position(|g| g.id_typed() == *id)
    }

    /// Index of the combined group that absorbed `id`, if any.
    fn absorbed_into(&self, id: &ShipmentId) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.is_combined() && g.origins().iter().any(|o| o.shipment_id == *id))
    }

    /// Change the planned dates of one shipment. Validation is advisory.
    pub fn on_dates_change(
        &mut self,
        shipment_id: ShipmentId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ValidationReport, PlanningError> {
        let idx = self
            .position(&shipment_id)
            .ok_or(PlanningError::UnknownShipment(shipment_id))?;
        let group = &mut self.groups[idx];
        group.set_planned_dates(start, end);
        let report = validate_group(group);
        debug!(
            shipment_id = %shipment_id,
            valid = report.valid,
            errors = report.errors.len(),
            "ship dates changed"
        );
        Ok(report)
    }

    /// Combine `shipment_id` with `target_id`; returns the combined group's id.
    pub fn on_combine(
        &mut self,
        shipment_id: ShipmentId,
        target_id: ShipmentId,
    ) -> Result<ShipmentId, PlanningError> {
        if shipment_id == target_id {
            return Err(PlanningError::CombineConflict(format!(
                "shipment {shipment_id} cannot be combined with itself"
            )));
        }

        let (first, second) = match (self.position(&shipment_id), self.position(&target_id)) {
            (Some(a), Some(b)) => (a, b),
            (a, b) => {
                let a_home = a.or_else(|| self.absorbed_into(&shipment_id));
                let b_home = b.or_else(|| self.absorbed_into(&target_id));
                return match (a_home, b_home) {
                    // Retried combine: both already live in the same group.
                    (Some(x), Some(y)) if x == y => Ok(self.groups[x].id_typed()),
                    (Some(_), Some(_)) => {
                        let consumed = if a.is_none() { shipment_id } else { target_id };
                        Err(PlanningError::CombineConflict(format!(
                            "shipment {consumed} is already part of another combination"
                        )))
                    }
                    (None, _) => Err(PlanningError::UnknownShipment(shipment_id)),
                    (_, None) => Err(PlanningError::UnknownShipment(target_id)),
                };
            }
        };

        // A rejected combine leaves the plan untouched.
        let combined = self
            .engine
            .combine(self.groups[first].clone(), self.groups[second].clone())?;
        let combined_id = combined.id_typed();

        let (lo, hi) = if first < second { (first, second) } else { (second, first) };
        self.groups.remove(hi);
        self.groups.remove(lo);
        self.groups.insert(lo, combined);

        debug!(shipment_id = %combined_id, "shipments combined");
        Ok(combined_id)
    }

    /// Split a combined shipment back into its origins.
    ///
    /// Returns the validation state of every resulting shipment. Splitting a
    /// non-combined shipment, or one that was already split, changes nothing.
    pub fn on_split(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<ShipmentValidation>, PlanningError> {
        let Some(idx) = self.position(&shipment_id) else {
            if let Some(parts) = self.split_history.get(&shipment_id) {
                return Ok(self.validations_for(parts));
            }
            return Err(PlanningError::UnknownShipment(shipment_id));
        };

        if !self.groups[idx].is_combined() {
            return Ok(self.validations_for(&[shipment_id]));
        }

        let group = self.groups.remove(idx);
        let restored = self.engine.split(group);
        let ids: Vec<ShipmentId> = restored.iter().map(|g| g.id_typed()).collect();
        for (offset, g) in restored.into_iter().enumerate() {
            self.groups.insert(idx + offset, g);
        }
        self.split_history.insert(shipment_id, ids.clone());

        debug!(shipment_id = %shipment_id, parts = ids.len(), "shipment split");
        Ok(self.validations_for(&ids))
    }

    fn validations_for(&self, ids: &[ShipmentId]) -> Vec<ShipmentValidation> {
        ids.iter()
            .filter_map(|id| self.group(id))
            .map(|g| ShipmentValidation {
                shipment_id: g.id_typed(),
                report: validate_group(g),
            })
            .collect()
    }

    /// Interactive validation state of every shipment.
    pub fn validate_all(&self) -> Vec<ShipmentValidation> {
        self.groups
            .iter()
            .map(|g| ShipmentValidation {
                shipment_id: g.id_typed(),
                report: validate_group(g),
            })
            .collect()
    }

    /// Submission gate: every shipment needs valid, fully set dates.
    pub fn ensure_submittable(&self) -> Result<(), PlanningError> {
        if self.groups.is_empty() {
            return Err(DomainError::validation("no shipments to submit").into());
        }
        let failures: Vec<ShipmentValidation> = self
            .groups
            .iter()
            .map(|g| ShipmentValidation {
                shipment_id: g.id_typed(),
                report: validate_for_submit(g),
            })
            .filter(|v| !v.report.valid)
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PlanningError::Validation(failures))
        }
    }

    pub fn view(&self) -> Vec<ShipmentView> {
        grouped_view(&self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{DateField, END_BEFORE_START};
    use crate::window::{CollectionCatalog, CollectionRef, CollectionWindow};
    use proptest::prelude::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn catalog() -> CollectionCatalog {
        CollectionCatalog::new()
            .with_window(CollectionWindow::new("A", "Spring", Some(date(3, 1)), Some(date(3, 15))))
            .with_window(CollectionWindow::new("B", "Summer", Some(date(5, 1)), Some(date(5, 31))))
    }

    fn line(sku: &str, collection: Option<&str>) -> CartLine {
        let l = CartLine::new(sku, "item", 1, 1000);
        match collection {
            Some(c) => l.in_collection(CollectionRef::new(c, c)),
            None => l,
        }
    }

    fn spring_and_default_cart() -> ShipmentPlan {
        ShipmentPlan::from_cart(
            "session-1",
            vec![line("A1", Some("A")), line("A2", Some("A")), line("U1", None)],
            &catalog(),
        )
        .unwrap()
    }

    fn sorted_lines(plan: &ShipmentPlan) -> Vec<CartLine> {
        let mut lines: Vec<CartLine> = plan
            .groups()
            .iter()
            .flat_map(|g| g.lines().iter().cloned().map(|mut l| {
                l.origin = None;
                l
            }))
            .collect();
        lines.sort();
        lines
    }

    #[test]
    fn early_start_is_reported_by_date_handler() {
        let mut plan = spring_and_default_cart();
        let a = plan.groups()[0].id_typed();
        let report = plan.on_dates_change(a, Some(date(2, 20)), Some(date(3, 15))).unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, DateField::Start);
        assert_eq!(report.errors[0].message, "Cannot be prior to Mar 1");
        // Advisory: the edit is kept.
        assert_eq!(plan.group(&a).unwrap().planned_ship_start(), Some(date(2, 20)));
    }

    #[test]
    fn combine_and_split_through_command_handlers() {
        let mut plan = spring_and_default_cart();
        let a = plan.groups()[0].clone();
        let d = plan.groups()[1].clone();

        let combined_id = plan.on_combine(a.id_typed(), d.id_typed()).unwrap();
        assert_eq!(plan.groups().len(), 1);
        assert!(!plan.will_split_order());
        let combined = plan.group(&combined_id).unwrap();
        assert!(combined.is_combined());
        assert_eq!(combined.origin_shipment_ids(), vec![a.id_typed(), d.id_typed()]);
        assert_eq!(combined.lines().len(), 3);

        let parts = plan.on_split(combined_id).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(plan.groups().len(), 2);
        assert_eq!(plan.group(&a.id_typed()).unwrap().lines(), a.lines());
        assert_eq!(plan.group(&d.id_typed()).unwrap().lines(), d.lines());
    }

    #[test]
    fn consumed_shipment_cannot_be_combined_elsewhere() {
        let mut plan = ShipmentPlan::from_cart(
            "s",
            vec![line("A1", Some("A")), line("B1", Some("B")), line("U1", None)],
            &catalog(),
        )
        .unwrap();
        let ids: Vec<_> = plan.groups().iter().map(|g| g.id_typed()).collect();
        plan.on_combine(ids[0], ids[1]).unwrap();

        let err = plan.on_combine(ids[0], ids[2]).unwrap_err();
        assert!(matches!(err, PlanningError::CombineConflict(_)));
        assert_eq!(plan.groups().len(), 2);
    }

    #[test]
    fn retried_combine_returns_existing_combination() {
        let mut plan = spring_and_default_cart();
        let ids: Vec<_> = plan.groups().iter().map(|g| g.id_typed()).collect();
        let first = plan.on_combine(ids[0], ids[1]).unwrap();
        let second = plan.on_combine(ids[0], ids[1]).unwrap();
        assert_eq!(first, second);
        assert_eq!(plan.groups().len(), 1);
    }

    #[test]
    fn retried_split_is_a_noop() {
        let mut plan = spring_and_default_cart();
        let ids: Vec<_> = plan.groups().iter().map(|g| g.id_typed()).collect();
        let combined = plan.on_combine(ids[0], ids[1]).unwrap();
        let first = plan.on_split(combined).unwrap();
        let second = plan.on_split(combined).unwrap();
        assert_eq!(first, second);
        assert_eq!(plan.groups().len(), 2);

        let plain = plan.on_split(ids[1]).unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plan.groups().len(), 2);
    }

    #[test]
    fn unknown_shipments_are_reported() {
        let mut plan = spring_and_default_cart();
        let ghost = ShipmentId::new_draft();
        assert_eq!(
            plan.on_dates_change(ghost, None, None).unwrap_err(),
            PlanningError::UnknownShipment(ghost)
        );
        let a = plan.groups()[0].id_typed();
        assert_eq!(
            plan.on_combine(a, ghost).unwrap_err(),
            PlanningError::UnknownShipment(ghost)
        );
        assert_eq!(plan.on_split(ghost).unwrap_err(), PlanningError::UnknownShipment(ghost));
    }

    #[test]
    fn restored_draft_splits_by_provenance() {
        let mut plan = spring_and_default_cart();
        let ids: Vec<_> = plan.groups().iter().map(|g| g.id_typed()).collect();
        let before = sorted_lines(&plan);
        let combined = plan.on_combine(ids[0], ids[1]).unwrap();

        let json = serde_json::to_value(plan.snapshot()).unwrap();
        let snapshot: DraftSnapshot = serde_json::from_value(json).unwrap();
        let mut restored = ShipmentPlan::restore(snapshot);

        let parts = restored.on_split(combined).unwrap();
        let part_ids: Vec<_> = parts.iter().map(|p| p.shipment_id).collect();
        assert_eq!(part_ids, ids);
        assert_eq!(sorted_lines(&restored), before);
    }

    #[test]
    fn submission_requires_valid_complete_dates() {
        let mut plan = spring_and_default_cart();
        let a = plan.groups()[0].id_typed();
        let d = plan.groups()[1].id_typed();

        // Default group has no dates yet.
        match plan.ensure_submittable().unwrap_err() {
            PlanningError::Validation(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].shipment_id, d);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        plan.on_dates_change(d, Some(date(4, 2)), Some(date(4, 1))).unwrap();
        match plan.ensure_submittable().unwrap_err() {
            PlanningError::Validation(failures) => {
                assert_eq!(failures[0].report.errors[0].message, END_BEFORE_START);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        plan.on_dates_change(d, Some(date(4, 1)), Some(date(4, 2))).unwrap();
        plan.on_dates_change(a, Some(date(3, 1)), Some(date(3, 20))).unwrap();
        assert!(plan.ensure_submittable().is_ok());
        assert!(plan.validate_all().iter().all(|v| v.report.valid));
    }

    #[test]
    fn empty_plan_cannot_be_submitted() {
        let mut plan = spring_and_default_cart();
        plan.clear();
        assert!(plan.is_empty());
        assert!(matches!(
            plan.ensure_submittable(),
            Err(PlanningError::Domain(DomainError::Validation(_)))
        ));
    }

    #[test]
    fn refresh_recomputes_groups() {
        let mut plan = spring_and_default_cart();
        plan.refresh_cart(vec![line("B1", Some("B"))], &catalog()).unwrap();
        assert_eq!(plan.groups().len(), 1);
        assert_eq!(plan.groups()[0].collection_name(), "Summer");
        assert_eq!(plan.expected_version(), ExpectedVersion::Any);
        assert_eq!(plan.order_id(), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Combine(usize, usize),
        Split(usize),
        Dates(usize, i64, i64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..6, 0usize..6).prop_map(|(a, b)| Op::Combine(a, b)),
            (0usize..6).prop_map(Op::Split),
            (0usize..6, 0i64..120, 0i64..120).prop_map(|(i, s, e)| Op::Dates(i, s, e)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of edits loses or duplicates a cart line.
        #[test]
        fn edits_preserve_the_partition(ops in prop::collection::vec(arb_op(), 0..20)) {
            let mut plan = ShipmentPlan::from_cart(
                "s",
                vec![
                    line("A1", Some("A")),
                    line("A2", Some("A")),
                    line("B1", Some("B")),
                    line("U1", None),
                    line("U2", None),
                ],
                &catalog(),
            )
            .unwrap();
            let before = sorted_lines(&plan);
            let base = date(1, 1);

            for op in ops {
                let ids: Vec<_> = plan.groups().iter().map(|g| g.id_typed()).collect();
                let pick = |i: usize| ids[i % ids.len()];
                match op {
                    Op::Combine(a, b) => {
                        let _ = plan.on_combine(pick(a), pick(b));
                    }
                    Op::Split(a) => {
                        plan.on_split(pick(a)).unwrap();
                    }
                    Op::Dates(a, s, e) => {
                        let start = base + chrono::Duration::days(s);
                        let end = base + chrono::Duration::days(e);
                        plan.on_dates_change(pick(a), Some(start), Some(end)).unwrap();
                    }
                }
                prop_assert_eq!(sorted_lines(&plan), before.clone());
                for g in plan.groups() {
                    if g.collection_id().is_none() {
                        prop_assert_eq!(g.min_allowed_start(), None);
                        prop_assert_eq!(g.min_allowed_end(), None);
                    }
                }
            }
        }
    }
}
